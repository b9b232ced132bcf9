//! Last confirmed authoritative state.
//!
//! # Invariants
//! - Field order is the display order of the model state it was seeded from.
//! - Baseline is replaced wholesale on reseed, never patched field by field.

use crate::model::parameter::{values_equivalent, Parameter, UnitKind};
use crate::timeline::TimelineTree;
use std::collections::BTreeMap;

/// One confirmed field.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineField {
    pub name: String,
    /// Confirmed display value.
    pub value: String,
    pub unit_kind: UnitKind,
    pub group_id: String,
    pub editable: bool,
}

/// Confirmed field values plus the confirmed timeline snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    fields: Vec<BaselineField>,
    timeline: TimelineTree,
}

impl Baseline {
    /// Seeds from parameters in display order.
    pub fn from_parameters<'a>(parameters: impl IntoIterator<Item = &'a Parameter>) -> Self {
        let fields = parameters
            .into_iter()
            .map(|parameter| BaselineField {
                name: parameter.name.clone(),
                value: parameter.display_value(),
                unit_kind: parameter.unit_kind,
                group_id: parameter.group_id.clone(),
                editable: parameter.editable,
            })
            .collect();
        Self {
            fields,
            timeline: TimelineTree::default(),
        }
    }

    /// Same field layout with confirmed values replaced by `values`.
    pub fn confirm(&self, values: &BTreeMap<String, String>) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|field| BaselineField {
                value: values
                    .get(&field.name)
                    .cloned()
                    .unwrap_or_else(|| field.value.clone()),
                ..field.clone()
            })
            .collect();
        Self {
            fields,
            timeline: self.timeline.clone(),
        }
    }

    pub fn with_timeline(mut self, timeline: TimelineTree) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn reseed_timeline(&mut self, timeline: TimelineTree) {
        self.timeline = timeline;
    }

    pub fn fields(&self) -> &[BaselineField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&BaselineField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.field(name).map(|field| field.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn timeline(&self) -> &TimelineTree {
        &self.timeline
    }

    /// Whether `display` differs from the confirmed value after normalization.
    ///
    /// Unknown fields are never modified.
    pub fn differs(&self, name: &str, display: &str) -> bool {
        self.value(name)
            .is_some_and(|confirmed| !values_equivalent(confirmed, display))
    }

    /// Confirmed values keyed by name.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.value.clone()))
            .collect()
    }
}
