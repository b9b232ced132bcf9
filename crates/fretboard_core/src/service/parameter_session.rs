//! Diff & apply engine for design fields.
//!
//! # Responsibility
//! - Track the document mode (`initial | live | template`).
//! - Reseed baseline and edit session from pushed model state.
//! - Build minimal parameter batches and reconcile apply results.
//!
//! # Invariants
//! - Once a fingerprint has been observed the mode never returns to
//!   `initial`.
//! - A template load changes the display but never the baseline.
//! - A failed apply leaves the edit session untouched for retry, including
//!   across the model state the host pushes after the failure.

use crate::bridge::messages::ModelState;
use crate::config::EngineConfig;
use crate::model::parameter::{compose_expression, display_value_of, values_equivalent};
use crate::service::baseline::Baseline;
use crate::service::edit_session::{EditAction, EditSession, ScaleMode, SessionResult};
use crate::timeline::TimelineTree;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Whether the document was created by this tool and what the display shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentMode {
    /// No fingerprint yet; values are schema defaults.
    #[default]
    Initial,
    Live,
    /// A saved template is displayed over the live baseline.
    Template,
}

impl DocumentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Live => "live",
            Self::Template => "template",
        }
    }
}

/// One outgoing field write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamChange {
    pub name: String,
    pub expression: String,
}

/// Ordered `APPLY_PARAMS` content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamChangeBatch {
    pub changes: Vec<ParamChange>,
}

impl ParamChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Wire form, `name -> expression`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.changes
            .iter()
            .map(|change| (change.name.clone(), change.expression.clone()))
            .collect()
    }
}

/// Field-side state of one editing surface.
#[derive(Debug, Clone)]
pub struct ParameterSession {
    config: EngineConfig,
    mode: DocumentMode,
    baseline: Baseline,
    edits: Arc<EditSession>,
    defaults: BTreeMap<String, String>,
    document_unit: String,
    fingerprint_seen: bool,
    template_name: Option<String>,
    in_flight: Option<BTreeMap<String, String>>,
    /// Modified display values carried over the next reseed after a failure.
    retry: Option<BTreeMap<String, String>>,
}

impl ParameterSession {
    pub fn new(config: EngineConfig) -> Self {
        let baseline = Baseline::default();
        let edits = Arc::new(EditSession::new(&baseline, ScaleMode::Single, &config));
        Self {
            document_unit: config.default_length_unit.clone(),
            config,
            mode: DocumentMode::Initial,
            baseline,
            edits,
            defaults: BTreeMap::new(),
            fingerprint_seen: false,
            template_name: None,
            in_flight: None,
            retry: None,
        }
    }

    /// Applies a pushed `PUSH_MODEL_STATE`.
    pub fn on_model_state(&mut self, state: &ModelState) {
        if state.has_fingerprint {
            self.fingerprint_seen = true;
        }
        self.document_unit = state.document_unit.clone();

        let mode = match state.mode {
            DocumentMode::Initial if self.fingerprint_seen => {
                warn!(
                    "event=mode_change module=params status=ignored from={} to=initial",
                    self.mode.as_str()
                );
                DocumentMode::Live
            }
            other => other,
        };

        let parameters = state.parameters();
        match mode {
            DocumentMode::Template if !self.baseline.fields().is_empty() => {
                let values = parameters
                    .iter()
                    .map(|parameter| (parameter.name.clone(), parameter.display_value()))
                    .collect();
                self.edits = Arc::new(EditSession::with_values(
                    &self.baseline,
                    &values,
                    self.edits.scale_mode(),
                    &self.config,
                ));
                self.template_name = state.template_name.clone();
            }
            _ => {
                let timeline = self.baseline.timeline().clone();
                self.baseline = Baseline::from_parameters(&parameters).with_timeline(timeline);
                self.defaults = state
                    .defaults()
                    .into_iter()
                    .map(|(name, default)| (name, display_value_of(&default)))
                    .collect();
                let scale_mode =
                    EditSession::infer_scale_mode(&self.baseline, &self.config.linked_fields);
                let edits = match self.retry.take() {
                    Some(retained) => EditSession::with_values(
                        &self.baseline,
                        &retained,
                        self.edits.scale_mode(),
                        &self.config,
                    ),
                    None => EditSession::new(&self.baseline, scale_mode, &self.config),
                };
                self.edits = Arc::new(edits);
                self.template_name = state.template_name.clone();
            }
        }

        if mode != self.mode {
            info!(
                "event=mode_change module=params status=ok from={} to={}",
                self.mode.as_str(),
                mode.as_str()
            );
        }
        self.mode = mode;
    }

    /// Replaces the confirmed timeline snapshot.
    pub fn reseed_timeline(&mut self, timeline: TimelineTree) {
        self.baseline.reseed_timeline(timeline);
    }

    pub fn dispatch(&mut self, action: EditAction) -> SessionResult<Arc<EditSession>> {
        let next = self.edits.reduce(action)?;
        if *self.edits != next {
            self.edits = Arc::new(next);
        }
        Ok(Arc::clone(&self.edits))
    }

    pub fn stage_edit(&mut self, name: &str, value: &str) -> SessionResult<Arc<EditSession>> {
        self.dispatch(EditAction::Stage {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn undo(&mut self) -> Arc<EditSession> {
        self.dispatch(EditAction::Undo)
            .unwrap_or_else(|_| Arc::clone(&self.edits))
    }

    pub fn redo(&mut self) -> Arc<EditSession> {
        self.dispatch(EditAction::Redo)
            .unwrap_or_else(|_| Arc::clone(&self.edits))
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) -> Arc<EditSession> {
        self.dispatch(EditAction::SetScaleMode(mode))
            .unwrap_or_else(|_| Arc::clone(&self.edits))
    }

    /// Current read-only snapshot.
    pub fn snapshot(&self) -> Arc<EditSession> {
        Arc::clone(&self.edits)
    }

    /// Display value differs from the confirmed value after normalization.
    pub fn is_modified(&self, name: &str) -> bool {
        self.edits
            .value(name)
            .is_some_and(|display| self.baseline.differs(name, display))
    }

    pub fn modified_fields(&self) -> Vec<String> {
        self.baseline
            .fields()
            .iter()
            .filter(|field| self.is_modified(&field.name))
            .map(|field| field.name.clone())
            .collect()
    }

    /// Display values of modified fields.
    pub fn modified_values(&self) -> BTreeMap<String, String> {
        self.modified_fields()
            .into_iter()
            .filter_map(|name| {
                let value = self.edits.value(&name)?.to_string();
                Some((name, value))
            })
            .collect()
    }

    /// Minimal batch for the current mode, in display order.
    ///
    /// `initial` diffs against schema defaults; `live` and `template` diff
    /// against the confirmed baseline. Bare numbers get their unit suffix.
    pub fn build_change_batch(&self) -> ParamChangeBatch {
        let mut batch = ParamChangeBatch::default();
        for field in self.baseline.fields().iter().filter(|field| field.editable) {
            let Some(display) = self.edits.value(&field.name) else {
                continue;
            };
            if display.trim().is_empty() {
                continue;
            }
            let reference = match self.mode {
                DocumentMode::Initial => self
                    .defaults
                    .get(&field.name)
                    .map(String::as_str)
                    .unwrap_or(field.value.as_str()),
                DocumentMode::Live | DocumentMode::Template => field.value.as_str(),
            };
            if values_equivalent(reference, display) {
                continue;
            }
            batch.changes.push(ParamChange {
                name: field.name.clone(),
                expression: compose_expression(
                    display,
                    field.unit_kind,
                    &self.document_unit,
                    &self.config.angle_unit,
                ),
            });
        }
        batch
    }

    /// Builds the batch and remembers the submitted display values.
    ///
    /// Returns `None` when nothing changed; the store must not be contacted.
    pub fn begin_apply(&mut self) -> Option<ParamChangeBatch> {
        let batch = self.build_change_batch();
        if batch.is_empty() {
            info!(
                "event=params_apply module=params status=skipped mode={} changes=0",
                self.mode.as_str()
            );
            return None;
        }
        self.in_flight = Some(self.edits.values().clone());
        info!(
            "event=params_apply module=params status=start mode={} changes={}",
            self.mode.as_str(),
            batch.len()
        );
        Some(batch)
    }

    /// Reconciles the single result of an apply.
    pub fn on_apply_result(&mut self, success: bool) {
        let submitted = self.in_flight.take();
        if !success {
            let retained = self.modified_values();
            self.retry = (!retained.is_empty()).then_some(retained);
            warn!(
                "event=params_apply module=params status=error mode={} retained_edits={}",
                self.mode.as_str(),
                self.modified_fields().len()
            );
            return;
        }

        self.retry = None;
        let confirmed = submitted.unwrap_or_else(|| self.edits.values().clone());
        self.baseline = self.baseline.confirm(&confirmed);
        let current = self.edits.values().clone();
        self.edits = Arc::new(EditSession::with_values(
            &self.baseline,
            &current,
            self.edits.scale_mode(),
            &self.config,
        ));
        self.fingerprint_seen = true;
        self.template_name = None;
        info!(
            "event=params_apply module=params status=ok from={} to=live",
            self.mode.as_str()
        );
        self.mode = DocumentMode::Live;
    }

    pub fn mode(&self) -> DocumentMode {
        self.mode
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    pub fn has_seen_fingerprint(&self) -> bool {
        self.fingerprint_seen
    }

    pub fn is_applying(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn document_unit(&self) -> &str {
        &self.document_unit
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
