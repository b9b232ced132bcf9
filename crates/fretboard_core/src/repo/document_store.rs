//! Authoritative document store contract and in-memory implementation.
//!
//! # Responsibility
//! - Describe the opaque CAD document the engine synchronizes with: named
//!   user parameters, a fingerprint marker and a flat timeline enumeration.
//! - Provide a serializable in-memory store for tests, fixtures and the CLI.
//!
//! # Invariants
//! - The store never reorders timeline entries; only flags change.
//! - Writing an expression equal to the current one is not a mutation.
//! - Every failed write is reported as a typed `StoreError`.

use crate::model::parameter::leading_numeric_token;
use crate::model::timeline::TimelineEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    ParameterNotFound(String),
    ItemNotFound(String),
    /// Store refused the write (invalid expression, locked feature, ...).
    Rejected { name: String, message: String },
    /// Store content cannot be (de)serialized.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParameterNotFound(name) => write!(f, "parameter not found in design: {name}"),
            Self::ItemNotFound(name) => write!(f, "timeline item not found: {name}"),
            Self::Rejected { name, message } => write!(f, "store rejected `{name}`: {message}"),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
        }
    }
}

impl Error for StoreError {}

/// One user parameter as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredParameter {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub comment: String,
}

impl StoredParameter {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        Self {
            name: name.into(),
            value: numeric_value(&expression),
            unit: unit_suffix(&expression),
            expression,
            comment: String::new(),
        }
    }
}

/// Mutation recorded by [`InMemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Parameter { name: String, expression: String },
    Suppression { name: String, suppressed: bool },
    Fingerprint,
}

/// Contract of the authoritative document.
pub trait DocumentStore {
    /// Active length unit symbol, e.g. `in` or `mm`.
    fn document_unit(&self) -> String;
    fn user_parameters(&self) -> StoreResult<Vec<StoredParameter>>;
    fn set_parameter_expression(&mut self, name: &str, expression: &str) -> StoreResult<()>;
    /// Adds the marker parameter; no-op when already present.
    fn set_fingerprint(&mut self, parameter_name: &str, value: &str) -> StoreResult<()>;
    /// Flat enumeration in document order, groups and features interleaved.
    fn timeline_entries(&self) -> StoreResult<Vec<TimelineEntry>>;
    fn set_suppressed(&mut self, name: &str, suppressed: bool) -> StoreResult<()>;

    /// Marker expression, if the document carries one.
    fn fingerprint(&self, parameter_name: &str) -> StoreResult<Option<String>> {
        Ok(self
            .user_parameters()?
            .into_iter()
            .find(|parameter| parameter.name == parameter_name)
            .map(|parameter| parameter.expression)
            .filter(|expression| !expression.trim().is_empty()))
    }
}

/// Serializable in-process document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryDocumentStore {
    #[serde(default = "default_document_unit")]
    document_unit: String,
    #[serde(default)]
    parameters: Vec<StoredParameter>,
    #[serde(default)]
    timeline: Vec<TimelineEntry>,
    #[serde(skip)]
    rejected: BTreeSet<String>,
    #[serde(skip)]
    writes: Vec<StoreWrite>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new(default_document_unit())
    }
}

impl InMemoryDocumentStore {
    pub fn new(document_unit: impl Into<String>) -> Self {
        Self {
            document_unit: document_unit.into(),
            parameters: Vec::new(),
            timeline: Vec::new(),
            rejected: BTreeSet::new(),
            writes: Vec::new(),
        }
    }

    pub fn from_json(raw: &str) -> StoreResult<Self> {
        serde_json::from_str(raw).map_err(|err| StoreError::InvalidData(err.to_string()))
    }

    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|err| StoreError::InvalidData(err.to_string()))
    }

    pub fn with_parameter(mut self, name: &str, expression: &str) -> Self {
        self.parameters.push(StoredParameter::new(name, expression));
        self
    }

    pub fn with_timeline(mut self, entries: Vec<TimelineEntry>) -> Self {
        self.timeline = entries;
        self
    }

    /// Makes every later write to `name` fail with `StoreError::Rejected`.
    pub fn reject_writes_to(&mut self, name: &str) {
        self.rejected.insert(name.to_string());
    }

    /// Removes one timeline entry, simulating an external edit.
    pub fn remove_timeline_item(&mut self, name: &str) -> bool {
        let before = self.timeline.len();
        self.timeline.retain(|entry| entry.name != name);
        before != self.timeline.len()
    }

    /// Mutations applied so far, oldest first.
    pub fn writes(&self) -> &[StoreWrite] {
        &self.writes
    }

    pub fn parameter(&self, name: &str) -> Option<&StoredParameter> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    pub fn timeline_entry(&self, name: &str) -> Option<&TimelineEntry> {
        self.timeline.iter().find(|entry| entry.name == name)
    }

    fn ensure_writable(&self, name: &str) -> StoreResult<()> {
        if self.rejected.contains(name) {
            return Err(StoreError::Rejected {
                name: name.to_string(),
                message: "write refused by document".to_string(),
            });
        }
        Ok(())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn document_unit(&self) -> String {
        self.document_unit.clone()
    }

    fn user_parameters(&self) -> StoreResult<Vec<StoredParameter>> {
        Ok(self.parameters.clone())
    }

    fn set_parameter_expression(&mut self, name: &str, expression: &str) -> StoreResult<()> {
        self.ensure_writable(name)?;
        let parameter = self
            .parameters
            .iter_mut()
            .find(|parameter| parameter.name == name)
            .ok_or_else(|| StoreError::ParameterNotFound(name.to_string()))?;
        if parameter.expression == expression {
            return Ok(());
        }
        if expression.trim().is_empty() {
            return Err(StoreError::Rejected {
                name: name.to_string(),
                message: "expression is empty".to_string(),
            });
        }

        parameter.expression = expression.to_string();
        parameter.value = numeric_value(expression);
        parameter.unit = unit_suffix(expression);
        self.writes.push(StoreWrite::Parameter {
            name: name.to_string(),
            expression: expression.to_string(),
        });
        Ok(())
    }

    fn set_fingerprint(&mut self, parameter_name: &str, value: &str) -> StoreResult<()> {
        if self.parameter(parameter_name).is_some() {
            return Ok(());
        }
        self.parameters.push(StoredParameter {
            name: parameter_name.to_string(),
            expression: format!("'{value}'"),
            value: None,
            unit: String::new(),
            comment: "Identifies documents created by the fretboard tool.".to_string(),
        });
        self.writes.push(StoreWrite::Fingerprint);
        Ok(())
    }

    fn timeline_entries(&self) -> StoreResult<Vec<TimelineEntry>> {
        Ok(self.timeline.clone())
    }

    fn set_suppressed(&mut self, name: &str, suppressed: bool) -> StoreResult<()> {
        self.ensure_writable(name)?;
        let entry = self
            .timeline
            .iter_mut()
            .find(|entry| entry.name == name)
            .ok_or_else(|| StoreError::ItemNotFound(name.to_string()))?;
        entry.suppressed = suppressed;
        self.writes.push(StoreWrite::Suppression {
            name: name.to_string(),
            suppressed,
        });
        Ok(())
    }
}

fn default_document_unit() -> String {
    "in".to_string()
}

fn numeric_value(expression: &str) -> Option<f64> {
    leading_numeric_token(expression).and_then(|token| token.parse().ok())
}

fn unit_suffix(expression: &str) -> String {
    match leading_numeric_token(expression) {
        Some(token) => expression
            .trim_start()
            .trim_start_matches(token)
            .trim()
            .to_string(),
        None => String::new(),
    }
}
