//! Parameter schema declaration.
//!
//! # Responsibility
//! - Describe which document parameters the tool knows about, their groups,
//!   defaults and editability.
//! - Provide the default values used by first-time (initial mode) imports.
//!
//! # Invariants
//! - Parameter names are unique across all groups.
//! - Non-editable (formula-driven) parameters are never written by the tool.

use crate::model::parameter::UnitKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const UNKNOWN_VERSION: &str = "unknown";

/// Schema parse/validation errors.
#[derive(Debug)]
pub enum SchemaError {
    Json(serde_json::Error),
    EmptyParameterName { group_id: String },
    DuplicateParameter(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid parameter schema: {err}"),
            Self::EmptyParameterName { group_id } => {
                write!(f, "parameter schema group `{group_id}` has an unnamed parameter")
            }
            Self::DuplicateParameter(name) => {
                write!(f, "parameter schema declares `{name}` more than once")
            }
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Root schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    #[serde(default = "unknown_version")]
    pub schema_version: String,
    #[serde(default = "unknown_version")]
    pub template_version: String,
    #[serde(default)]
    pub groups: Vec<SchemaGroup>,
}

/// Group declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaGroup {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub parameters: Vec<SchemaParameter>,
}

/// Parameter declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaParameter {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub unit_kind: UnitKind,
    #[serde(default = "default_control_type")]
    pub control_type: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_editable")]
    pub editable: bool,
}

impl SchemaParameter {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(self.name.as_str())
    }
}

impl ParameterSchema {
    /// Parses and validates a schema document.
    pub fn from_json(raw: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(raw)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Checks name uniqueness across groups.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = BTreeSet::new();
        for group in &self.groups {
            for parameter in &group.parameters {
                if parameter.name.trim().is_empty() {
                    return Err(SchemaError::EmptyParameterName {
                        group_id: group.id.clone(),
                    });
                }
                if !seen.insert(parameter.name.as_str()) {
                    return Err(SchemaError::DuplicateParameter(parameter.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Groups sorted by their order key (stable for equal keys).
    pub fn sorted_groups(&self) -> Vec<&SchemaGroup> {
        let mut groups = self.groups.iter().collect::<Vec<_>>();
        groups.sort_by_key(|group| group.order);
        groups
    }

    /// Every declared parameter name, editable or not.
    pub fn all_names(&self) -> BTreeSet<&str> {
        self.parameters().map(|(_, p)| p.name.as_str()).collect()
    }

    /// Names of parameters the tool may write.
    pub fn editable_names(&self) -> BTreeSet<&str> {
        self.parameters()
            .filter(|(_, p)| p.editable)
            .map(|(_, p)| p.name.as_str())
            .collect()
    }

    /// Looks up one parameter declaration with its owning group.
    pub fn find(&self, name: &str) -> Option<(&SchemaGroup, &SchemaParameter)> {
        self.parameters().find(|(_, p)| p.name == name)
    }

    fn parameters(&self) -> impl Iterator<Item = (&SchemaGroup, &SchemaParameter)> {
        self.groups
            .iter()
            .flat_map(|group| group.parameters.iter().map(move |p| (group, p)))
    }
}

fn unknown_version() -> String {
    UNKNOWN_VERSION.to_string()
}

fn default_control_type() -> String {
    "number".to_string()
}

fn default_editable() -> bool {
    true
}
