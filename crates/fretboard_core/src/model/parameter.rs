//! Parameter domain model.
//!
//! # Responsibility
//! - Define the editable design field shape shared by baseline, edit session
//!   and diff engine.
//! - Own numeric normalization used to decide whether a field is modified.
//! - Compose outgoing expressions from display values and unit kinds.
//!
//! # Invariants
//! - Parameter names are unique within one model state.
//! - Comparison is performed on the leading numeric token when present, so
//!   `"25.5 in"`, `"25.50"` and `"25.5"` are equivalent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LEADING_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)")
        .expect("valid leading number regex")
});
static PLAIN_QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?\s*(?:[A-Za-z°]+)?\s*$")
        .expect("valid plain quantity regex")
});

/// Physical kind of a parameter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Distance; suffixed with the document length unit.
    #[default]
    Length,
    /// Angle; suffixed with the configured angle unit.
    Angle,
    /// Plain number or count; never suffixed.
    Unitless,
}

impl UnitKind {
    /// Returns the unit suffix this kind requires, if any.
    pub fn suffix<'a>(self, document_unit: &'a str, angle_unit: &'a str) -> Option<&'a str> {
        match self {
            Self::Length => Some(document_unit),
            Self::Angle => Some(angle_unit),
            Self::Unitless => None,
        }
    }
}

/// One editable design field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Expression as stored in the document, e.g. `25.5 in`.
    pub expression: String,
    /// Resolved numeric value reported by the store.
    pub value: Option<f64>,
    pub unit_kind: UnitKind,
    /// Owning [`ParameterGroup`] id.
    pub group_id: String,
    /// Formula-driven parameters are not editable.
    pub editable: bool,
}

impl Parameter {
    /// Display form of the stored expression.
    pub fn display_value(&self) -> String {
        display_value_of(&self.expression)
    }
}

/// Ordered set of parameters with a stable display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroup {
    pub id: String,
    pub label: String,
    pub order: i64,
    pub parameters: Vec<Parameter>,
}

/// Returns the leading numeric token of `value`, if any.
pub fn leading_numeric_token(value: &str) -> Option<&str> {
    LEADING_NUMBER_RE
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

/// Normalizes a display or expression value for modification checks.
///
/// The leading numeric token is canonicalized through `f64` formatting;
/// values without a numeric prefix fall back to the trimmed raw string.
pub fn normalize_for_compare(value: &str) -> String {
    match leading_numeric_token(value) {
        Some(token) => match token.parse::<f64>() {
            Ok(number) => format!("{number}"),
            Err(_) => token.to_string(),
        },
        None => value.trim().to_string(),
    }
}

/// Returns whether two values are the same after numeric normalization.
pub fn values_equivalent(left: &str, right: &str) -> bool {
    normalize_for_compare(left) == normalize_for_compare(right)
}

/// Returns whether `value` is a number with at most a unit word after it.
pub fn is_plain_quantity(value: &str) -> bool {
    PLAIN_QUANTITY_RE.is_match(value)
}

/// Converts a stored expression into the value shown in an editor.
///
/// Plain quantities lose their unit suffix (`25.5 in` -> `25.5`); formulas
/// are shown verbatim.
pub fn display_value_of(expression: &str) -> String {
    if is_plain_quantity(expression) {
        if let Some(token) = leading_numeric_token(expression) {
            return token.to_string();
        }
    }
    expression.trim().to_string()
}

/// Builds the expression sent to the store from a display value.
///
/// Bare numbers get the unit suffix their kind requires; anything already
/// carrying a suffix, and all unitless values, pass through unchanged.
pub fn compose_expression(
    display_value: &str,
    unit_kind: UnitKind,
    document_unit: &str,
    angle_unit: &str,
) -> String {
    let trimmed = display_value.trim();
    let is_bare_number = leading_numeric_token(trimmed).is_some_and(|token| token.trim() == trimmed);
    match unit_kind.suffix(document_unit, angle_unit) {
        Some(suffix) if is_bare_number && !suffix.is_empty() => format!("{trimmed} {suffix}"),
        _ => trimmed.to_string(),
    }
}
