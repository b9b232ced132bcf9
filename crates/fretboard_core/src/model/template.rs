//! Parameter template model.
//!
//! # Responsibility
//! - Define the named parameter preset shape persisted by template storage.
//! - Derive stable slug ids from user-facing names.
//!
//! # Invariants
//! - `id` is a slug: lowercase word characters and `_` only.
//! - `readonly` templates (presets) are never overwritten or deleted by users.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SLUG_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid slug strip regex"));
static SLUG_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s-]+").expect("valid slug separator regex"));
// Same `\w` class the strip pattern keeps.
static SLUG_VALID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+$").expect("valid slug check regex"));

const FALLBACK_SLUG: &str = "template";

/// Named set of parameter expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `YYYY-MM-DD` creation date.
    #[serde(default)]
    pub created_at: String,
    pub schema_version: String,
    #[serde(default)]
    pub readonly: bool,
    /// Parameter name -> expression.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Template validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValidationError {
    BlankName,
    InvalidId(String),
}

impl Display for TemplateValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "template name is required"),
            Self::InvalidId(id) => write!(f, "template id is not a valid slug: `{id}`"),
        }
    }
}

impl Error for TemplateValidationError {}

impl Template {
    /// Checks name and id shape before persistence.
    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        if self.name.trim().is_empty() {
            return Err(TemplateValidationError::BlankName);
        }
        if !is_valid_slug(&self.id) {
            return Err(TemplateValidationError::InvalidId(self.id.clone()));
        }
        Ok(())
    }
}

/// Converts a display name into a template id.
///
/// `"My Jumbo-Frets!"` becomes `"my_jumbo_frets"`; names with no usable
/// characters fall back to `"template"`.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = SLUG_STRIP_RE.replace_all(&lowered, "");
    let joined = SLUG_SEPARATOR_RE.replace_all(&stripped, "_");
    let slug = joined.trim_matches('_');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Returns whether `id` could have been produced by [`slugify`].
///
/// Also rejects path-like ids so callers can safely use them as keys.
pub fn is_valid_slug(id: &str) -> bool {
    SLUG_VALID_RE.is_match(id) && id.to_lowercase() == id
}

#[cfg(test)]
mod tests {
    use super::{is_valid_slug, slugify, Template, TemplateValidationError};
    use std::collections::BTreeMap;

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("My Jumbo-Frets!"), "my_jumbo_frets");
        assert_eq!(slugify("  Strat   Style  "), "strat_style");
        assert_eq!(slugify("!!!"), "template");
    }

    #[test]
    fn slug_validation_rejects_paths() {
        assert!(is_valid_slug("strat_style_2"));
        assert!(!is_valid_slug("../etc"));
        assert!(!is_valid_slug("Strat"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn slugs_with_combining_marks_stay_valid() {
        let slug = slugify("Cafe\u{301} Special");
        assert_eq!(slug, "cafe\u{301}_special");
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn validate_requires_name() {
        let template = Template {
            id: "x".to_string(),
            name: "   ".to_string(),
            description: String::new(),
            created_at: String::new(),
            schema_version: "0.3.0".to_string(),
            readonly: false,
            parameters: BTreeMap::new(),
        };
        assert_eq!(
            template.validate(),
            Err(TemplateValidationError::BlankName)
        );
    }
}
