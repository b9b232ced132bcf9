//! Engine configuration.
//!
//! # Responsibility
//! - Hold the tunable constants of a synchronization session.
//! - Load overrides from JSON or from `FRETBOARD_*` environment variables.
//!
//! # Invariants
//! - `history_cap` is at least 2 so a linked two-entry edit always fits.
//! - Defaults reproduce the observed add-in behavior.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Default bounded history size, in entries.
pub const DEFAULT_HISTORY_CAP: usize = 50;
/// Smallest accepted history size.
pub const MIN_HISTORY_CAP: usize = 2;

const ENV_HISTORY_CAP: &str = "FRETBOARD_HISTORY_CAP";
const ENV_NOTICE_MS: &str = "FRETBOARD_NOTICE_MS";

/// Primary/secondary field pair mirrored while in single-scale mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedFields {
    pub primary: String,
    pub secondary: String,
}

impl Default for LinkedFields {
    fn default() -> Self {
        Self {
            primary: "ScaleLengthBass".to_string(),
            secondary: "ScaleLengthTreble".to_string(),
        }
    }
}

/// Tool-created document marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintConfig {
    pub parameter_name: String,
    pub value: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            parameter_name: "FretboardFingerPrint".to_string(),
            value: "FretboardMaker".to_string(),
        }
    }
}

/// Session-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub history_cap: usize,
    pub linked_fields: LinkedFields,
    pub fingerprint: FingerprintConfig,
    pub angle_unit: String,
    /// Length unit assumed until the store reports one.
    pub default_length_unit: String,
    pub notice_dismiss_ms: u64,
    pub refetch_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            linked_fields: LinkedFields::default(),
            fingerprint: FingerprintConfig::default(),
            angle_unit: "deg".to_string(),
            default_length_unit: "in".to_string(),
            notice_dismiss_ms: 3_000,
            refetch_delay_ms: 250,
        }
    }
}

/// Configuration load errors.
#[derive(Debug)]
pub enum ConfigError {
    Json(serde_json::Error),
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid engine config: {err}"),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value `{value}` for `{key}`")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl EngineConfig {
    /// Parses a JSON config; missing keys keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `FRETBOARD_HISTORY_CAP` / `FRETBOARD_NOTICE_MS` applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = read_env(ENV_HISTORY_CAP) {
            config.history_cap = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_HISTORY_CAP,
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = read_env(ENV_NOTICE_MS) {
            config.notice_dismiss_ms = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_NOTICE_MS,
                value: raw.clone(),
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_cap < MIN_HISTORY_CAP {
            return Err(ConfigError::InvalidValue {
                key: "historyCap",
                value: self.history_cap.to_string(),
            });
        }
        if self.fingerprint.parameter_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "fingerprint.parameterName",
                value: self.fingerprint.parameter_name.clone(),
            });
        }
        Ok(())
    }

    pub fn notice_dismiss(&self) -> Duration {
        Duration::from_millis(self.notice_dismiss_ms)
    }

    pub fn refetch_delay(&self) -> Duration {
        Duration::from_millis(self.refetch_delay_ms)
    }
}

fn read_env(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, DEFAULT_HISTORY_CAP};
    use std::time::Duration;

    #[test]
    fn defaults_match_observed_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.history_cap, DEFAULT_HISTORY_CAP);
        assert_eq!(config.notice_dismiss(), Duration::from_secs(3));
        assert_eq!(config.linked_fields.primary, "ScaleLengthBass");
        assert_eq!(config.fingerprint.value, "FretboardMaker");
    }

    #[test]
    fn from_json_keeps_defaults_for_missing_keys() {
        let config = EngineConfig::from_json(r#"{"historyCap": 10, "angleUnit": "rad"}"#)
            .expect("partial config should parse");
        assert_eq!(config.history_cap, 10);
        assert_eq!(config.angle_unit, "rad");
        assert_eq!(config.default_length_unit, "in");
    }

    #[test]
    fn rejects_tiny_history_cap() {
        let err = EngineConfig::from_json(r#"{"historyCap": 1}"#).expect_err("cap 1 must fail");
        assert!(matches!(err, ConfigError::InvalidValue { key: "historyCap", .. }));
    }
}
