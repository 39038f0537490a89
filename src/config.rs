//! Engine Configuration
//!
//! Loaded from a JSON file. Every field has a default so an empty object is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::reconcile::{ReconcilePolicy, DEFAULT_MANDATORY_DIRECTIVE, DEFAULT_SYNTHETIC_ID_PREFIX};
use crate::{ENGINE_VERSION, MIN_CONFIG_VERSION};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Config requires engine >= {0}, current is {1}")]
    EngineVersionMismatch(String, String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Block,
    Warn,
    Log,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewConfig {
    #[serde(default)]
    pub failure_mode: FailureMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_min_version")]
    pub engine_min_version: String,
    #[serde(default = "default_prefix")]
    pub synthetic_id_prefix: String,
    #[serde(default = "default_directive")]
    pub mandatory_directive: String,
    #[serde(default)]
    pub review: ReviewConfig,
}

fn default_min_version() -> String { MIN_CONFIG_VERSION.to_string() }
fn default_prefix() -> String { DEFAULT_SYNTHETIC_ID_PREFIX.to_string() }
fn default_directive() -> String { DEFAULT_MANDATORY_DIRECTIVE.to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_min_version: default_min_version(),
            synthetic_id_prefix: default_prefix(),
            mandatory_directive: default_directive(),
            review: ReviewConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.synthetic_id_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("syntheticIdPrefix must not be empty".into()));
        }
        if self.mandatory_directive.trim().is_empty() {
            return Err(ConfigError::Invalid("mandatoryDirective must not be empty".into()));
        }
        self.check_engine_version()
    }

    fn check_engine_version(&self) -> Result<(), ConfigError> {
        let engine_ver = semver::Version::parse(ENGINE_VERSION)
            .map_err(|_| ConfigError::InvalidVersion(ENGINE_VERSION.into()))?;
        let min_ver = semver::Version::parse(&self.engine_min_version)
            .map_err(|_| ConfigError::InvalidVersion(self.engine_min_version.clone()))?;

        if engine_ver < min_ver {
            return Err(ConfigError::EngineVersionMismatch(
                self.engine_min_version.clone(),
                ENGINE_VERSION.to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            synthetic_id_prefix: self.synthetic_id_prefix.clone(),
            mandatory_directive: self.mandatory_directive.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.reconcile_policy(), ReconcilePolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"syntheticIdPrefix": "ai_", "review": {{"failureMode": "warn"}}}}"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.synthetic_id_prefix, "ai_");
        assert_eq!(config.review.failure_mode, FailureMode::Warn);
        assert_eq!(config.mandatory_directive, DEFAULT_MANDATORY_DIRECTIVE);
    }

    #[test]
    fn test_future_engine_rejected() {
        let err = EngineConfig::from_json(r#"{"engineMinVersion": "99.0.0"}"#).unwrap_err();
        assert!(err.to_string().contains("requires engine >= 99.0.0"));
    }

    #[test]
    fn test_blank_prefix_rejected() {
        let err = EngineConfig::from_json(r#"{"syntheticIdPrefix": " "}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
