//! # Ledger Configuration
//!
//! Settings for an [`AuditLedger`](crate::AuditLedger), loaded from an
//! optional file and overridden by `AUDIT_KEEPER__*` environment variables.
//!
//! Every field carries a serde default, so an absent file and an empty
//! environment produce a usable configuration.
//!
//! ```yaml
//! log_directory: /var/lib/audit-keeper
//! rollover: monthly
//! default_retention_days: 400
//! policies:
//!   - id: gdpr
//!     name: GDPR
//!     retention_days: 180
//!     applicable_compliance_types: [GDPR]
//! classifier_overrides:
//!   - event_type: 12
//!     compliance_type: GDPR
//! ```

use crate::entry::{AuditEventType, ComplianceType};
use crate::retention::{PolicyError, RetentionPolicy, MAX_RETENTION_DAYS};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "AUDIT_KEEPER";

/// Period covered by one live store file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rollover {
    /// `audit-YYYY-MM-DD.json`
    #[default]
    Daily,
    /// `audit-YYYY-MM.json`
    Monthly,
}

impl Rollover {
    /// Live store file name for an entry appended at `timestamp`
    pub fn store_file_name(&self, timestamp: Timestamp) -> String {
        match self {
            Self::Daily => timestamp.format("audit-%Y-%m-%d.json"),
            Self::Monthly => timestamp.format("audit-%Y-%m.json"),
        }
    }
}

/// Extra classifier rule mapping an event type to a compliance type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierOverride {
    pub event_type: AuditEventType,
    pub compliance_type: ComplianceType,
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding live store files
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// Whether appends are recorded at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Live store rollover period
    #[serde(default)]
    pub rollover: Rollover,

    /// Archive directory, relative to `log_directory` unless absolute
    #[serde(default = "default_archive_directory")]
    pub archive_directory: PathBuf,

    /// Default export directory, relative to `log_directory` unless absolute
    #[serde(default = "default_export_directory")]
    pub export_directory: PathBuf,

    /// Retention used when no policy matches and no `general` policy exists
    #[serde(default = "default_retention_days")]
    pub default_retention_days: u32,

    /// Policies added to, or replacing, the built-in set
    #[serde(default)]
    pub policies: Vec<RetentionPolicy>,

    /// Classifier rules added to the built-in overrides
    #[serde(default)]
    pub classifier_overrides: Vec<ClassifierOverride>,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("audit-logs")
}

fn default_enabled() -> bool {
    true
}

fn default_archive_directory() -> PathBuf {
    PathBuf::from("archive")
}

fn default_export_directory() -> PathBuf {
    PathBuf::from("exports")
}

fn default_retention_days() -> u32 {
    365
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            enabled: default_enabled(),
            rollover: Rollover::default(),
            archive_directory: default_archive_directory(),
            export_directory: default_export_directory(),
            default_retention_days: default_retention_days(),
            policies: Vec::new(),
            classifier_overrides: Vec::new(),
        }
    }
}

impl LedgerConfig {
    /// Configuration rooted at `log_directory` with all other defaults
    pub fn with_log_directory(log_directory: impl Into<PathBuf>) -> Self {
        Self {
            log_directory: log_directory.into(),
            ..Self::default()
        }
    }

    /// Load configuration
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. `path`, when given (format chosen by extension: yaml, toml, json)
    /// 2. Environment variables prefixed `AUDIT_KEEPER__`, e.g.
    ///    `AUDIT_KEEPER__ROLLOVER=monthly`
    ///
    /// The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_environment(path, environment_source())
    }

    pub(crate) fn load_with_environment(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        let settings = builder
            .add_source(environment)
            .build()
            .map_err(|e| ConfigError::Load {
                message: e.to_string(),
            })?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load {
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("log_directory", &self.log_directory),
            ("archive_directory", &self.archive_directory),
            ("export_directory", &self.export_directory),
        ] {
            if value.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        if self.default_retention_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_retention_days".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.default_retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::InvalidValue {
                field: "default_retention_days".to_string(),
                message: format!("must not exceed {} days", MAX_RETENTION_DAYS),
            });
        }

        for policy in &self.policies {
            policy.validate()?;
        }

        Ok(())
    }
}

fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {message}")]
    Load { message: String },

    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid retention policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
