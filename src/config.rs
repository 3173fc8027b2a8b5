//! YAML configuration for the ledger stores
use crate::audit::RetentionPolicy;
use crate::audit::retention::DEFAULT_IP_RETENTION_DAYS;
use crate::error::ConfigError;
use crate::payment::DEFAULT_CURRENCY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub default_currency: String,
    pub log: LogConfig,
    pub audit: AuditConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            log: LogConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub use_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            use_json: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    /// Anonymize addresses before entries are hashed.
    pub anonymize_ip_on_write: bool,
    pub ip_retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::default(),
            anonymize_ip_on_write: false,
            ip_retention_days: DEFAULT_IP_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuditBackend {
    #[default]
    Memory,
    Sled {
        path: PathBuf,
    },
    /// No repository: every audit call fails closed.
    Disabled,
}

impl LedgerConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::from_days(self.audit.ip_retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn empty_document_uses_defaults() {
        let config = LedgerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.default_currency, "usd");
        assert_eq!(config.audit.backend, AuditBackend::Memory);
        assert_eq!(config.retention_policy().ip_retention(), TimeDelta::days(90));
    }

    #[test]
    fn parses_full_document() {
        let raw = r#"
default_currency: eur
log:
  level: debug
  use_json: true
audit:
  backend:
    kind: sled
    path: /var/lib/ledger/audit
  anonymize_ip_on_write: true
  ip_retention_days: 30
"#;
        let config = LedgerConfig::from_yaml_str(raw).unwrap();
        assert_eq!(config.default_currency, "eur");
        assert_eq!(config.log.level, "debug");
        assert!(config.log.use_json);
        assert_eq!(
            config.audit.backend,
            AuditBackend::Sled {
                path: PathBuf::from("/var/lib/ledger/audit")
            }
        );
        assert!(config.audit.anonymize_ip_on_write);
        assert_eq!(config.retention_policy().ip_retention(), TimeDelta::days(30));
    }

    #[test]
    fn disabled_backend_parses() {
        let config = LedgerConfig::from_yaml_str("audit:\n  backend:\n    kind: disabled\n").unwrap();
        assert_eq!(config.audit.backend, AuditBackend::Disabled);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let err = LedgerConfig::from_yaml_str("audit:\n  backend:\n    kind: postgres\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = LedgerConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
