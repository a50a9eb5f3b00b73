//! Effective configuration with provenance
//!
//! Captures the merged configuration plus where each layer came from.

use chrono::{DateTime, Utc};
use resource_descriptor::VersionFormat;
use resource_worker::{CacheSettings, EvictionPolicy, MaterializeMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "task-resource-cache/effective_config@1";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Origin of this source
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build effective config from layers.
    ///
    /// A missing config file is an error: it was named explicitly.
    pub fn build(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        Self::settings_from(&merged)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((Self::toml_to_json(toml_value), digest))
    }

    /// Convert TOML Value to JSON Value
    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Self::toml_to_json).collect())
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    /// Typed cache settings from a merged config value.
    fn settings_from(config: &Value) -> Result<CacheSettings, ConfigError> {
        let get = |key: &str| config.get("cache").and_then(|c| c.get(key));
        let require_u64 = |key: &str| {
            get(key).and_then(Value::as_u64).ok_or_else(|| {
                ConfigError::ValidationError(format!("cache.{} must be a non-negative integer", key))
            })
        };
        let require_str = |key: &str| {
            get(key).and_then(Value::as_str).ok_or_else(|| {
                ConfigError::ValidationError(format!("cache.{} must be a string", key))
            })
        };

        let data_base_dir = require_str("data_base_dir")?;
        if data_base_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.data_base_dir must not be empty".to_string(),
            ));
        }

        let version_format = VersionFormat::new(require_str("version_format")?)
            .map_err(|e| ConfigError::ValidationError(format!("cache.version_format: {}", e)))?;

        let expiry_seconds = require_u64("expiry_seconds")?;
        if expiry_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "cache.expiry_seconds must be > 0".to_string(),
            ));
        }

        let wait_timeout_seconds = require_u64("wait_timeout_seconds")?;
        if wait_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "cache.wait_timeout_seconds must be > 0".to_string(),
            ));
        }

        let min_keep_count = usize::try_from(require_u64("min_keep_count")?).map_err(|_| {
            ConfigError::ValidationError("cache.min_keep_count is too large".to_string())
        })?;

        let materialize_mode = match require_str("materialize_mode")? {
            "auto" => None,
            other => Some(MaterializeMode::from_str(other).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "cache.materialize_mode must be one of auto, hard_link, copy (got {:?})",
                    other
                ))
            })?),
        };

        let dry_run = match get("eviction_dry_run") {
            None => false,
            Some(v) => v.as_bool().ok_or_else(|| {
                ConfigError::ValidationError("cache.eviction_dry_run must be a boolean".to_string())
            })?,
        };

        let mut eviction = EvictionPolicy::new(Duration::from_secs(expiry_seconds), min_keep_count);
        eviction.dry_run = dry_run;

        Ok(CacheSettings {
            data_base_dir: PathBuf::from(data_base_dir),
            version_format,
            eviction,
            wait_timeout: Duration::from_secs(wait_timeout_seconds),
            materialize_mode,
        })
    }

    /// Typed cache settings.
    pub fn cache_settings(&self) -> Result<CacheSettings, ConfigError> {
        Self::settings_from(&self.config)
    }

    /// Remote store root directory.
    pub fn store_root(&self) -> Result<PathBuf, ConfigError> {
        self.get_str("store.root")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::ValidationError("store.root must be set".to_string()))
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Get a config value as u64
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    /// Get a config value as string
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Get a config value as bool
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None).unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.get_u64("cache.expiry_seconds"), Some(604_800));
        assert_eq!(config.get_str("cache.materialize_mode"), Some("auto"));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);

        let settings = config.cache_settings().unwrap();
        assert_eq!(settings.eviction.expiry, Duration::from_secs(604_800));
        assert_eq!(settings.eviction.min_keep_count, 2);
        assert_eq!(settings.wait_timeout, Duration::from_secs(60));
        assert!(settings.materialize_mode.is_none());
    }

    #[test]
    fn test_build_with_cli_override() {
        let cli = serde_json::json!({"cache": {"materialize_mode": "copy", "min_keep_count": 4}});
        let config = EffectiveConfig::build(None, Some(cli)).unwrap();

        let settings = config.cache_settings().unwrap();
        assert_eq!(settings.materialize_mode, Some(MaterializeMode::Copy));
        assert_eq!(settings.eviction.min_keep_count, 4);
        assert_eq!(config.sources.last().unwrap().origin, ConfigOrigin::Cli);
    }

    #[test]
    fn test_load_toml_file_records_digest() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[cache]").unwrap();
        writeln!(temp, "data_base_dir = \"/srv/worker\"").unwrap();
        writeln!(temp, "eviction_dry_run = true").unwrap();
        writeln!(temp, "[store]").unwrap();
        writeln!(temp, "root = \"/mnt/objects\"").unwrap();

        let config = EffectiveConfig::build(Some(temp.path()), None).unwrap();

        assert_eq!(config.store_root().unwrap(), PathBuf::from("/mnt/objects"));
        let settings = config.cache_settings().unwrap();
        assert_eq!(settings.data_base_dir, PathBuf::from("/srv/worker"));
        assert!(settings.eviction.dry_run);

        let file_source = &config.sources[1];
        assert_eq!(file_source.origin, ConfigOrigin::File);
        assert_eq!(file_source.digest.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_cli_beats_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[cache]\nwait_timeout_seconds = 5").unwrap();
        let cli = serde_json::json!({"cache": {"wait_timeout_seconds": 9}});

        let config = EffectiveConfig::build(Some(temp.path()), Some(cli)).unwrap();
        assert_eq!(config.get_u64("cache.wait_timeout_seconds"), Some(9));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = EffectiveConfig::build(Some(Path::new("/nonexistent/cache.toml")), None);
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_validation_zero_expiry() {
        let cli = serde_json::json!({"cache": {"expiry_seconds": 0}});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("expiry_seconds"));
    }

    #[test]
    fn test_validation_zero_wait_timeout() {
        let cli = serde_json::json!({"cache": {"wait_timeout_seconds": 0}});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("wait_timeout_seconds"));
    }

    #[test]
    fn test_validation_unknown_materialize_mode() {
        let cli = serde_json::json!({"cache": {"materialize_mode": "symlink"}});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("materialize_mode"));
    }

    #[test]
    fn test_validation_lossy_version_format() {
        let cli = serde_json::json!({"cache": {"version_format": "%Y%m"}});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("version_format"));
    }

    #[test]
    fn test_parse_error() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[cache").unwrap();
        let result = EffectiveConfig::build(Some(temp.path()), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
