//! Cache settings.

use std::path::PathBuf;
use std::time::Duration;

use resource_descriptor::VersionFormat;

use crate::cache::{EvictionPolicy, MaterializeMode};

/// Static cache configuration, passed to the coordinator at construction.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Data root; caches live under `<data_base_dir>/cache/resources`
    pub data_base_dir: PathBuf,
    /// Format used to name version directories
    pub version_format: VersionFormat,
    /// Expiry and retention floor
    pub eviction: EvictionPolicy,
    /// Length of one wait cycle while another caller populates
    pub wait_timeout: Duration,
    /// Forced materialization mode (`None` picks per platform)
    pub materialize_mode: Option<MaterializeMode>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            data_base_dir: PathBuf::from("/var/lib/task-resource-cache"),
            version_format: VersionFormat::default(),
            eviction: EvictionPolicy::default(),
            wait_timeout: Duration::from_secs(60),
            materialize_mode: None,
        }
    }
}

impl CacheSettings {
    /// Settings rooted at `data_base_dir` with all other values defaulted.
    pub fn with_data_dir(data_base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_base_dir: data_base_dir.into(),
            ..Self::default()
        }
    }

    /// The materialization mode in effect.
    pub fn effective_materialize_mode(&self) -> MaterializeMode {
        self.materialize_mode
            .unwrap_or_else(MaterializeMode::for_platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = CacheSettings::default();
        assert_eq!(settings.wait_timeout, Duration::from_secs(60));
        assert_eq!(settings.version_format.pattern(), "%Y%m%d%H%M%S");
        assert_eq!(settings.eviction.min_keep_count, 2);
        assert!(settings.materialize_mode.is_none());
    }

    #[test]
    fn test_forced_materialize_mode() {
        let mut settings = CacheSettings::with_data_dir("/tmp/data");
        assert_eq!(
            settings.effective_materialize_mode(),
            MaterializeMode::for_platform()
        );

        settings.materialize_mode = Some(MaterializeMode::Copy);
        assert_eq!(settings.effective_materialize_mode(), MaterializeMode::Copy);
        assert_eq!(settings.data_base_dir, PathBuf::from("/tmp/data"));
    }
}
