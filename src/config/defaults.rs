//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Worker data root (default: "/var/lib/task-resource-cache")
    pub data_base_dir: String,

    /// Version stamp format (default: "%Y%m%d%H%M%S")
    pub version_format: String,

    /// Version expiry in seconds (default: 604800 = 7 days)
    pub expiry_seconds: u64,

    /// Versions always retained per resource (default: 2)
    pub min_keep_count: u64,

    /// One wait cycle while another caller populates (default: 60)
    pub wait_timeout_seconds: u64,

    /// Materialization mode (default: "auto")
    pub materialize_mode: String,

    /// Log evictions without deleting (default: false)
    pub eviction_dry_run: bool,

    /// Remote store root (default: "/var/lib/task-resource-cache/store")
    pub store_root: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            data_base_dir: "/var/lib/task-resource-cache".to_string(),
            version_format: resource_descriptor::DEFAULT_VERSION_FORMAT.to_string(),
            expiry_seconds: 604_800,
            min_keep_count: 2,
            wait_timeout_seconds: 60,
            materialize_mode: "auto".to_string(),
            eviction_dry_run: false,
            store_root: "/var/lib/task-resource-cache/store".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "cache": {
                "data_base_dir": self.data_base_dir,
                "version_format": self.version_format,
                "expiry_seconds": self.expiry_seconds,
                "min_keep_count": self.min_keep_count,
                "wait_timeout_seconds": self.wait_timeout_seconds,
                "materialize_mode": self.materialize_mode,
                "eviction_dry_run": self.eviction_dry_run
            },
            "store": {
                "root": self.store_root
            }
        })
    }
}
