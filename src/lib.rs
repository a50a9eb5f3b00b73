//! Task resource cache
//!
//! Worker-side cache for task resources: layered configuration, logging and
//! signal handling around the [`resource_worker`] engine, plus the
//! `resource-cache` command-line tool.

pub mod config;
pub mod logging;
pub mod signal;

pub use config::{ConfigError, EffectiveConfig};
pub use resource_descriptor::{ArtifactDescriptor, ResourceRecord, ResourceType};
pub use resource_worker::{
    CacheCoordinator, CacheError, CacheSettings, CacheStatus, CancelToken, EvictionReport,
    LocalDirStore, RemoteStore,
};
