//! Worker-side resource cache
//!
//! - [`CacheCoordinator`]: single-flight population of version directories
//! - [`CacheStrategy`]: per-storage-kind layout, promotion and materialization
//! - [`EvictionPolicy`]: expiry with a retention floor
//! - [`materialize_tree`]: hard link or copy a cached tree into a task directory

mod coordinator;
mod error;
mod eviction;
mod materialize;
mod strategy;

pub use coordinator::{CacheCoordinator, CacheStatus};
pub use error::{CacheError, CacheResult};
pub use eviction::{
    EvictionPolicy, EvictionReport, VersionDir, DEFAULT_EXPIRY, DEFAULT_MIN_KEEP_COUNT,
};
pub use materialize::{materialize_tree, MaterializeMode, MaterializeStats};
pub use strategy::{append_raw, CacheStrategy, FileCacheStrategy};
