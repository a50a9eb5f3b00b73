//! Task resource cache worker
//!
//! Materializes remotely stored task resources on the worker's local disk.
//! Each resource version is fetched at most once per coordinator, promoted
//! atomically into a version-stamped directory, expired after a retention
//! window, and exposed to task working directories by hard link or copy.
//!
//! The crate is organised around [`CacheCoordinator`], which composes a
//! [`CacheStrategy`] (path layout, promotion, materialization), a
//! [`RemoteStore`] (where bytes come from) and [`CacheSettings`].

pub mod cache;
pub mod cancel;
pub mod config;
pub mod store;

pub use cache::{
    CacheCoordinator, CacheError, CacheResult, CacheStatus, CacheStrategy, EvictionPolicy,
    EvictionReport, FileCacheStrategy, MaterializeMode, MaterializeStats, VersionDir,
};
pub use cancel::CancelToken;
pub use config::CacheSettings;
pub use store::{LocalDirStore, RemoteStore, StoreError};
