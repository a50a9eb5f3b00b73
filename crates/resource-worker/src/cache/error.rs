//! Cache error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::coordinator::CacheStatus;

/// Cache result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from cache operations.
///
/// The populate phases (`PreDownloadCleanupFailed`, `FetchFailed`,
/// `PromoteFailed`) are logged by the coordinator and collapse into
/// `PopulationFailed` before reaching callers. `EvictionFailed` is never
/// surfaced by `ensure_cached`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to remove stale staging directory {path}: {source}")]
    PreDownloadCleanupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch {full_name} from {remote_path} to {local_path}: {reason}")]
    FetchFailed {
        full_name: String,
        remote_path: String,
        local_path: PathBuf,
        reason: String,
    },

    #[error("failed to promote {from} to {to}: {source}")]
    PromoteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache population failed for resource {resource_id} (status: {status}, interrupted: {interrupted})")]
    PopulationFailed {
        resource_id: u32,
        status: CacheStatus,
        interrupted: bool,
    },

    #[error("failed to clean expired cache under {path}: {source}")]
    EvictionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache status is unknown (state lock poisoned)")]
    UnknownState,

    #[error("failed to materialize {from} into {to}: {source}")]
    Materialize {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
