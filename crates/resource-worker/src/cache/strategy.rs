//! Per-storage-kind cache strategies
//!
//! Directory layout for file resources:
//!
//! ```text
//! <data_base_dir>/cache/resources/<id>/                 per-resource namespace
//! <data_base_dir>/cache/resources/<id>/download/        staging for in-flight fetch
//! <data_base_dir>/cache/resources/<id>/unpack/          staging for archive expansion
//! <data_base_dir>/cache/resources/<id>/<versionStamp>/  promoted, immutable version
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use resource_descriptor::ArtifactDescriptor;
use tracing::{info, warn};

use super::error::{CacheError, CacheResult};
use super::materialize::{materialize_tree, MaterializeMode};
use crate::config::CacheSettings;

/// Capabilities a storage kind supplies to the coordinator.
///
/// Path queries are pure; `promote` and `materialize` touch the disk.
pub trait CacheStrategy: Send + Sync {
    /// Per-resource cache namespace.
    fn cache_base_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf;

    /// Staging directory the remote store writes into.
    fn download_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf;

    /// Directories that must not exist when a fetch starts.
    fn directories_to_preclean(&self, descriptor: &ArtifactDescriptor) -> Vec<PathBuf>;

    /// Atomically move populated staging into `cache_dir`.
    fn promote(&self, descriptor: &ArtifactDescriptor, cache_dir: &Path) -> CacheResult<()>;

    /// Expose the cached version under `reference_parent`.
    fn materialize(
        &self,
        descriptor: &ArtifactDescriptor,
        cache_dir: &Path,
        reference_parent: &Path,
    ) -> CacheResult<()>;

    /// Delete one expired version directory.
    fn remove_version(&self, version_dir: &Path) -> io::Result<()> {
        fs::remove_dir_all(version_dir)
    }
}

/// Strategy for plain file resources.
#[derive(Debug, Clone)]
pub struct FileCacheStrategy {
    data_base_dir: PathBuf,
    mode: MaterializeMode,
}

impl FileCacheStrategy {
    /// Create a strategy rooted at `data_base_dir`.
    pub fn new(data_base_dir: impl Into<PathBuf>, mode: MaterializeMode) -> Self {
        Self {
            data_base_dir: data_base_dir.into(),
            mode,
        }
    }

    /// Create a strategy from cache settings.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(
            settings.data_base_dir.clone(),
            settings.effective_materialize_mode(),
        )
    }

    /// Materialization mode in use.
    pub fn mode(&self) -> MaterializeMode {
        self.mode
    }

    /// Reserved staging directory for archive expansion.
    pub fn unpack_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.cache_base_dir(descriptor).join("unpack")
    }
}

impl CacheStrategy for FileCacheStrategy {
    fn cache_base_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.data_base_dir
            .join("cache")
            .join("resources")
            .join(descriptor.id.to_string())
    }

    fn download_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.cache_base_dir(descriptor).join("download")
    }

    fn directories_to_preclean(&self, descriptor: &ArtifactDescriptor) -> Vec<PathBuf> {
        vec![self.download_dir(descriptor), self.unpack_dir(descriptor)]
    }

    fn promote(&self, descriptor: &ArtifactDescriptor, cache_dir: &Path) -> CacheResult<()> {
        let ready = self.download_dir(descriptor);
        info!(
            resource = %descriptor,
            from = %ready.display(),
            to = %cache_dir.display(),
            "promoting downloaded resource"
        );

        match fs::rename(&ready, cache_dir) {
            Ok(()) => Ok(()),
            // The version appeared meanwhile; keep it and drop our staging.
            Err(_) if cache_dir.is_dir() => {
                warn!(
                    resource = %descriptor,
                    path = %cache_dir.display(),
                    "version already present, discarding staged download"
                );
                if let Err(e) = fs::remove_dir_all(&ready) {
                    warn!(
                        resource = %descriptor,
                        path = %ready.display(),
                        error = %e,
                        "failed to remove discarded staging directory"
                    );
                }
                Ok(())
            }
            Err(source) => Err(CacheError::PromoteFailed {
                from: ready,
                to: cache_dir.to_path_buf(),
                source,
            }),
        }
    }

    fn materialize(
        &self,
        descriptor: &ArtifactDescriptor,
        cache_dir: &Path,
        reference_parent: &Path,
    ) -> CacheResult<()> {
        let from = append_raw(cache_dir, &descriptor.parent_relative_path);
        let to = append_raw(reference_parent, &descriptor.parent_relative_path);
        info!(
            resource = %descriptor,
            mode = self.mode.as_str(),
            from = %from.display(),
            to = %to.display(),
            "materializing cached resource"
        );

        let stats = materialize_tree(&from, &to, self.mode)?;
        info!(
            resource = %descriptor,
            linked = stats.linked,
            copied = stats.copied,
            "materialized cached resource"
        );
        Ok(())
    }
}

/// Append `suffix` to `base` as raw text, without inserting a separator.
///
/// Resource names carry their own leading `/` by convention, so
/// `append_raw("/x/download", "/a/b.sh")` is `/x/download/a/b.sh`.
pub fn append_raw(base: &Path, suffix: &str) -> PathBuf {
    let mut joined: OsString = base.as_os_str().to_os_string();
    joined.push(suffix);
    PathBuf::from(joined)
}
