//! Remote resource store.
//!
//! The cache only needs one capability from the remote side: copy the bytes
//! behind a tenant-scoped name to a local path. [`LocalDirStore`] serves a
//! directory tree laid out as `<root>/<tenant>/resources/<full_name>`, which
//! is the same layout the platform uses in its object store.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("remote store error: {0}")]
    Remote(String),
}

/// Source of resource bytes.
pub trait RemoteStore: Send + Sync {
    /// Tenant-scoped remote location of a resource, for diagnostics.
    fn remote_path(&self, tenant_code: &str, full_name: &str) -> String;

    /// Copy the resource to `local_path`.
    ///
    /// `Ok(false)` means the store completed without copying (for example the
    /// object does not exist). Callers treat it the same as an error.
    fn fetch(&self, tenant_code: &str, full_name: &str, local_path: &Path)
        -> Result<bool, StoreError>;
}

/// Store backed by a local (or mounted) directory.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a resource. `full_name` is appended verbatim.
    pub fn resource_path(&self, tenant_code: &str, full_name: &str) -> PathBuf {
        let mut path: OsString = self.root.join(tenant_code).join("resources").into_os_string();
        path.push(full_name);
        PathBuf::from(path)
    }

    fn copy_tree(src: &Path, dst: &Path) -> Result<(), StoreError> {
        for entry in WalkDir::new(src) {
            let entry = entry.map_err(|e| StoreError::Io {
                path: src.to_path_buf(),
                source: e.into(),
            })?;
            let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
            let target = dst.join(rel);
            if entry.file_type().is_dir() {
                create_dir_all(&target)?;
            } else {
                fs::copy(entry.path(), &target).map_err(|source| StoreError::Io {
                    path: target.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

impl RemoteStore for LocalDirStore {
    fn remote_path(&self, tenant_code: &str, full_name: &str) -> String {
        self.resource_path(tenant_code, full_name)
            .to_string_lossy()
            .into_owned()
    }

    fn fetch(
        &self,
        tenant_code: &str,
        full_name: &str,
        local_path: &Path,
    ) -> Result<bool, StoreError> {
        let src = self.resource_path(tenant_code, full_name);
        if !src.exists() {
            debug!(path = %src.display(), "remote resource not found");
            return Ok(false);
        }

        if let Some(parent) = local_path.parent() {
            create_dir_all(parent)?;
        }

        if src.is_dir() {
            Self::copy_tree(&src, local_path)?;
        } else {
            fs::copy(&src, local_path).map_err(|source| StoreError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;
        }
        Ok(true)
    }
}

fn create_dir_all(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
