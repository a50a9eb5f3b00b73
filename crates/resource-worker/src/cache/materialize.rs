//! Reference materialization
//!
//! Mirrors a cached tree into a task's working directory. Hard links share
//! storage with the cache: a task deleting or replacing its copy leaves the
//! cache untouched. Where links are unavailable (Windows, or a per-file link
//! failure such as a cross-device boundary) files are copied.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use super::error::{CacheError, CacheResult};

/// How cached files are exposed to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializeMode {
    /// Hard-link each file, copying only when a link cannot be made
    HardLink,
    /// Copy each file
    Copy,
}

impl MaterializeMode {
    /// Mode for the current platform.
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            Self::Copy
        } else {
            Self::HardLink
        }
    }

    /// Parse from string. `auto` is resolved by the caller.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hard_link" | "hardlink" | "link" => Some(Self::HardLink),
            "copy" => Some(Self::Copy),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HardLink => "hard_link",
            Self::Copy => "copy",
        }
    }
}

/// Counts from one materialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Files exposed by hard link
    pub linked: usize,
    /// Files exposed by copy
    pub copied: usize,
}

/// Mirror every file under `src` into `dst`.
pub fn materialize_tree(src: &Path, dst: &Path, mode: MaterializeMode) -> CacheResult<MaterializeStats> {
    let fail = |source: io::Error| CacheError::Materialize {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source,
    };

    if !src.is_dir() {
        return Err(fail(io::Error::new(
            io::ErrorKind::NotFound,
            "cached directory does not exist",
        )));
    }

    let mut stats = MaterializeStats::default();
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| fail(e.into()))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target: PathBuf = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(fail)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }

        // Already a link to the cached file: writing through it would modify the cache.
        if is_same_file(entry.path(), &target) {
            match mode {
                MaterializeMode::HardLink => {
                    stats.linked += 1;
                    continue;
                }
                MaterializeMode::Copy => fs::remove_file(&target).map_err(fail)?,
            }
        }

        match mode {
            MaterializeMode::HardLink => match fs::hard_link(entry.path(), &target) {
                Ok(()) => stats.linked += 1,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(fail(e)),
                Err(e) => {
                    debug!(
                        path = %entry.path().display(),
                        error = %e,
                        "hard link failed, copying instead"
                    );
                    fs::copy(entry.path(), &target).map_err(fail)?;
                    stats.copied += 1;
                }
            },
            MaterializeMode::Copy => {
                fs::copy(entry.path(), &target).map_err(fail)?;
                stats.copied += 1;
            }
        }
    }

    Ok(stats)
}

/// Whether `a` and `b` are the same file on disk.
#[cfg(unix)]
fn is_same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_tree(root: &Path) {
        fs::create_dir_all(root.join("lib/nested")).unwrap();
        fs::write(root.join("run.sh"), "#!/bin/sh\necho run").unwrap();
        fs::write(root.join("lib/a.jar"), vec![7u8; 64]).unwrap();
        fs::write(root.join("lib/nested/conf.yaml"), "k: v").unwrap();
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(MaterializeMode::from_str("copy"), Some(MaterializeMode::Copy));
        assert_eq!(MaterializeMode::from_str("HARD_LINK"), Some(MaterializeMode::HardLink));
        assert_eq!(MaterializeMode::from_str("auto"), None);
        assert_eq!(MaterializeMode::HardLink.as_str(), "hard_link");
    }

    #[test]
    #[cfg(unix)]
    fn test_platform_mode_on_unix() {
        assert_eq!(MaterializeMode::for_platform(), MaterializeMode::HardLink);
    }

    #[test]
    fn test_copy_mirrors_tree() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        make_tree(&src);

        let stats = materialize_tree(&src, &dst, MaterializeMode::Copy).unwrap();
        assert_eq!(stats, MaterializeStats { linked: 0, copied: 3 });
        assert_eq!(
            fs::read_to_string(dst.join("run.sh")).unwrap(),
            "#!/bin/sh\necho run"
        );
        assert_eq!(fs::read(dst.join("lib/a.jar")).unwrap(), vec![7u8; 64]);
        assert_eq!(fs::read_to_string(dst.join("lib/nested/conf.yaml")).unwrap(), "k: v");

        // Copies are independent of the source.
        fs::write(dst.join("run.sh"), "changed").unwrap();
        assert_eq!(
            fs::read_to_string(src.join("run.sh")).unwrap(),
            "#!/bin/sh\necho run"
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_hard_link_shares_inode() {
        use std::os::unix::fs::MetadataExt;

        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        make_tree(&src);

        let stats = materialize_tree(&src, &dst, MaterializeMode::HardLink).unwrap();
        assert_eq!(stats.linked, 3);
        assert_eq!(stats.copied, 0);

        let src_meta = fs::metadata(src.join("lib/a.jar")).unwrap();
        let dst_meta = fs::metadata(dst.join("lib/a.jar")).unwrap();
        assert_eq!(src_meta.ino(), dst_meta.ino());
        assert_eq!(src_meta.dev(), dst_meta.dev());

        // Removing the task's link leaves the cache intact.
        fs::remove_file(dst.join("lib/a.jar")).unwrap();
        assert!(src.join("lib/a.jar").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_rematerialize_hard_link_keeps_cache_intact() {
        use std::os::unix::fs::MetadataExt;

        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("run.sh"), "echo cached").unwrap();

        materialize_tree(&src, &dst, MaterializeMode::HardLink).unwrap();
        let stats = materialize_tree(&src, &dst, MaterializeMode::HardLink).unwrap();

        assert_eq!(stats, MaterializeStats { linked: 1, copied: 0 });
        assert_eq!(fs::read_to_string(src.join("run.sh")).unwrap(), "echo cached");
        assert_eq!(fs::read_to_string(dst.join("run.sh")).unwrap(), "echo cached");
        assert_eq!(
            fs::metadata(src.join("run.sh")).unwrap().ino(),
            fs::metadata(dst.join("run.sh")).unwrap().ino()
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_copy_over_hard_link_breaks_the_link() {
        use std::os::unix::fs::MetadataExt;

        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("run.sh"), "echo cached").unwrap();

        materialize_tree(&src, &dst, MaterializeMode::HardLink).unwrap();
        let stats = materialize_tree(&src, &dst, MaterializeMode::Copy).unwrap();

        assert_eq!(stats.copied, 1);
        assert_eq!(fs::read_to_string(src.join("run.sh")).unwrap(), "echo cached");
        assert_ne!(
            fs::metadata(src.join("run.sh")).unwrap().ino(),
            fs::metadata(dst.join("run.sh")).unwrap().ino()
        );

        fs::write(dst.join("run.sh"), "task edit").unwrap();
        assert_eq!(fs::read_to_string(src.join("run.sh")).unwrap(), "echo cached");
    }

    #[test]
    fn test_hard_link_onto_foreign_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("run.sh"), "echo cached").unwrap();
        fs::write(dst.join("run.sh"), "task owned").unwrap();

        let err = materialize_tree(&src, &dst, MaterializeMode::HardLink).unwrap_err();
        assert!(matches!(err, CacheError::Materialize { .. }));
        assert_eq!(fs::read_to_string(src.join("run.sh")).unwrap(), "echo cached");
        assert_eq!(fs::read_to_string(dst.join("run.sh")).unwrap(), "task owned");
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let err = materialize_tree(
            &temp_dir.path().join("absent"),
            &temp_dir.path().join("dst"),
            MaterializeMode::Copy,
        )
        .unwrap_err();
        assert!(matches!(err, CacheError::Materialize { .. }));
    }
}
