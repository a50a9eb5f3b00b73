//! Version expiry and eviction
//!
//! - Versions unmodified for longer than the expiry window are candidates
//! - At least `min_keep_count` versions survive when that many exist
//! - Selection is pure; deleting the selected directories is the caller's job
//! - Only directories named as version stamps are ever considered

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Default expiry window: 7 days.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default minimum number of retained versions.
pub const DEFAULT_MIN_KEEP_COUNT: usize = 2;

/// Eviction policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPolicy {
    /// Versions older than this (by mtime) are expired
    pub expiry: Duration,
    /// Retention floor
    pub min_keep_count: usize,
    /// Whether to dry-run (log but don't delete)
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            expiry: DEFAULT_EXPIRY,
            min_keep_count: DEFAULT_MIN_KEEP_COUNT,
            dry_run: false,
        }
    }
}

impl EvictionPolicy {
    /// Create a policy with the given expiry window and retention floor.
    pub fn new(expiry: Duration, min_keep_count: usize) -> Self {
        Self {
            expiry,
            min_keep_count,
            dry_run: false,
        }
    }

    /// Set dry-run mode.
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Whether a version last modified at `modified` is expired at `now`.
    ///
    /// Versions with an mtime in the future are never expired.
    pub fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        match now.duration_since(modified) {
            Ok(age) => age > self.expiry,
            Err(_) => false,
        }
    }

    /// Select the version directories to remove.
    ///
    /// When fewer than `min_keep_count` versions are still fresh, the newest
    /// expired versions are reprieved until the floor is met. If that takes
    /// every expired version, nothing is selected.
    pub fn select_expired(&self, dirs: &[VersionDir], now: SystemTime) -> Vec<String> {
        let mut expired = Vec::new();
        let mut retained = 0usize;
        for dir in dirs {
            if self.is_expired(dir.modified, now) {
                expired.push(dir.name.clone());
            } else {
                retained += 1;
            }
        }

        if retained >= self.min_keep_count {
            return expired;
        }

        let reprieve = self.min_keep_count - retained;
        if reprieve >= expired.len() {
            return Vec::new();
        }

        // Stamps sort chronologically, so the tail is the newest.
        expired.sort();
        expired.truncate(expired.len() - reprieve);
        expired
    }
}

/// A version directory found under a resource's cache base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDir {
    /// Directory name (a version stamp)
    pub name: String,
    /// Last modification time
    pub modified: SystemTime,
}

impl VersionDir {
    /// Create a version directory entry.
    pub fn new(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            modified,
        }
    }
}

/// Result of one eviction pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvictionReport {
    /// Number of version directories scanned
    pub scanned: usize,
    /// Names selected for removal
    pub selected: Vec<String>,
    /// Number of directories actually removed
    pub removed: usize,
    /// Errors encountered (non-fatal)
    pub errors: Vec<String>,
}
