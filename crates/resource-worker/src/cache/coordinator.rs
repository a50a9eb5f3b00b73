//! Single-flight cache coordination
//!
//! One [`CacheCoordinator`] owns one status flag guarded by a mutex and a
//! condition variable. A caller that finds the version directory missing
//! (or the last attempt failed) flips the status to `Populating` and runs the
//! populate sequence outside the lock: preclean staging, fetch, promote.
//! Everyone arriving meanwhile waits for that attempt and adopts its outcome.
//!
//! The status is per coordinator, not per resource. A caller waiting on an
//! attempt for resource A adopts A's outcome even if it asked for resource B,
//! and does not re-check B's directory after waking.

use std::fmt;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use resource_descriptor::ArtifactDescriptor;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::{CacheError, CacheResult};
use super::eviction::{EvictionReport, VersionDir};
use super::strategy::{append_raw, CacheStrategy, FileCacheStrategy};
use crate::cancel::CancelToken;
use crate::config::CacheSettings;
use crate::store::RemoteStore;

/// Granularity at which a cancellable waiter re-checks its token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Coordinator status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Nothing pending; last attempt (if any) succeeded
    #[default]
    Succeeded,
    /// An attempt is running
    Populating,
    /// Last attempt failed
    Failed,
}

impl CacheStatus {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Populating => "populating",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct CacheState {
    status: CacheStatus,
    /// Completed attempts; waiters compare it to tell a signal from a timeout
    generation: u64,
    /// Outcome of the most recently completed attempt
    last_outcome: CacheStatus,
}

/// Single-flight cache engine.
pub struct CacheCoordinator {
    strategy: Arc<dyn CacheStrategy>,
    store: Arc<dyn RemoteStore>,
    settings: CacheSettings,
    state: Mutex<CacheState>,
    attempt_done: Condvar,
}

impl fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("settings", &self.settings)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl CacheCoordinator {
    /// Create a coordinator from its parts.
    pub fn new(
        strategy: Arc<dyn CacheStrategy>,
        store: Arc<dyn RemoteStore>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            strategy,
            store,
            settings,
            state: Mutex::new(CacheState::default()),
            attempt_done: Condvar::new(),
        }
    }

    /// Create a coordinator for file resources.
    pub fn file_cache(settings: CacheSettings, store: Arc<dyn RemoteStore>) -> Self {
        let strategy = Arc::new(FileCacheStrategy::from_settings(&settings));
        Self::new(strategy, store, settings)
    }

    /// The settings this coordinator was built with.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Current status snapshot.
    pub fn status(&self) -> CacheStatus {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Per-resource cache namespace.
    pub fn cache_base_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.strategy.cache_base_dir(descriptor)
    }

    /// Staging directory for downloads.
    pub fn download_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.strategy.download_dir(descriptor)
    }

    /// Version directory for this descriptor.
    pub fn cache_dir(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.cache_base_dir(descriptor)
            .join(self.version_stamp(descriptor))
    }

    /// Version stamp naming this descriptor's cache directory.
    pub fn version_stamp(&self, descriptor: &ArtifactDescriptor) -> String {
        self.settings.version_format.render(&descriptor.update_time)
    }

    /// Local path the remote store writes to: the download directory with the
    /// resource name appended verbatim.
    pub fn resource_download_path(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        append_raw(&self.download_dir(descriptor), &descriptor.name)
    }

    /// Ensure this descriptor's version is on disk, blocking until it is or
    /// until population definitively fails.
    pub fn ensure_cached(&self, descriptor: &ArtifactDescriptor) -> CacheResult<()> {
        self.ensure_cached_with(descriptor, &CancelToken::never())
    }

    /// Like [`ensure_cached`](Self::ensure_cached), but a wait on another
    /// caller's attempt gives up once `cancel` is cancelled.
    pub fn ensure_cached_with(
        &self,
        descriptor: &ArtifactDescriptor,
        cancel: &CancelToken,
    ) -> CacheResult<()> {
        let cache_dir = self.cache_dir(descriptor);

        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!(resource = %descriptor, "cache state lock poisoned, status unknown");
                let mut guard = poisoned.into_inner();
                if guard.status != CacheStatus::Populating {
                    guard.status = CacheStatus::Failed;
                }
                return Err(CacheError::UnknownState);
            }
        };

        let status = state.status;
        let outcome = match status {
            CacheStatus::Populating => {
                match self.wait_for_attempt(state, descriptor, cancel)? {
                    Some(outcome) => outcome,
                    None => {
                        return Err(CacheError::PopulationFailed {
                            resource_id: descriptor.id,
                            status: CacheStatus::Failed,
                            interrupted: true,
                        })
                    }
                }
            }
            CacheStatus::Succeeded if cache_dir.exists() => {
                debug!(resource = %descriptor, path = %cache_dir.display(), "cache hit");
                CacheStatus::Succeeded
            }
            CacheStatus::Succeeded | CacheStatus::Failed => {
                state.status = CacheStatus::Populating;
                drop(state);
                self.run_attempt(descriptor, &cache_dir)
            }
        };

        match outcome {
            CacheStatus::Succeeded => Ok(()),
            status => Err(CacheError::PopulationFailed {
                resource_id: descriptor.id,
                status,
                interrupted: false,
            }),
        }
    }

    /// Block until the in-flight attempt completes.
    ///
    /// Returns the attempt's outcome, or `None` if `cancel` fired first.
    fn wait_for_attempt(
        &self,
        mut state: MutexGuard<'_, CacheState>,
        descriptor: &ArtifactDescriptor,
        cancel: &CancelToken,
    ) -> CacheResult<Option<CacheStatus>> {
        let generation = state.generation;
        let cycle = self.settings.wait_timeout;
        let mut cycle_start = Instant::now();

        loop {
            if cancel.is_cancelled() {
                warn!(resource = %descriptor, "wait for cache population interrupted");
                return Ok(None);
            }

            let slice = if cancel.can_cancel() {
                cycle
                    .saturating_sub(cycle_start.elapsed())
                    .min(CANCEL_POLL_INTERVAL)
            } else {
                cycle
            };

            let (guard, _) = self
                .attempt_done
                .wait_timeout(state, slice)
                .map_err(|_| {
                    error!(resource = %descriptor, "cache state lock poisoned while waiting");
                    CacheError::UnknownState
                })?;
            state = guard;

            if state.generation != generation {
                return Ok(Some(state.last_outcome));
            }

            if cycle_start.elapsed() >= cycle {
                warn!(
                    resource = %descriptor,
                    timeout_secs = cycle.as_secs_f64(),
                    "still waiting for cache population"
                );
                cycle_start = Instant::now();
            }
        }
    }

    /// Run one populate attempt and publish its outcome to waiters.
    fn run_attempt(&self, descriptor: &ArtifactDescriptor, cache_dir: &Path) -> CacheStatus {
        info!(resource = %descriptor, path = %cache_dir.display(), "populating cache");

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.populate(descriptor, cache_dir)));
        let success = match &result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(resource = %descriptor, error = %e, "cache population failed");
                false
            }
            Err(_) => {
                error!(resource = %descriptor, "cache population panicked");
                false
            }
        };

        let outcome = if success {
            CacheStatus::Succeeded
        } else {
            CacheStatus::Failed
        };
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.status = outcome;
            state.last_outcome = outcome;
            state.generation = state.generation.wrapping_add(1);
            self.attempt_done.notify_all();
        }

        if let Err(payload) = result {
            panic::resume_unwind(payload);
        }

        if success {
            info!(resource = %descriptor, path = %cache_dir.display(), "cache populated");
            if let Err(e) = self.clean_expired(descriptor) {
                error!(resource = %descriptor, error = %e, "cleaning expired cache failed");
            }
        }
        outcome
    }

    /// Preclean, fetch, promote.
    fn populate(&self, descriptor: &ArtifactDescriptor, cache_dir: &Path) -> CacheResult<()> {
        self.before_populate(descriptor)?;
        self.fetch(descriptor)?;
        self.strategy.promote(descriptor, cache_dir)
    }

    /// Remove staging left behind by an earlier, interrupted attempt.
    fn before_populate(&self, descriptor: &ArtifactDescriptor) -> CacheResult<()> {
        for dir in self.strategy.directories_to_preclean(descriptor) {
            if dir.exists() {
                info!(resource = %descriptor, path = %dir.display(), "removing stale staging directory");
                fs::remove_dir_all(&dir)
                    .map_err(|source| CacheError::PreDownloadCleanupFailed { path: dir, source })?;
            }
        }
        Ok(())
    }

    fn fetch(&self, descriptor: &ArtifactDescriptor) -> CacheResult<()> {
        let local_path = self.resource_download_path(descriptor);
        let remote_path = self
            .store
            .remote_path(&descriptor.tenant_code, &descriptor.full_name);
        info!(
            resource = %descriptor,
            remote = %remote_path,
            local = %local_path.display(),
            "fetching resource"
        );

        let failed = |reason: String| CacheError::FetchFailed {
            full_name: descriptor.full_name.clone(),
            remote_path: remote_path.clone(),
            local_path: local_path.clone(),
            reason,
        };

        match self
            .store
            .fetch(&descriptor.tenant_code, &descriptor.full_name, &local_path)
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(failed("store reported an unsuccessful copy".to_string())),
            Err(e) => Err(failed(e.to_string())),
        }
    }

    /// Remove expired versions of this descriptor's resource.
    ///
    /// Individual deletion failures are recorded in the report and do not
    /// stop the remaining deletions. Only a failure to list the base
    /// directory is returned as an error.
    pub fn clean_expired(&self, descriptor: &ArtifactDescriptor) -> CacheResult<EvictionReport> {
        let base = self.cache_base_dir(descriptor);
        let versions = self
            .scan_versions(&base)
            .map_err(|source| CacheError::EvictionFailed {
                path: base.clone(),
                source,
            })?;

        let policy = &self.settings.eviction;
        let mut report = EvictionReport {
            scanned: versions.len(),
            selected: policy.select_expired(&versions, SystemTime::now()),
            ..EvictionReport::default()
        };

        for name in &report.selected {
            let path = base.join(name);
            if policy.dry_run {
                info!(resource = %descriptor, path = %path.display(), "dry-run: would remove expired cache");
                continue;
            }
            match self.strategy.remove_version(&path) {
                Ok(()) => {
                    info!(resource = %descriptor, path = %path.display(), "removed expired cache");
                    report.removed += 1;
                }
                Err(e) => {
                    error!(
                        resource = %descriptor,
                        path = %path.display(),
                        error = %e,
                        "failed to remove expired cache"
                    );
                    report.errors.push(format!("failed to delete {}: {}", path.display(), e));
                }
            }
        }

        Ok(report)
    }

    /// List version directories directly under `base`.
    fn scan_versions(&self, base: &Path) -> io::Result<Vec<VersionDir>> {
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let format = &self.settings.version_format;
        let mut versions = Vec::new();
        for entry in fs::read_dir(base)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) if format.is_version_stamp(&name) => name,
                _ => continue,
            };
            let modified = entry.metadata()?.modified()?;
            versions.push(VersionDir::new(name, modified));
        }
        Ok(versions)
    }

    /// Expose the cached version under `reference_parent`.
    pub fn materialize(
        &self,
        descriptor: &ArtifactDescriptor,
        reference_parent: &Path,
    ) -> CacheResult<()> {
        self.strategy
            .materialize(descriptor, &self.cache_dir(descriptor), reference_parent)
    }
}
