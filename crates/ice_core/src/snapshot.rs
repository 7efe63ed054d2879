//! Versioned, copy-on-write publication of index snapshots.
//!
//! Readers call [`IndexHandle::snapshot`] once at the start of an operation
//! and work on that `Arc` for its whole duration. Writers build a complete new
//! [`CodebaseIndex`] off to the side and swap it in with one pointer store, so
//! a reader sees either the old snapshot or the new one, never a mix.
//!
//! Writers are serialised: each build starts from the snapshot the previous
//! writer published, so overlapping refreshes never drop each other's files.

use crate::config::IndexConfig;
use crate::error::{IceError, Result};
use crate::index::CodebaseIndex;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Shared owner of the current index snapshot.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<CodebaseIndex>>,
    next_version: AtomicU64,
    writer: Mutex<()>,
}

impl IndexHandle {
    /// Wraps an initial snapshot.
    pub fn new(initial: CodebaseIndex) -> Self {
        let next = initial.version() + 1;
        Self {
            current: RwLock::new(Arc::new(initial)),
            next_version: AtomicU64::new(next),
            writer: Mutex::new(()),
        }
    }

    /// The current snapshot. Cheap; hold it for the duration of one operation.
    pub fn snapshot(&self) -> Arc<CodebaseIndex> {
        Arc::clone(&self.current.read())
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> u64 {
        self.current.read().version()
    }

    /// Reserves a version number greater than any handed out or published.
    fn allocate_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Makes `next` the current snapshot if its version is newer.
    ///
    /// Returns `false` (and leaves the current snapshot in place) when `next`
    /// is not strictly newer.
    pub fn publish(&self, next: CodebaseIndex) -> bool {
        let version = next.version();
        let mut current = self.current.write();
        if version <= current.version() {
            debug!(offered = version, current = current.version(), "stale snapshot discarded");
            return false;
        }
        *current = Arc::new(next);
        self.next_version.fetch_max(version + 1, Ordering::SeqCst);
        info!(version, "index snapshot published");
        true
    }

    /// Re-extracts `changed` on top of the current snapshot and publishes it.
    ///
    /// Returns the published version, or `None` if a newer snapshot was
    /// published while this one was being built.
    pub fn refresh(&self, root: &Path, changed: &BTreeSet<String>, config: &IndexConfig) -> Result<Option<u64>> {
        self.run(&Job::Update(changed.clone()), root, config, None)
    }

    /// Detects changed files against the tree and publishes an update for them.
    ///
    /// Returns `None` when nothing changed.
    pub fn refresh_detected(&self, root: &Path, config: &IndexConfig) -> Result<Option<u64>> {
        self.run(&Job::Detect, root, config, None)
    }

    /// Rebuilds from scratch and publishes the result.
    pub fn rebuild(&self, root: &Path, config: &IndexConfig) -> Result<Option<u64>> {
        self.run(&Job::Full, root, config, None)
    }

    /// Runs [`refresh`](Self::refresh) on a background thread.
    pub fn spawn_refresh(self: &Arc<Self>, root: PathBuf, changed: BTreeSet<String>, config: IndexConfig) -> Result<RefreshTask> {
        self.spawn(Job::Update(changed), root, config)
    }

    /// Runs [`rebuild`](Self::rebuild) on a background thread.
    pub fn spawn_rebuild(self: &Arc<Self>, root: PathBuf, config: IndexConfig) -> Result<RefreshTask> {
        self.spawn(Job::Full, root, config)
    }

    fn spawn(self: &Arc<Self>, job: Job, root: PathBuf, config: IndexConfig) -> Result<RefreshTask> {
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = Arc::clone(self);
        let flag = Arc::clone(&cancel);
        let join = thread::Builder::new()
            .name("ice-index-refresh".to_string())
            .spawn(move || handle.run(&job, &root, &config, Some(&flag)))?;
        Ok(RefreshTask { cancel, join })
    }

    fn run(&self, job: &Job, root: &Path, config: &IndexConfig, cancel: Option<&AtomicBool>) -> Result<Option<u64>> {
        let _writer = self.writer.lock();
        let base = self.snapshot();
        let next = match job {
            Job::Full => base.rebuild(root, config)?,
            Job::Update(changed) => base.incremental_update(root, changed, config)?,
            Job::Detect => {
                let changed = base.detect_changes(root, config);
                if changed.is_empty() {
                    return Ok(None);
                }
                base.incremental_update(root, &changed, config)?
            }
        };

        if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            debug!("index refresh cancelled, result discarded");
            return Ok(None);
        }

        let version = self.allocate_version();
        let next = next.with_version(version);
        Ok(self.publish(next).then_some(version))
    }
}

enum Job {
    Full,
    Update(BTreeSet<String>),
    Detect,
}

/// A background refresh started by [`IndexHandle::spawn_refresh`] or
/// [`IndexHandle::spawn_rebuild`].
#[derive(Debug)]
pub struct RefreshTask {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<Result<Option<u64>>>,
}

impl RefreshTask {
    /// Asks the task to discard its result instead of publishing it.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the task. `Ok(None)` means nothing was published.
    pub fn join(self) -> Result<Option<u64>> {
        self.join
            .join()
            .map_err(|_| IceError::BackgroundTask("index refresh thread panicked".to_string()))?
    }
}
