//! Workspace handle: the project root plus its `.ice/` directory.
//!
//! ```text
//! .ice/
//!   config.toml     settings (see [`Config`])
//!   index.cache     persisted codebase index
//!   session.json    resumable session
//!   objects/        backups of every overwritten file version
//!   LOCK            held while a process has the workspace open
//! ```

use crate::blob_store::BlobStore;
use crate::cache::{IndexCache, LoadOutcome};
use crate::config::Config;
use crate::disambiguator::{Disambiguator, LanguageModel};
use crate::error::{IceError, Result};
use crate::files::WorkspaceFiles;
use crate::orchestrator::Orchestrator;
use crate::session::SessionContext;
use crate::snapshot::IndexHandle;
use crate::TimeProvider;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the workspace state directory.
pub const ICE_DIR: &str = ".ice";

const GITIGNORE: &str = "# ICE rebuildable and machine-local state
index.cache
index.lock
session.json
objects/
LOCK
*.tmp
";

/// What [`Workspace::reindex`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexReport {
    /// Files re-extracted (all of them for a full rebuild).
    pub changed: usize,
    /// Version published, or `None` if nothing changed.
    pub version: Option<u64>,
}

/// An open workspace. Holds `.ice/LOCK` until dropped.
pub struct Workspace {
    root: PathBuf,
    config: Config,
    cache: IndexCache,
    index: Arc<IndexHandle>,
    blobs: BlobStore,
    load_outcome: LoadOutcome,
    _lock: LockGuard,
}

impl Workspace {
    /// Creates `.ice/` under `root` with a default configuration, then opens it.
    ///
    /// # Errors
    ///
    /// Fails if `.ice/` already exists.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let ice_dir = root.join(ICE_DIR);
        if ice_dir.exists() {
            return Err(IceError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("ICE workspace already exists in {}", root.display()),
            )));
        }

        fs::create_dir_all(ice_dir.join("objects"))?;
        Config::default().save(&ice_dir)?;
        fs::write(ice_dir.join(".gitignore"), GITIGNORE)?;
        info!(root = %root.display(), "workspace initialized");

        Self::open(root)
    }

    /// Opens an existing workspace, loading the index from cache or building it.
    ///
    /// # Errors
    ///
    /// Fails if `.ice/` is missing, another process holds the lock, the
    /// configuration is invalid, or the cache can neither be loaded nor
    /// written.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let ice_dir = root.join(ICE_DIR);
        if !ice_dir.is_dir() {
            return Err(IceError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("not an ICE workspace: {}", root.display()),
            )));
        }

        let lock = LockGuard::acquire(&ice_dir.join("LOCK"))?;
        let config = Config::load(&ice_dir)?;
        let cache = IndexCache::in_dir(&ice_dir, &config.index);
        let (index, load_outcome) = cache.load_or_build(&root, &config.index)?;
        let blobs = BlobStore::new(ice_dir.join("objects"), config.index.compression_level);

        Ok(Self {
            root,
            index: Arc::new(IndexHandle::new(index)),
            config,
            cache,
            blobs,
            load_outcome,
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ice_dir(&self) -> PathBuf {
        self.root.join(ICE_DIR)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    /// Whether the index came from cache or had to be rebuilt on open.
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    /// File manager rooted at the workspace, backing up into `.ice/objects`.
    pub fn files(&self) -> WorkspaceFiles {
        WorkspaceFiles::new(&self.root, self.blobs.clone())
    }

    /// Writes the current snapshot to the cache.
    pub fn save_index(&self) -> Result<()> {
        self.cache.persist(&self.index.snapshot())
    }

    /// Re-extracts files that changed on disk (or everything, with `full`),
    /// publishes the result and saves it to the cache.
    pub fn reindex(&self, full: bool) -> Result<ReindexReport> {
        let config = &self.config.index;
        let (changed, version) = if full {
            let version = self.index.rebuild(&self.root, config)?;
            (self.index.snapshot().len(), version)
        } else {
            let changed = self.index.snapshot().detect_changes(&self.root, config);
            if changed.is_empty() {
                return Ok(ReindexReport {
                    changed: 0,
                    version: None,
                });
            }
            let version = self.index.refresh(&self.root, &changed, config)?;
            (changed.len(), version)
        };
        self.save_index()?;
        Ok(ReindexReport { changed, version })
    }

    /// Resumes the saved session, or starts a new one.
    ///
    /// A corrupted session file is reported and replaced by a fresh session,
    /// and so is a session older than `[session] max_age_hours`.
    pub fn session(&self) -> Result<SessionContext> {
        self.resume(None)
    }

    /// Like [`session`](Self::session), with `clock` deciding expiry and
    /// stamping new turns.
    pub fn session_with_clock(&self, clock: impl TimeProvider + 'static) -> Result<SessionContext> {
        self.resume(Some(Arc::new(clock)))
    }

    fn resume(&self, clock: Option<Arc<dyn TimeProvider>>) -> Result<SessionContext> {
        let attach = |session: SessionContext| match &clock {
            Some(clock) => session.with_shared_clock(Arc::clone(clock)),
            None => session,
        };
        let fresh = || attach(SessionContext::new(self.index.version()));

        let saved = match SessionContext::load(&self.ice_dir()) {
            Ok(Some(session)) => attach(session),
            Ok(None) => return Ok(fresh()),
            Err(err @ IceError::SessionCorrupted { .. }) => {
                warn!("{}", err);
                return Ok(fresh());
            }
            Err(err) => return Err(err),
        };
        match self.config.session.max_age() {
            Some(max_age) if saved.is_expired(max_age) => {
                info!(session = %saved.session_id(), "saved session expired, starting a new one");
                Ok(fresh())
            }
            _ => Ok(saved),
        }
    }

    /// Wires an orchestrator over this workspace's index, files and session.
    ///
    /// Uses `model` if given, otherwise whatever `[disambiguator]` configures.
    pub fn orchestrator(&self, model: Option<Arc<dyn LanguageModel>>) -> Result<Orchestrator> {
        let disambiguator = match model {
            Some(model) => Disambiguator::new(model, self.config.disambiguator.clone()),
            None => Disambiguator::from_config(self.config.disambiguator.clone())?,
        };
        Ok(Orchestrator::new(
            &self.root,
            self.config.clone(),
            Arc::clone(&self.index),
            Arc::new(self.files()),
            self.session()?,
            disambiguator,
        )
        .with_persistence(self.ice_dir()))
    }
}

/// Exclusive hold on `.ice/LOCK`. The file records the holder's PID so a lock
/// left behind by a dead process can be reclaimed.
struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: &Path) -> Result<Self> {
        for _ in 0..3 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    file.flush()?;
                    file.try_lock_exclusive().map_err(|_| IceError::WorkspaceLocked)?;
                    return Ok(Self {
                        file: Some(file),
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    match holder {
                        Some(pid) if is_process_alive(pid) => return Err(IceError::WorkspaceLocked),
                        Some(pid) => warn!(pid, "removing stale workspace lock"),
                        None => warn!("workspace lock unreadable, removing it"),
                    }
                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(IceError::WorkspaceLocked)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}/stat", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
