//! Error types for ice_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for ice_core operations.
///
/// Most variants describe degraded-but-recoverable conditions: the component
/// that raises them also owns the continuation (rebuild, fallback, report).
/// Only [`IceError::CacheUnavailable`] is meant to reach the host as a hard
/// failure.
#[derive(Error, Debug)]
pub enum IceError {
    /// A file could not be parsed; its symbols were dropped from the index.
    #[error("parse degraded for {path}: {reason}")]
    ParseDegraded {
        /// Path of the file that failed to parse
        path: String,
        /// What made the content unparseable
        reason: String,
    },

    /// The persisted index cache is absent, stale, or corrupted.
    #[error("index cache invalid: {reason}")]
    IndexCacheInvalid {
        /// Why the cache was rejected
        reason: String,
    },

    /// The index cache can neither be loaded nor written.
    #[error("index cache unavailable at {}: {}", path.display(), reason)]
    CacheUnavailable {
        /// Location of the cache file
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The language-model capability reported a failure.
    #[error("language model error: {0}")]
    ProviderError(String),

    /// The language-model capability did not answer in time.
    #[error("language model timed out after {timeout_ms}ms")]
    ProviderTimeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// The language-model answer did not fit the intent schema.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// There is no un-reverted edit left to undo.
    #[error("nothing to undo")]
    NothingToUndo,

    /// An undo proposal no longer matches the edit history.
    #[error("stale undo proposal for edit #{index}")]
    StaleUndoProposal {
        /// Position of the proposed edit in the history
        index: usize,
    },

    /// The input could not be resolved to any actionable intent.
    #[error("could not understand request: {0}")]
    UnknownIntent(String),

    /// A turn was started while another one is still outstanding.
    #[error("turn {pending} is still in progress")]
    TurnInProgress {
        /// Id of the outstanding turn
        pending: u64,
    },

    /// A completion or confirmation referenced a turn that is not pending.
    #[error("no pending turn with id {0}")]
    NoPendingTurn(u64),

    /// A file was not found by the file manager.
    #[error("file not found: {0}")]
    NotFound(String),

    /// A stored backup blob is missing.
    #[error("backup blob not found: {0}")]
    BlobNotFound(String),

    /// A stored backup blob failed verification.
    #[error("corrupted blob at {}: {}", path.display(), reason)]
    CorruptedBlob {
        /// Path to the corrupted blob
        path: PathBuf,
        /// Description of the corruption
        reason: String,
    },

    /// Blob exceeds maximum allowed size.
    #[error("blob too large: {size} bytes exceeds limit of {limit} bytes")]
    BlobTooLarge {
        /// Actual size of the blob
        size: usize,
        /// Maximum allowed size
        limit: usize,
    },

    /// Invalid hex string for ContentHash parsing.
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// A path escapes the workspace root.
    #[error("path outside workspace: {0}")]
    PathOutsideWorkspace(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Persisted session file could not be read back.
    #[error("session file corrupted at {}: {}", path.display(), reason)]
    SessionCorrupted {
        /// Path to the session file
        path: PathBuf,
        /// Description of the problem
        reason: String,
    },

    /// A background index task panicked or could not be joined.
    #[error("background task failed: {0}")]
    BackgroundTask(String),

    /// Workspace is locked by another process.
    #[error("workspace locked by another process")]
    WorkspaceLocked,

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IceError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::CacheUnavailable { .. } => {
                Some("Check permissions on the .ice directory, or delete .ice/index.cache and run 'ice reindex'.")
            }
            Self::IndexCacheInvalid { .. } => Some("Run 'ice reindex' to rebuild the index cache."),
            Self::NothingToUndo => Some("Every edit of this session has already been reverted."),
            Self::StaleUndoProposal { .. } => Some("Request a fresh undo proposal and confirm again."),
            Self::UnknownIntent(_) => Some("Type 'help' to see the kinds of requests that are understood."),
            Self::TurnInProgress { .. } => {
                Some("Complete or decline the outstanding turn before sending another request.")
            }
            Self::WorkspaceLocked => {
                Some("Wait for the other process to finish, or remove .ice/LOCK if that process is dead.")
            }
            Self::SessionCorrupted { .. } => {
                Some("Move .ice/session.json aside to start a fresh session.")
            }
            Self::ProviderTimeout { .. } => {
                Some("Raise [disambiguator].timeout_ms in .ice/config.toml if the provider is slow.")
            }
            _ => None,
        }
    }

    /// Whether this error leaves the engine unable to make safe progress.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CacheUnavailable { .. })
    }
}

/// Convenience Result type for ice_core operations.
pub type Result<T> = std::result::Result<T, IceError>;
