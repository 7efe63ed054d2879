//! ICE Core Library
//!
//! Intent resolution and session context for a conversational coding
//! assistant:
//! - A symbol index over the project, rebuilt incrementally and published as
//!   immutable, versioned snapshots
//! - Rule-based intent matching with language-model escalation
//! - Per-session turn log, active file and undoable edit history
//!
//! # Quick Start
//!
//! ```
//! use ice_core::{CodebaseIndex, IndexConfig};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! std::fs::write(tmp.path().join("gen.py"), "class CodeGenerator:\n    pass\n").unwrap();
//!
//! let index = CodebaseIndex::build(tmp.path(), &IndexConfig::default()).unwrap();
//! let hits = index.search("CodeGenerator", 10);
//! assert_eq!(hits[0].file.path, "gen.py");
//! ```
//!
//! # Resolving Requests
//!
//! ```
//! use ice_core::{IntentType, Matcher, ResolutionContext, Resolver};
//!
//! let matcher = Matcher::default();
//! let intent = matcher.resolve("Create a Python function for parsing dates", &ResolutionContext::new(1));
//! assert_eq!(intent.intent_type(), IntentType::CreateFile);
//! assert_eq!(intent.param("language"), Some("python"));
//! ```
//!
//! # Sessions
//!
//! A [`Workspace`] owns the `.ice/` directory; [`Workspace::orchestrator`]
//! wires an [`Orchestrator`] that runs turns against the persisted session:
//!
//! ```no_run
//! use ice_core::{TurnOutcome, TurnResponse, Workspace};
//!
//! let ws = Workspace::open(".").unwrap();
//! let mut orchestrator = ws.orchestrator(None).unwrap();
//! if let TurnResponse::Proceed(turn) = orchestrator.handle_input("explain main.py").unwrap() {
//!     orchestrator.complete_turn(turn.turn_id, TurnOutcome::success("explained")).unwrap();
//! }
//! ```

mod blob_store;
mod cache;
mod config;
mod content_hash;
mod disambiguator;
mod error;
mod extract;
mod files;
mod imports;
mod index;
mod matcher;
mod orchestrator;
mod resolver;
mod session;
mod snapshot;
mod types;
mod workspace;

pub use blob_store::BlobStore;
pub use cache::{IndexCache, LoadOutcome, SCHEMA_VERSION};
pub use config::{Config, DisambiguatorConfig, IndexConfig, MatcherConfig, SessionConfig};
pub use content_hash::ContentHash;
pub use disambiguator::{
    CommandModel, Disambiguation, Disambiguator, HitDigest, LanguageModel, ModelContext, OfflineModel,
};
pub use error::{IceError, Result};
pub use extract::{count_lines, extract, Extraction};
pub use files::{FileManager, WorkspaceFiles, WriteOutcome};
pub use index::{scan, CodebaseIndex, FileContext, ProjectSummary, SearchHit};
pub use matcher::{keywords, normalize, Matcher, Normalized};
pub use orchestrator::{
    AppliedEdit, ConfirmReason, ContextBundle, Orchestrator, PendingAction, ResolvedTurn, TurnOutcome,
    TurnResponse, UserChoice, HELP_TEXT,
};
pub use resolver::{ResolutionContext, Resolver};
pub use session::{SessionContext, SessionSummary, UndoProposal, SESSION_FILE};
pub use snapshot::{IndexHandle, RefreshTask};
pub use types::*;
pub use workspace::{ReindexReport, Workspace, ICE_DIR};

/// Time provider trait for testing.
///
/// Allows injecting controlled time into sessions.
pub trait TimeProvider: Send + Sync {
    /// Returns the current Unix timestamp in seconds.
    fn now(&self) -> i64;
}

impl<F> TimeProvider for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn now(&self) -> i64 {
        self()
    }
}

/// Current Unix time in seconds (0 if the clock is before the epoch).
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
