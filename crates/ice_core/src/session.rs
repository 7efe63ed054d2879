//! Per-session conversational state: the turn log, the active file and the
//! edit history that undo walks back through.

use crate::blob_store::write_atomic;
use crate::error::{IceError, Result};
use crate::files::{FileManager, WriteOutcome};
use crate::types::{ConversationTurn, EditRecord, Intent, TurnId};
use crate::TimeProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name of the persisted session inside `.ice/`.
pub const SESSION_FILE: &str = "session.json";

/// The edit an undo would revert, as returned by
/// [`SessionContext::propose_undo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoProposal {
    /// Position of the edit in the history.
    pub index: usize,
    /// The edit as it was when proposed.
    pub edit: EditRecord,
}

/// Counts and timings for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub turns: usize,
    pub edits: usize,
    pub reverted: usize,
    pub active_file: Option<String>,
    /// Files recent turns targeted, newest first.
    pub working_files: Vec<String>,
    pub index_version: u64,
    pub created_at: i64,
    pub duration: Duration,
}

/// Files listed in [`SessionSummary::working_files`].
const WORKING_FILES: usize = 5;

/// State of one interactive session.
///
/// Turns are only ever appended and edits only ever appended or flagged as
/// reverted; nothing else mutates the session.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionContext {
    session_id: Uuid,
    turns: Vec<ConversationTurn>,
    active_file: Option<String>,
    edit_history: Vec<EditRecord>,
    index_version_ref: u64,
    created_at: i64,

    /// Time provider for testing (None = use system time).
    #[serde(skip)]
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("turns", &self.turns.len())
            .field("active_file", &self.active_file)
            .field("edits", &self.edit_history.len())
            .field("index_version_ref", &self.index_version_ref)
            .finish()
    }
}

impl SessionContext {
    /// Starts an empty session bound to an index version.
    pub fn new(index_version: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            turns: Vec::new(),
            active_file: None,
            edit_history: Vec::new(),
            index_version_ref: index_version,
            created_at: crate::unix_now(),
            time_provider: None,
        }
    }

    /// Injects a clock. Resets `created_at` if the session has no turns yet.
    pub fn with_time_provider(self, provider: impl TimeProvider + 'static) -> Self {
        self.with_shared_clock(Arc::new(provider))
    }

    pub(crate) fn with_shared_clock(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        if self.turns.is_empty() {
            self.created_at = provider.now();
        }
        self.time_provider = Some(provider);
        self
    }

    fn now(&self) -> i64 {
        self.time_provider
            .as_ref()
            .map_or_else(crate::unix_now, |p| p.now())
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn active_file(&self) -> Option<&str> {
        self.active_file.as_deref()
    }

    pub fn edit_history(&self) -> &[EditRecord] {
        &self.edit_history
    }

    /// Newest index version any turn was resolved against.
    pub fn index_version_ref(&self) -> u64 {
        self.index_version_ref
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Whether the session started more than `max_age` ago.
    pub fn is_expired(&self, max_age: Duration) -> bool {
        let age = self.now().saturating_sub(self.created_at);
        age > 0 && age as u64 > max_age.as_secs()
    }

    /// Distinct files targeted by the turns, newest first, at most `limit`.
    pub fn working_files(&self, limit: usize) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for target in self.turns.iter().rev().filter_map(|t| t.resolved_intent.target_path()) {
            if files.len() == limit {
                break;
            }
            if !files.iter().any(|f| f == target) {
                files.push(target.to_string());
            }
        }
        files
    }

    /// Id the next appended turn will get. Ids start at 1.
    pub fn next_turn_id(&self) -> TurnId {
        self.turns.last().map_or(1, |t| t.id + 1)
    }

    /// The last `k` turns, oldest first.
    pub fn recent_turns(&self, k: usize) -> &[ConversationTurn] {
        &self.turns[self.turns.len().saturating_sub(k)..]
    }

    /// Appends a completed turn and returns its id.
    ///
    /// A successful create, edit or execute that names a target makes that
    /// target the active file.
    pub fn append_turn(
        &mut self,
        raw_input: impl Into<String>,
        intent: Intent,
        result_summary: impl Into<String>,
        index_version: u64,
        succeeded: bool,
    ) -> TurnId {
        let id = self.next_turn_id();
        if succeeded && intent.intent_type().updates_active_file() {
            if let Some(target) = intent.target_path() {
                self.active_file = Some(target.to_string());
            }
        }
        self.index_version_ref = self.index_version_ref.max(index_version);
        self.turns.push(ConversationTurn {
            id,
            raw_input: raw_input.into(),
            resolved_intent: intent,
            timestamp: self.now(),
            result_summary: result_summary.into(),
            index_version,
        });
        debug!(turn = id, "turn appended");
        id
    }

    /// Records an accepted mutation. This is the only way the history grows.
    pub fn record_edit(&mut self, path: impl Into<String>, outcome: WriteOutcome, turn_id: TurnId) -> usize {
        let path = path.into();
        debug!(path = %path, turn = turn_id, "edit recorded");
        self.edit_history.push(EditRecord {
            path,
            before_hash: outcome.before,
            after_hash: outcome.after,
            turn_id,
            reverted: false,
        });
        self.edit_history.len() - 1
    }

    fn newest_eligible(&self) -> Option<usize> {
        self.edit_history.iter().rposition(|e| !e.reverted)
    }

    /// Returns the edit the next undo would revert, without changing anything.
    ///
    /// # Errors
    ///
    /// `NothingToUndo` if every edit is already reverted.
    pub fn propose_undo(&self) -> Result<UndoProposal> {
        let index = self.newest_eligible().ok_or(IceError::NothingToUndo)?;
        Ok(UndoProposal {
            index,
            edit: self.edit_history[index].clone(),
        })
    }

    /// Reverts the proposed edit through `files` and marks it reverted.
    ///
    /// # Errors
    ///
    /// `StaleUndoProposal` if the proposal is no longer the newest
    /// un-reverted edit. Restore failures leave the edit un-reverted.
    pub fn confirm_undo(&mut self, proposal: &UndoProposal, files: &dyn FileManager) -> Result<EditRecord> {
        let current = self.newest_eligible().ok_or(IceError::NothingToUndo)?;
        if current != proposal.index || self.edit_history[current] != proposal.edit {
            return Err(IceError::StaleUndoProposal {
                index: proposal.index,
            });
        }

        let edit = &mut self.edit_history[current];
        files.restore(&edit.path, edit.before_hash)?;
        edit.reverted = true;
        info!(path = %edit.path, turn = edit.turn_id, "edit reverted");
        Ok(edit.clone())
    }

    /// Reverts up to `n` of the most recent un-reverted edits, newest first.
    ///
    /// `n == 0` reverts nothing. If a restore fails after at least one edit
    /// was reverted, undo stops there and returns the edits it did revert;
    /// the failed edit stays un-reverted.
    ///
    /// # Errors
    ///
    /// `NothingToUndo` if there was nothing to revert at all, or the restore
    /// error if the very first revert failed.
    pub fn undo(&mut self, n: usize, files: &dyn FileManager) -> Result<Vec<EditRecord>> {
        let mut reverted = Vec::new();
        for _ in 0..n {
            let proposal = match self.propose_undo() {
                Ok(p) => p,
                Err(IceError::NothingToUndo) if !reverted.is_empty() => break,
                Err(e) => return Err(e),
            };
            match self.confirm_undo(&proposal, files) {
                Ok(edit) => reverted.push(edit),
                Err(e) if !reverted.is_empty() => {
                    warn!(path = %proposal.edit.path, error = %e, done = reverted.len(), "undo stopped early");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reverted)
    }

    pub fn summary(&self) -> SessionSummary {
        let reverted = self.edit_history.iter().filter(|e| e.reverted).count();
        let end = self.turns.last().map_or_else(|| self.now(), |t| t.timestamp);
        SessionSummary {
            session_id: self.session_id,
            turns: self.turns.len(),
            edits: self.edit_history.len(),
            reverted,
            active_file: self.active_file.clone(),
            working_files: self.working_files(WORKING_FILES),
            index_version: self.index_version_ref,
            created_at: self.created_at,
            duration: Duration::from_secs((end - self.created_at).max(0) as u64),
        }
    }

    /// Writes the session to `<ice_dir>/session.json`.
    pub fn save(&self, ice_dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| IceError::Serialization(e.to_string()))?;
        write_atomic(&ice_dir.join(SESSION_FILE), &json)?;
        debug!(turns = self.turns.len(), "session saved");
        Ok(())
    }

    /// Reads a saved session, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// `SessionCorrupted` if the file exists but does not parse.
    pub fn load(ice_dir: &Path) -> Result<Option<Self>> {
        let path = ice_dir.join(SESSION_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session: Self = serde_json::from_slice(&bytes).map_err(|e| IceError::SessionCorrupted {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        info!(session = %session.session_id, turns = session.turns.len(), "session resumed");
        Ok(Some(session))
    }
}
