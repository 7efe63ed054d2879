//! Turn orchestration.
//!
//! A turn runs in up to three steps:
//!
//! 1. [`Orchestrator::handle_input`] resolves the text (matcher first, model
//!    only when the matcher is unsure) and answers with a [`TurnResponse`].
//! 2. If the response is [`TurnResponse::Confirm`], the host asks the user and
//!    calls [`Orchestrator::respond`].
//! 3. Once the host has carried out a [`TurnResponse::Proceed`] intent it
//!    reports back through [`Orchestrator::complete_turn`], which appends the
//!    turn and records any edits.
//!
//! Only one turn may be outstanding at a time. The orchestrator decides what
//! should happen; generating code, editing and running it is up to the host.

use crate::config::Config;
use crate::disambiguator::Disambiguator;
use crate::error::{IceError, Result};
use crate::files::{FileManager, WriteOutcome};
use crate::index::CodebaseIndex;
use crate::matcher::{keywords, Matcher};
use crate::resolver::{ResolutionContext, Resolver};
use crate::session::{SessionContext, UndoProposal};
use crate::snapshot::{IndexHandle, RefreshTask};
use crate::types::{ConversationTurn, EditRecord, FileRecord, Intent, IntentSource, IntentType, TurnId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Files handed to collaborators along with a resolved intent.
const MAX_CONTEXT_FILES: usize = 8;

pub const HELP_TEXT: &str = "\
Requests I understand:
  create a python function for <something>   edit <file>      delete <file>
  run <file> | run it                        analyze <file>   debug <file>
  write tests for <file>                     explain <file>   refactor <file>
  find <symbol>                              status           undo
";

/// What collaborators get to work with for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBundle {
    /// Most relevant files first: the target, the active file, their
    /// imports and importers, then search hits.
    pub files: Vec<Arc<FileRecord>>,
    pub active_file: Option<String>,
    pub recent_turns: Vec<ConversationTurn>,
    pub index_version: u64,
}

/// A resolved intent the host should now carry out.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTurn {
    pub turn_id: TurnId,
    pub intent: Intent,
    pub context: ContextBundle,
}

/// Why a turn needs the user's go-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmReason {
    /// Deletes, runs or reverts something.
    Destructive,
    /// The model answered, but not confidently enough to act on.
    LowConfidence,
}

/// A turn waiting for [`Orchestrator::respond`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub turn: ResolvedTurn,
    pub raw_input: String,
    pub reason: ConfirmReason,
    /// For undo turns, the edit that will be reverted.
    pub undo: Option<UndoProposal>,
}

/// The user's answer to a [`TurnResponse::Confirm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    Confirm,
    Decline,
}

/// What the host should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResponse {
    /// Carry out the intent, then call [`Orchestrator::complete_turn`].
    Proceed(ResolvedTurn),
    /// Show `message`, then call [`Orchestrator::respond`].
    Confirm { message: String, pending: PendingAction },
    /// The turn is over; show `message`.
    Done { turn_id: TurnId, message: String },
    /// The request was `help` or could not be understood; the turn is over.
    Help { turn_id: TurnId, message: String },
}

/// One file mutation the host performed through the [`FileManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
    pub path: String,
    pub outcome: WriteOutcome,
}

/// Result of carrying out a [`ResolvedTurn`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub summary: String,
    pub succeeded: bool,
    pub edits: Vec<AppliedEdit>,
}

impl TurnOutcome {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            succeeded: true,
            edits: Vec::new(),
        }
    }

    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            succeeded: false,
            edits: Vec::new(),
        }
    }

    pub fn with_edit(mut self, path: impl Into<String>, outcome: WriteOutcome) -> Self {
        self.edits.push(AppliedEdit {
            path: path.into(),
            outcome,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitingChoice,
    AwaitingCompletion,
}

#[derive(Debug)]
struct Outstanding {
    pending: PendingAction,
    stage: Stage,
}

/// Drives turns against one session.
pub struct Orchestrator {
    root: PathBuf,
    config: Config,
    index: Arc<IndexHandle>,
    files: Arc<dyn FileManager>,
    session: SessionContext,
    matcher: Matcher,
    disambiguator: Disambiguator,
    persist_to: Option<PathBuf>,
    outstanding: Option<Outstanding>,
    refresh: Option<RefreshTask>,
}

impl Orchestrator {
    pub fn new(
        root: impl AsRef<Path>,
        config: Config,
        index: Arc<IndexHandle>,
        files: Arc<dyn FileManager>,
        session: SessionContext,
        disambiguator: Disambiguator,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            matcher: Matcher::new(config.matcher.clone()),
            config,
            index,
            files,
            session,
            disambiguator,
            persist_to: None,
            outstanding: None,
            refresh: None,
        }
    }

    /// Saves the session into `ice_dir` after every appended turn.
    pub fn with_persistence(mut self, ice_dir: impl AsRef<Path>) -> Self {
        self.persist_to = Some(ice_dir.as_ref().to_path_buf());
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    pub fn files(&self) -> &Arc<dyn FileManager> {
        &self.files
    }

    /// The turn waiting for a choice or a completion, if any.
    pub fn pending(&self) -> Option<&PendingAction> {
        self.outstanding.as_ref().map(|o| &o.pending)
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.outstanding {
            Some(o) => Err(IceError::TurnInProgress {
                pending: o.pending.turn.turn_id,
            }),
            None => Ok(()),
        }
    }

    /// Resolves the intent for `text` without touching any state.
    pub fn resolve(&self, text: &str) -> Intent {
        let snapshot = self.index.snapshot();
        self.resolve_against(text, &snapshot)
    }

    fn resolve_against(&self, text: &str, snapshot: &CodebaseIndex) -> Intent {
        let turn_id = self.session.next_turn_id();
        let context = ResolutionContext::new(turn_id)
            .with_active_file(self.session.active_file())
            .with_turns(self.session.recent_turns(self.config.disambiguator.context_turns))
            .with_index(snapshot);

        let guess = self.matcher.resolve(text, &context);
        if self.matcher.is_confident(&guess) {
            return guess;
        }
        debug!(guess = %guess.intent_type(), confidence = guess.confidence(), "escalating to language model");
        self.disambiguator.resolve(text, &context.with_best_guess(&guess))
    }

    /// Starts a turn.
    ///
    /// # Errors
    ///
    /// `TurnInProgress` if an earlier turn is still outstanding.
    pub fn handle_input(&mut self, text: &str) -> Result<TurnResponse> {
        self.ensure_idle()?;
        let snapshot = self.index.snapshot();
        let intent = self.resolve_against(text, &snapshot);
        let turn_id = intent.source_turn_id();

        match intent.intent_type() {
            IntentType::Unknown => {
                let err = IceError::UnknownIntent(text.trim().to_string());
                let message = format!("{}\n\n{}", err, HELP_TEXT);
                self.finish(text, intent, err.to_string(), snapshot.version(), false)?;
                return Ok(TurnResponse::Help { turn_id, message });
            }
            IntentType::Help => {
                self.finish(text, intent, "help shown", snapshot.version(), true)?;
                return Ok(TurnResponse::Help {
                    turn_id,
                    message: HELP_TEXT.to_string(),
                });
            }
            _ => {}
        }

        let undo = if intent.intent_type() == IntentType::Undo {
            match self.session.propose_undo() {
                Ok(proposal) => Some(proposal),
                Err(IceError::NothingToUndo) => {
                    let message = IceError::NothingToUndo.to_string();
                    self.finish(text, intent, message.clone(), snapshot.version(), false)?;
                    return Ok(TurnResponse::Done { turn_id, message });
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let reason = if intent.intent_type().requires_confirmation() {
            Some(ConfirmReason::Destructive)
        } else if intent.source() == IntentSource::Model && intent.confidence() < self.matcher.accept_threshold() {
            Some(ConfirmReason::LowConfidence)
        } else {
            None
        };

        let turn = ResolvedTurn {
            turn_id,
            context: self.bundle(text, &intent, &snapshot),
            intent,
        };
        let pending = PendingAction {
            turn,
            raw_input: text.to_string(),
            reason: reason.unwrap_or(ConfirmReason::Destructive),
            undo,
        };

        match reason {
            Some(_) => {
                let message = confirm_message(&pending);
                self.outstanding = Some(Outstanding {
                    pending: pending.clone(),
                    stage: Stage::AwaitingChoice,
                });
                Ok(TurnResponse::Confirm { message, pending })
            }
            None => {
                let resolved = pending.turn.clone();
                self.outstanding = Some(Outstanding {
                    pending,
                    stage: Stage::AwaitingCompletion,
                });
                Ok(TurnResponse::Proceed(resolved))
            }
        }
    }

    /// Answers a [`TurnResponse::Confirm`].
    ///
    /// Confirmed undo turns are carried out here; other confirmed turns come
    /// back as [`TurnResponse::Proceed`].
    ///
    /// # Errors
    ///
    /// `NoPendingTurn` if `turn_id` is not waiting for a choice.
    pub fn respond(&mut self, turn_id: TurnId, choice: UserChoice) -> Result<TurnResponse> {
        let outstanding = match self.outstanding.take() {
            Some(o) if o.pending.turn.turn_id == turn_id && o.stage == Stage::AwaitingChoice => o,
            other => {
                self.outstanding = other;
                return Err(IceError::NoPendingTurn(turn_id));
            }
        };
        let PendingAction {
            turn, raw_input, undo, ..
        } = outstanding.pending.clone();

        match (choice, undo) {
            (UserChoice::Decline, _) => {
                let message = "cancelled".to_string();
                self.finish(&raw_input, turn.intent, message.clone(), turn.context.index_version, false)?;
                Ok(TurnResponse::Done { turn_id, message })
            }
            (UserChoice::Confirm, Some(proposal)) => {
                let result = self.session.confirm_undo(&proposal, self.files.as_ref());
                let (message, succeeded) = match &result {
                    Ok(edit) => (format!("reverted {} (turn {})", edit.path, edit.turn_id), true),
                    Err(e) => (e.to_string(), false),
                };
                if let Ok(edit) = &result {
                    self.schedule_refresh(BTreeSet::from([edit.path.clone()]));
                }
                self.finish(&raw_input, turn.intent, message.clone(), turn.context.index_version, succeeded)?;
                match result {
                    Ok(_) => Ok(TurnResponse::Done { turn_id, message }),
                    Err(e) => Err(e),
                }
            }
            (UserChoice::Confirm, None) => {
                self.outstanding = Some(Outstanding {
                    stage: Stage::AwaitingCompletion,
                    ..outstanding
                });
                Ok(TurnResponse::Proceed(turn))
            }
        }
    }

    /// Closes a [`TurnResponse::Proceed`] turn with what the host did.
    ///
    /// # Errors
    ///
    /// `NoPendingTurn` if `turn_id` is not waiting for completion.
    pub fn complete_turn(&mut self, turn_id: TurnId, outcome: TurnOutcome) -> Result<TurnId> {
        let outstanding = match self.outstanding.take() {
            Some(o) if o.pending.turn.turn_id == turn_id && o.stage == Stage::AwaitingCompletion => o,
            other => {
                self.outstanding = other;
                return Err(IceError::NoPendingTurn(turn_id));
            }
        };
        let PendingAction { turn, raw_input, .. } = outstanding.pending;

        let mut changed = BTreeSet::new();
        for edit in &outcome.edits {
            self.session.record_edit(edit.path.clone(), edit.outcome, turn_id);
            changed.insert(edit.path.clone());
        }
        if !changed.is_empty() {
            self.schedule_refresh(changed);
        }

        self.finish(&raw_input, turn.intent, outcome.summary, turn.context.index_version, outcome.succeeded)
    }

    /// Abandons the outstanding turn without recording it.
    pub fn abandon(&mut self) -> Option<PendingAction> {
        self.outstanding.take().map(|o| o.pending)
    }

    /// Reverts up to `n` edits directly, outside of a turn.
    ///
    /// # Errors
    ///
    /// `TurnInProgress` while a turn is outstanding; `NothingToUndo` when
    /// every edit is already reverted. A restore failure after some edits
    /// were reverted ends the undo early with those edits, which are then
    /// reindexed and saved like any other.
    pub fn undo(&mut self, n: usize) -> Result<Vec<EditRecord>> {
        self.ensure_idle()?;
        let reverted = self.session.undo(n, self.files.as_ref())?;
        if reverted.is_empty() {
            return Ok(reverted);
        }
        let changed: BTreeSet<String> = reverted.iter().map(|e| e.path.clone()).collect();
        self.schedule_refresh(changed);
        self.persist()?;
        Ok(reverted)
    }

    /// Waits for the last scheduled index refresh, returning the version it
    /// published.
    pub fn wait_for_index(&mut self) -> Result<Option<u64>> {
        match self.refresh.take() {
            Some(task) => task.join(),
            None => Ok(None),
        }
    }

    fn schedule_refresh(&mut self, changed: BTreeSet<String>) {
        // Refreshes build on whatever is published, so they must not overlap.
        if let Err(e) = self.wait_for_index() {
            warn!(error = %e, "previous index refresh failed");
        }
        match self
            .index
            .spawn_refresh(self.root.clone(), changed, self.config.index.clone())
        {
            Ok(task) => self.refresh = Some(task),
            Err(e) => warn!(error = %e, "could not start index refresh"),
        }
    }

    fn finish(
        &mut self,
        raw_input: &str,
        intent: Intent,
        summary: impl Into<String>,
        index_version: u64,
        succeeded: bool,
    ) -> Result<TurnId> {
        let id = self
            .session
            .append_turn(raw_input, intent, summary, index_version, succeeded);
        info!(turn = id, succeeded, "turn completed");
        self.persist()?;
        Ok(id)
    }

    fn persist(&self) -> Result<()> {
        match &self.persist_to {
            Some(dir) if self.config.session.persist => self.session.save(dir),
            _ => Ok(()),
        }
    }

    fn bundle(&self, text: &str, intent: &Intent, snapshot: &CodebaseIndex) -> ContextBundle {
        let mut seen = BTreeSet::new();
        let mut files = Vec::new();
        let mut push = |record: &Arc<FileRecord>, files: &mut Vec<Arc<FileRecord>>| {
            if files.len() < MAX_CONTEXT_FILES && seen.insert(record.path.clone()) {
                files.push(Arc::clone(record));
            }
        };

        let anchors: Vec<&str> = intent
            .target_path()
            .into_iter()
            .chain(self.session.active_file())
            .collect();
        for anchor in &anchors {
            if let Some(record) = snapshot.file(anchor) {
                push(record, &mut files);
            }
        }
        for anchor in &anchors {
            for related in snapshot.related_files(anchor, 1) {
                if let Some(record) = snapshot.file(&related) {
                    push(record, &mut files);
                }
            }
        }
        let terms = match intent.param("query") {
            Some(query) => vec![query.to_string()],
            None => keywords(text),
        };
        for hit in snapshot.search_terms(&terms, MAX_CONTEXT_FILES) {
            push(&hit.file, &mut files);
        }

        ContextBundle {
            files,
            active_file: self.session.active_file().map(str::to_string),
            recent_turns: self
                .session
                .recent_turns(self.config.session.max_turns_in_context)
                .to_vec(),
            index_version: snapshot.version(),
        }
    }
}

fn confirm_message(pending: &PendingAction) -> String {
    let intent = &pending.turn.intent;
    let target = intent.target_path().unwrap_or("the active file");
    match (pending.reason, intent.intent_type()) {
        (ConfirmReason::Destructive, IntentType::Undo) => match &pending.undo {
            Some(p) => format!("Revert the change to {} made in turn {}?", p.edit.path, p.edit.turn_id),
            None => "Revert the last change?".to_string(),
        },
        (ConfirmReason::Destructive, IntentType::DeleteFile) => format!("Delete {}?", target),
        (ConfirmReason::Destructive, IntentType::ExecuteCode) => format!("Run {}?", target),
        (ConfirmReason::Destructive, other) => format!("Proceed with {} on {}?", other, target),
        (ConfirmReason::LowConfidence, other) => format!(
            "I think you want {} on {} (confidence {:.2}). Go ahead?",
            other,
            target,
            intent.confidence()
        ),
    }
}
