use super::assertions::{Assertion, ResponseMatch};
use super::clock::MockClock;
use super::model::ScriptedModel;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, Context, Result};
use ice_core::{
    ConfirmReason, Disambiguator, DisambiguatorConfig, EditRecord, Intent, LanguageModel, LoadOutcome,
    Orchestrator, TurnId, TurnOutcome, TurnResponse, UserChoice, Workspace, WriteOutcome,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Executes scenarios against a real workspace
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    // Declared before `ice` so it is dropped first.
    orchestrator: Option<Orchestrator>,
    ice: Option<Workspace>,
    model: Arc<ScriptedModel>,
    disambiguator: DisambiguatorConfig,
    clock: MockClock,
    current_step: usize,
    last_response: Option<TurnResponse>,
    last_intent: Option<Intent>,
    proceeding: Option<TurnId>,
    edits: Vec<(String, WriteOutcome)>,
    last_undo: Vec<EditRecord>,
}

impl ScenarioRunner {
    pub fn new(initial_files: &BTreeMap<String, Vec<u8>>, disambiguator: DisambiguatorConfig) -> Result<Self> {
        let workspace = TestWorkspace::with_files(initial_files)?;
        let ice = workspace.init_ice()?;
        let mut runner = Self {
            workspace,
            orchestrator: None,
            ice: Some(ice),
            model: Arc::new(ScriptedModel::new()),
            disambiguator,
            clock: MockClock::default(),
            current_step: 0,
            last_response: None,
            last_intent: None,
            proceeding: None,
            edits: Vec::new(),
            last_undo: Vec::new(),
        };
        runner.orchestrator = Some(runner.build_orchestrator()?);
        Ok(runner)
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::UserSays { text } => self.handle_user_says(text),
            ScenarioStep::UserSaysExpectingError { text, contains } => {
                match self.orchestrator_mut()?.handle_input(text) {
                    Ok(response) => bail!("expected an error containing {:?}, got {:?}", contains, response),
                    Err(e) => expect_error_text(&e.to_string(), contains),
                }
            }
            ScenarioStep::UserConfirms => self.handle_choice(UserChoice::Confirm),
            ScenarioStep::UserDeclines => self.handle_choice(UserChoice::Decline),

            ScenarioStep::HostWrites { path, content } => {
                self.proceeding_turn()?;
                let outcome = self.orchestrator()?.files().write(path, content)?;
                self.edits.push((path.clone(), outcome));
                Ok(())
            }
            ScenarioStep::HostDeletes { path } => {
                self.proceeding_turn()?;
                let outcome = self.orchestrator()?.files().delete(path)?;
                self.edits.push((path.clone(), outcome));
                Ok(())
            }
            ScenarioStep::HostCompletes { summary } => self.handle_completion(TurnOutcome::success(summary.as_str())),
            ScenarioStep::HostFails { summary } => self.handle_completion(TurnOutcome::failure(summary.as_str())),
            ScenarioStep::HostAbandons => {
                self.orchestrator_mut()?
                    .abandon()
                    .ok_or_else(|| anyhow!("no turn to abandon"))?;
                self.proceeding = None;
                self.edits.clear();
                Ok(())
            }

            ScenarioStep::ExternalWrite { path, content } => self.workspace.write_file(path, content),
            ScenarioStep::ExternalDelete { path } => self.workspace.remove_file(path),

            ScenarioStep::Reindex => {
                self.orchestrator_mut()?.wait_for_index()?;
                self.ice()?.reindex(false)?;
                Ok(())
            }
            ScenarioStep::WaitForIndex => {
                self.orchestrator_mut()?.wait_for_index()?;
                Ok(())
            }
            ScenarioStep::Undo { count } => {
                self.last_undo = self.orchestrator_mut()?.undo(*count)?;
                Ok(())
            }
            ScenarioStep::UndoExpectingError { count, contains } => match self.orchestrator_mut()?.undo(*count) {
                Ok(reverted) => bail!("expected an error containing {:?}, reverted {:?}", contains, reverted),
                Err(e) => expect_error_text(&e.to_string(), contains),
            },

            ScenarioStep::ModelReplies { reply } => {
                self.model.push(reply.clone());
                Ok(())
            }

            ScenarioStep::Wait { duration } => {
                self.clock.advance(*duration);
                Ok(())
            }
            ScenarioStep::Restart => self.handle_restart(),

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    // ===== Wiring =====

    fn build_orchestrator(&self) -> Result<Orchestrator> {
        let ice = self.ice()?;
        let mut config = ice.config().clone();
        config.disambiguator = self.disambiguator.clone();

        let model: Arc<dyn LanguageModel> = self.model.clone();
        let disambiguator = Disambiguator::new(model, config.disambiguator.clone());
        let session = ice.session_with_clock(self.clock.as_provider())?;

        Ok(Orchestrator::new(
            ice.root(),
            config,
            Arc::clone(ice.index()),
            Arc::new(ice.files()),
            session,
            disambiguator,
        )
        .with_persistence(ice.ice_dir()))
    }

    fn ice(&self) -> Result<&Workspace> {
        self.ice.as_ref().ok_or_else(|| anyhow!("workspace not open"))
    }

    fn orchestrator(&self) -> Result<&Orchestrator> {
        self.orchestrator
            .as_ref()
            .ok_or_else(|| anyhow!("orchestrator not available"))
    }

    fn orchestrator_mut(&mut self) -> Result<&mut Orchestrator> {
        self.orchestrator
            .as_mut()
            .ok_or_else(|| anyhow!("orchestrator not available"))
    }

    fn proceeding_turn(&self) -> Result<TurnId> {
        self.proceeding
            .ok_or_else(|| anyhow!("no turn is waiting to be carried out"))
    }

    // ===== Handlers =====

    fn handle_user_says(&mut self, text: &str) -> Result<()> {
        let response = self.orchestrator_mut()?.handle_input(text)?;
        self.record(response)
    }

    fn handle_choice(&mut self, choice: UserChoice) -> Result<()> {
        let orchestrator = self.orchestrator_mut()?;
        let turn_id = orchestrator
            .pending()
            .map(|p| p.turn.turn_id)
            .ok_or_else(|| anyhow!("no turn is waiting for a choice"))?;
        let response = orchestrator.respond(turn_id, choice)?;
        self.record(response)
    }

    fn handle_completion(&mut self, mut outcome: TurnOutcome) -> Result<()> {
        let turn_id = self.proceeding_turn()?;
        for (path, edit) in self.edits.drain(..) {
            outcome = outcome.with_edit(path, edit);
        }
        self.orchestrator_mut()?.complete_turn(turn_id, outcome)?;
        self.proceeding = None;
        Ok(())
    }

    fn record(&mut self, response: TurnResponse) -> Result<()> {
        self.proceeding = None;
        self.edits.clear();
        self.last_intent = match &response {
            TurnResponse::Proceed(turn) => {
                self.proceeding = Some(turn.turn_id);
                Some(turn.intent.clone())
            }
            TurnResponse::Confirm { pending, .. } => Some(pending.turn.intent.clone()),
            TurnResponse::Done { .. } | TurnResponse::Help { .. } => self
                .orchestrator()?
                .session()
                .turns()
                .last()
                .map(|t| t.resolved_intent.clone()),
        };
        self.last_response = Some(response);
        Ok(())
    }

    fn handle_restart(&mut self) -> Result<()> {
        if let Some(mut orchestrator) = self.orchestrator.take() {
            orchestrator.wait_for_index()?;
        }
        if let Some(ice) = self.ice.take() {
            ice.save_index()?;
        }
        self.ice = Some(self.workspace.open_ice()?);
        self.orchestrator = Some(self.build_orchestrator()?);
        self.last_response = None;
        self.last_intent = None;
        self.proceeding = None;
        self.edits.clear();
        Ok(())
    }

    // ===== Assertions =====

    fn handle_assertion(&self, assertion: &Assertion) -> Result<()> {
        let orchestrator = self.orchestrator()?;
        let session = orchestrator.session();
        let snapshot = orchestrator.index().snapshot();

        match assertion {
            Assertion::Response(expected) => self.assert_response(expected),
            Assertion::ResponseContains(text) => {
                let message = match self.last_response.as_ref() {
                    Some(TurnResponse::Confirm { message, .. })
                    | Some(TurnResponse::Done { message, .. })
                    | Some(TurnResponse::Help { message, .. }) => message,
                    other => bail!("last response carries no message: {:?}", other),
                };
                check(message.contains(text.as_str()), || format!("{:?} not in {:?}", text, message))
            }

            Assertion::IntentIs(expected) => {
                let intent = self.last_intent()?;
                check(intent.intent_type() == *expected, || format!("intent was {:?}", intent))
            }
            Assertion::IntentSourceIs(expected) => {
                let intent = self.last_intent()?;
                check(intent.source() == *expected, || format!("intent was {:?}", intent))
            }
            Assertion::IntentTarget(expected) => {
                let intent = self.last_intent()?;
                check(intent.target_path() == expected.as_deref(), || format!("intent was {:?}", intent))
            }
            Assertion::IntentParam { key, value } => {
                let intent = self.last_intent()?;
                check(intent.param(key) == Some(value.as_str()), || format!("intent was {:?}", intent))
            }
            Assertion::ConfidenceAtLeast(min) => {
                let intent = self.last_intent()?;
                check(intent.confidence() >= *min, || format!("intent was {:?}", intent))
            }

            Assertion::ActiveFile(expected) => check(session.active_file() == expected.as_deref(), || {
                format!("active file is {:?}", session.active_file())
            }),
            Assertion::TurnCount(expected) => check(session.turns().len() == *expected, || {
                format!("{} turns recorded", session.turns().len())
            }),
            Assertion::LastTurnSummaryContains(text) => {
                let turn = session
                    .turns()
                    .last()
                    .ok_or_else(|| anyhow!("no turns recorded"))?;
                check(turn.result_summary.contains(text.as_str()), || {
                    format!("last turn summary is {:?}", turn.result_summary)
                })
            }
            Assertion::EditCount(expected) => check(session.edit_history().len() == *expected, || {
                format!("{} edits recorded", session.edit_history().len())
            }),
            Assertion::RevertedCount(expected) => {
                let reverted = session.edit_history().iter().filter(|e| e.reverted).count();
                check(reverted == *expected, || format!("{} edits reverted", reverted))
            }
            Assertion::NoPendingTurn => check(orchestrator.pending().is_none(), || {
                format!("turn pending: {:?}", orchestrator.pending())
            }),
            Assertion::SessionTimestamp(expected) => {
                let turn = session
                    .turns()
                    .last()
                    .ok_or_else(|| anyhow!("no turns recorded"))?;
                check(turn.timestamp == *expected, || format!("last turn at {}", turn.timestamp))
            }

            Assertion::FileContent { path, content } => {
                let actual = self.workspace.read_file(path)?;
                check(actual == *content, || {
                    format!("{} contains {:?}", path, String::from_utf8_lossy(&actual))
                })
            }
            Assertion::FileMissing(path) => {
                check(!self.workspace.file_exists(path), || format!("{} still exists", path))
            }

            Assertion::LastUndoReverted(expected) => {
                let actual: Vec<&str> = self.last_undo.iter().map(|e| e.path.as_str()).collect();
                check(actual == *expected, || format!("reverted {:?}", actual))
            }

            Assertion::IndexVersion(expected) => check(snapshot.version() == *expected, || {
                format!("index is at version {}", snapshot.version())
            }),
            Assertion::IndexHasSymbol(name) => check(!snapshot.find_symbol(name).is_empty(), || {
                format!("symbol {} not indexed", name)
            }),
            Assertion::IndexLacksSymbol(name) => check(snapshot.find_symbol(name).is_empty(), || {
                format!("symbol {} still indexed", name)
            }),
            Assertion::SearchTopHit { query, path } => {
                let hits = snapshot.search(query, 10);
                let top = hits.first().map(|h| h.file.path.as_str());
                check(top == Some(path.as_str()), || format!("top hit for {:?} is {:?}", query, top))
            }
            Assertion::SearchStable { query } => {
                let first = snapshot.search(query, 10);
                check(!first.is_empty(), || format!("no hits for {:?}", query))?;
                for _ in 0..5 {
                    check(snapshot.search(query, 10) == first, || format!("results for {:?} changed", query))?;
                }
                Ok(())
            }
            Assertion::RelatedTo { path, related } => {
                let files = snapshot.related_files(path, 1);
                check(files.contains(related), || format!("{} is related to {:?}", path, files))
            }
            Assertion::CacheWasLoaded => {
                let outcome = self.ice()?.load_outcome();
                check(matches!(outcome, LoadOutcome::Loaded), || format!("cache outcome {:?}", outcome))
            }

            Assertion::ModelCalls(expected) => check(self.model.calls() == *expected, || {
                format!("model was called {} times", self.model.calls())
            }),

            Assertion::ModelSawTurns(expected) => {
                let context = self.model.last_context().ok_or_else(|| anyhow!("model never called"))?;
                check(context.recent_turns.len() == *expected, || {
                    format!("model saw {} turns", context.recent_turns.len())
                })
            }
            Assertion::ModelSawActiveFile(expected) => {
                let context = self.model.last_context().ok_or_else(|| anyhow!("model never called"))?;
                check(context.active_file == *expected, || {
                    format!("model saw active file {:?}", context.active_file)
                })
            }

            Assertion::Custom(f) => f(orchestrator),
        }
    }

    fn assert_response(&self, expected: &ResponseMatch) -> Result<()> {
        let response = self
            .last_response
            .as_ref()
            .ok_or_else(|| anyhow!("no response recorded"))?;
        let matched = match (expected, response) {
            (ResponseMatch::Proceed, TurnResponse::Proceed(_)) => true,
            (ResponseMatch::ConfirmDestructive, TurnResponse::Confirm { pending, .. }) => {
                pending.reason == ConfirmReason::Destructive
            }
            (ResponseMatch::ConfirmLowConfidence, TurnResponse::Confirm { pending, .. }) => {
                pending.reason == ConfirmReason::LowConfidence
            }
            (ResponseMatch::Done, TurnResponse::Done { .. }) => true,
            (ResponseMatch::Help, TurnResponse::Help { .. }) => true,
            _ => false,
        };
        check(matched, || format!("expected {:?}, got {:?}", expected, response))
    }

    fn last_intent(&self) -> Result<&Intent> {
        self.last_intent
            .as_ref()
            .ok_or_else(|| anyhow!("no intent resolved yet"))
    }
}

fn check(condition: bool, describe: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(anyhow!(describe()))
    }
}

fn expect_error_text(actual: &str, contains: &str) -> Result<()> {
    check(actual.contains(contains), || {
        format!("expected an error containing {:?}, got {:?}", contains, actual)
    })
}
