use super::assertions::{Assertion, ResponseMatch};
use super::model::Reply;
use super::runner::ScenarioRunner;
use super::steps::ScenarioStep;
use super::workspace::fixture_files;
use ice_core::{DisambiguatorConfig, IntentSource, IntentType};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    initial_files: BTreeMap<String, Vec<u8>>,
    fixture_error: Option<String>,
    disambiguator: DisambiguatorConfig,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initial_files: BTreeMap::new(),
            fixture_error: None,
            disambiguator: DisambiguatorConfig::default(),
            steps: Vec::new(),
        }
    }

    // ===== Initial setup =====

    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.initial_files.insert(path.to_string(), content.to_vec());
        self
    }

    /// Starts from `tests/fixtures/<name>`.
    pub fn from_fixture(mut self, name: &str) -> Self {
        match fixture_files(name) {
            Ok(files) => self.initial_files.extend(files),
            Err(e) => self.fixture_error = Some(e.to_string()),
        }
        self
    }

    /// Bounds every language-model call.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.disambiguator.timeout_ms = timeout.as_millis() as u64;
        self
    }

    // ===== User actions =====

    pub fn user_says(mut self, text: &str) -> Self {
        self.steps.push(ScenarioStep::UserSays {
            text: text.to_string(),
        });
        self
    }

    pub fn user_says_expecting_error(mut self, text: &str, contains: &str) -> Self {
        self.steps.push(ScenarioStep::UserSaysExpectingError {
            text: text.to_string(),
            contains: contains.to_string(),
        });
        self
    }

    pub fn user_confirms(mut self) -> Self {
        self.steps.push(ScenarioStep::UserConfirms);
        self
    }

    pub fn user_declines(mut self) -> Self {
        self.steps.push(ScenarioStep::UserDeclines);
        self
    }

    // ===== Host actions =====

    pub fn host_writes(mut self, path: &str, content: &[u8]) -> Self {
        self.steps.push(ScenarioStep::HostWrites {
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    pub fn host_deletes(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::HostDeletes {
            path: path.to_string(),
        });
        self
    }

    pub fn host_completes(mut self, summary: &str) -> Self {
        self.steps.push(ScenarioStep::HostCompletes {
            summary: summary.to_string(),
        });
        self
    }

    pub fn host_fails(mut self, summary: &str) -> Self {
        self.steps.push(ScenarioStep::HostFails {
            summary: summary.to_string(),
        });
        self
    }

    pub fn host_abandons(mut self) -> Self {
        self.steps.push(ScenarioStep::HostAbandons);
        self
    }

    // ===== Compound actions =====

    /// A whole turn whose only effect is writing `path`.
    pub fn turn_writing(self, text: &str, path: &str, content: &[u8]) -> Self {
        self.user_says(text)
            .assert_response(ResponseMatch::Proceed)
            .host_writes(path, content)
            .host_completes(&format!("wrote {}", path))
    }

    // ===== Outside the session =====

    pub fn external_write(mut self, path: &str, content: &[u8]) -> Self {
        self.steps.push(ScenarioStep::ExternalWrite {
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    pub fn external_delete(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::ExternalDelete {
            path: path.to_string(),
        });
        self
    }

    // ===== Maintenance =====

    pub fn reindex(mut self) -> Self {
        self.steps.push(ScenarioStep::Reindex);
        self
    }

    pub fn wait_for_index(mut self) -> Self {
        self.steps.push(ScenarioStep::WaitForIndex);
        self
    }

    pub fn undo(mut self, count: usize) -> Self {
        self.steps.push(ScenarioStep::Undo { count });
        self
    }

    pub fn undo_expecting_error(mut self, count: usize, contains: &str) -> Self {
        self.steps.push(ScenarioStep::UndoExpectingError {
            count,
            contains: contains.to_string(),
        });
        self
    }

    // ===== Language model =====

    pub fn model_answers(mut self, answer: Value) -> Self {
        self.steps.push(ScenarioStep::ModelReplies {
            reply: Reply::Answer(answer),
        });
        self
    }

    pub fn model_replies(mut self, reply: Reply) -> Self {
        self.steps.push(ScenarioStep::ModelReplies { reply });
        self
    }

    // ===== Time and failures =====

    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push(ScenarioStep::Wait { duration });
        self
    }

    pub fn restart(mut self) -> Self {
        self.steps.push(ScenarioStep::Restart);
        self
    }

    // ===== Assertions =====

    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    pub fn assert_response(self, response: ResponseMatch) -> Self {
        self.assert(Assertion::Response(response))
    }

    pub fn assert_intent(self, intent_type: IntentType) -> Self {
        self.assert(Assertion::IntentIs(intent_type))
    }

    pub fn assert_source(self, source: IntentSource) -> Self {
        self.assert(Assertion::IntentSourceIs(source))
    }

    pub fn assert_active_file(self, path: Option<&str>) -> Self {
        self.assert(Assertion::ActiveFile(path.map(str::to_string)))
    }

    pub fn assert_turn_count(self, count: usize) -> Self {
        self.assert(Assertion::TurnCount(count))
    }

    pub fn assert_file(self, path: &str, content: &[u8]) -> Self {
        self.assert(Assertion::FileContent {
            path: path.to_string(),
            content: content.to_vec(),
        })
    }

    pub fn assert_file_missing(self, path: &str) -> Self {
        self.assert(Assertion::FileMissing(path.to_string()))
    }

    pub fn assert_index_version(self, version: u64) -> Self {
        self.assert(Assertion::IndexVersion(version))
    }

    pub fn assert_model_calls(self, calls: usize) -> Self {
        self.assert(Assertion::ModelCalls(calls))
    }

    // ===== Execution =====

    pub fn run(self) -> ScenarioResult {
        if let Some(error) = self.fixture_error {
            return ScenarioResult::failed(self.name, 0, error);
        }
        let mut runner = match ScenarioRunner::new(&self.initial_files, self.disambiguator) {
            Ok(r) => r,
            Err(e) => return ScenarioResult::failed(self.name, 0, format!("Failed to create runner: {:?}", e)),
        };

        match runner.execute(&self.steps) {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: self.steps.len(),
                failure_step: None,
                error: None,
            },
            Err(e) => {
                let step = runner.current_step();
                ScenarioResult::failed(self.name, step, format!("{:?}", e))
            }
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    fn failed(name: String, step: usize, error: String) -> Self {
        Self {
            name,
            success: false,
            steps_executed: step,
            failure_step: Some(step),
            error: Some(error),
        }
    }

    /// Panics if the scenario failed.
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    pub fn expect(self, msg: &str) {
        if !self.success {
            panic!(
                "{}: Scenario '{}' failed at step {}: {}",
                msg,
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}
