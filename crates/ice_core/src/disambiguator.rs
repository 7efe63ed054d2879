//! Language-model escalation for requests the rule matcher is unsure about.
//!
//! The model is an external capability with arbitrary latency and no output
//! guarantees. Each call runs on its own thread and is abandoned after the
//! configured timeout; whatever comes back is validated against the intent
//! schema before it is trusted. Every failure falls back to the matcher's
//! best guess, so a turn always resolves.

use crate::config::DisambiguatorConfig;
use crate::error::{IceError, Result};
use crate::matcher::keywords;
use crate::resolver::{ResolutionContext, Resolver};
use crate::types::{ConversationTurn, Intent, IntentSource, IntentType};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The external language-model capability.
///
/// Returns the raw JSON the model produced; shape checking happens here, not
/// in the provider.
pub trait LanguageModel: Send + Sync {
    fn resolve(&self, text: &str, context: &ModelContext) -> Result<Value>;
}

impl<F> LanguageModel for F
where
    F: Fn(&str, &ModelContext) -> Result<Value> + Send + Sync,
{
    fn resolve(&self, text: &str, context: &ModelContext) -> Result<Value> {
        self(text, context)
    }
}

/// Used when no provider is configured. Every call fails, so every
/// escalation falls back to the matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineModel;

impl LanguageModel for OfflineModel {
    fn resolve(&self, _text: &str, _context: &ModelContext) -> Result<Value> {
        Err(IceError::ProviderError("no language model configured".to_string()))
    }
}

/// Runs an external program per request. The request is written to its
/// stdin as JSON (`{"input": ..., "context": ...}`) and the answer is read
/// from its stdout. A program still running at the deadline is killed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

/// Poll interval while waiting for the provider process.
const POLL_TICK: Duration = Duration::from_millis(10);

impl CommandModel {
    /// Splits a command line on whitespace.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| IceError::ConfigError("disambiguator.command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout: DisambiguatorConfig::default().timeout(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn pump<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

impl LanguageModel for CommandModel {
    fn resolve(&self, text: &str, context: &ModelContext) -> Result<Value> {
        let request = serde_json::to_vec(&serde_json::json!({ "input": text, "context": context }))
            .map_err(|e| IceError::Serialization(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IceError::ProviderError(format!("cannot start {}: {}", self.program, e)))?;

        // The provider may answer before reading all of its input.
        if let Some(mut stdin) = child.stdin.take() {
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(&request) {
                    debug!(error = %e, "provider closed stdin early");
                }
            });
        }
        let stdout = child.stdout.take().map(pump);
        let stderr = child.stderr.take().map(pump);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(program = %self.program, "provider killed at deadline");
                    return Err(IceError::ProviderTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                Ok(None) => thread::sleep(POLL_TICK),
                Err(e) => {
                    let _ = child.kill();
                    return Err(IceError::ProviderError(e.to_string()));
                }
            }
        };

        let collect = |h: Option<JoinHandle<Vec<u8>>>| h.and_then(|h| h.join().ok()).unwrap_or_default();
        let stdout = collect(stdout);
        let stderr = collect(stderr);
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(IceError::ProviderError(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                stderr.trim()
            )));
        }
        serde_json::from_slice(&stdout)
            .map_err(|e| IceError::SchemaViolation(format!("provider output is not JSON: {}", e)))
    }
}

/// One index hit as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitDigest {
    pub path: String,
    pub symbol: Option<String>,
    pub signature: Option<String>,
    pub score: u32,
}

/// Bounded context handed to the model with each request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelContext {
    /// Intent type names the answer must use.
    pub intent_types: Vec<&'static str>,
    pub active_file: Option<String>,
    /// Last few completed turns, oldest first.
    pub recent_turns: Vec<ConversationTurn>,
    pub search_hits: Vec<HitDigest>,
    /// What the rule matcher came up with, if anything.
    pub best_guess: Option<Intent>,
    pub index_version: Option<u64>,
}

impl ModelContext {
    fn assemble(text: &str, context: &ResolutionContext<'_>, config: &DisambiguatorConfig) -> Self {
        let skip = context.recent_turns.len().saturating_sub(config.context_turns);
        let search_hits = match context.index {
            Some(index) if config.search_hits > 0 => index
                .search_terms(&keywords(text), config.search_hits)
                .into_iter()
                .map(|hit| HitDigest {
                    path: hit.file.path.clone(),
                    symbol: hit.symbol.as_ref().map(|s| s.name.clone()),
                    signature: hit.symbol.as_ref().map(|s| s.signature.clone()),
                    score: hit.score,
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            intent_types: IntentType::ALL
                .iter()
                .filter(|t| **t != IntentType::Unknown)
                .map(IntentType::as_str)
                .collect(),
            active_file: context.active_file.map(str::to_string),
            recent_turns: context.recent_turns[skip..].to_vec(),
            search_hits,
            best_guess: context.best_guess.filter(|g| !g.is_unknown()).cloned(),
            index_version: context.index.map(|i| i.version()),
        }
    }
}

/// Result of one escalation.
#[derive(Debug)]
pub struct Disambiguation {
    /// The resolved intent; a model answer or the fallback.
    pub intent: Intent,
    /// Why the model answer was not used, if it was not.
    pub failure: Option<IceError>,
}

impl Disambiguation {
    pub fn used_model(&self) -> bool {
        self.failure.is_none()
    }
}

/// Resolver that consults a [`LanguageModel`].
pub struct Disambiguator {
    model: Arc<dyn LanguageModel>,
    config: DisambiguatorConfig,
}

impl std::fmt::Debug for Disambiguator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disambiguator").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Disambiguator {
    pub fn new(model: Arc<dyn LanguageModel>, config: DisambiguatorConfig) -> Self {
        Self { model, config }
    }

    /// A disambiguator without a provider.
    pub fn offline(config: DisambiguatorConfig) -> Self {
        Self::new(Arc::new(OfflineModel), config)
    }

    /// Uses `config.command` as the provider if set, otherwise runs offline.
    pub fn from_config(config: DisambiguatorConfig) -> Result<Self> {
        match config.command.as_deref() {
            Some(line) => {
                let model = CommandModel::parse(line)?.with_timeout(config.timeout());
                Ok(Self::new(Arc::new(model), config))
            }
            None => Ok(Self::offline(config)),
        }
    }

    /// Asks the model and validates its answer, falling back to
    /// `context.best_guess` on any failure.
    pub fn disambiguate(&self, text: &str, context: &ResolutionContext<'_>) -> Disambiguation {
        let model_context = ModelContext::assemble(text, context, &self.config);
        let answer = self
            .call(text, model_context)
            .and_then(|value| validate(&value, context.turn_id, self.config.default_confidence));

        match answer {
            Ok(intent) => {
                debug!(intent = %intent.intent_type(), confidence = intent.confidence(), "model answer accepted");
                Disambiguation { intent, failure: None }
            }
            Err(err) => {
                warn!(error = %err, "language model unusable, falling back to matcher");
                let intent = context
                    .best_guess
                    .cloned()
                    .unwrap_or_else(|| Intent::unknown(context.turn_id, IntentSource::Matcher))
                    .with_source(IntentSource::Fallback);
                Disambiguation {
                    intent,
                    failure: Some(err),
                }
            }
        }
    }

    /// Runs the provider on a worker thread and waits at most the timeout.
    ///
    /// A provider that overruns is left to finish on its own and its answer
    /// is dropped. [`CommandModel`] kills its process at the same deadline.
    fn call(&self, text: &str, context: ModelContext) -> Result<Value> {
        let (tx, rx) = mpsc::channel();
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        thread::Builder::new()
            .name("ice-model-call".to_string())
            .spawn(move || {
                let _ = tx.send(model.resolve(&text, &context));
            })?;

        match rx.recv_timeout(self.config.timeout()) {
            Ok(answer) => answer,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(IceError::ProviderTimeout {
                timeout_ms: self.config.timeout_ms,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(IceError::ProviderError("provider call panicked".to_string()))
            }
        }
    }
}

impl Resolver for Disambiguator {
    fn resolve(&self, text: &str, context: &ResolutionContext<'_>) -> Intent {
        self.disambiguate(text, context).intent
    }
}

fn field<'a>(object: &'a serde_json::Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| object.get(*n)).filter(|v| !v.is_null())
}

/// Checks a raw model answer against the intent schema.
///
/// Accepts `snake_case` and `camelCase` field names. `intent_type` must name
/// a known intent other than unknown; `confidence`, if present, must be a
/// number in `[0, 1]`; `target_path` must be a string or null; `parameters`
/// must map strings to scalars.
fn validate(value: &Value, turn: u64, default_confidence: f64) -> Result<Intent> {
    let violation = |msg: &str| IceError::SchemaViolation(msg.to_string());

    let object = value.as_object().ok_or_else(|| violation("answer is not an object"))?;

    let type_name = field(object, &["intent_type", "intentType", "type"])
        .ok_or_else(|| violation("missing intent_type"))?
        .as_str()
        .ok_or_else(|| violation("intent_type is not a string"))?;
    let intent_type = IntentType::parse(type_name)
        .ok_or_else(|| IceError::SchemaViolation(format!("unknown intent_type {:?}", type_name)))?;
    if intent_type == IntentType::Unknown {
        return Err(violation("model answered unknown"));
    }

    let confidence = match field(object, &["confidence"]) {
        None => default_confidence,
        Some(v) => {
            let c = v.as_f64().ok_or_else(|| violation("confidence is not a number"))?;
            if !(0.0..=1.0).contains(&c) {
                return Err(IceError::SchemaViolation(format!("confidence {} outside [0, 1]", c)));
            }
            c
        }
    };

    let mut intent = Intent::new(intent_type, confidence, turn, IntentSource::Model);

    if let Some(target) = field(object, &["target_path", "targetPath", "target"]) {
        let path = target.as_str().ok_or_else(|| violation("target_path is not a string"))?.trim();
        if !path.is_empty() {
            intent = intent.with_target(path);
        }
    }

    if let Some(params) = field(object, &["parameters", "params"]) {
        let params = params.as_object().ok_or_else(|| violation("parameters is not an object"))?;
        let mut flat = BTreeMap::new();
        for (key, value) in params {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                _ => return Err(IceError::SchemaViolation(format!("parameter {:?} is not a scalar", key))),
            };
            flat.insert(key.clone(), value);
        }
        for (key, value) in flat {
            intent = intent.with_param(key, value);
        }
    }

    Ok(intent)
}
