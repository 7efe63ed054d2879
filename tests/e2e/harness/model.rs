use ice_core::{IceError, LanguageModel, ModelContext, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// What the scripted model does on one call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this JSON.
    Answer(Value),
    /// Sleep, then answer.
    Slow(Duration, Value),
    /// Fail like an unreachable provider.
    Fail(String),
}

/// A language model that plays back queued replies and counts its calls.
///
/// With the queue empty every call fails, so an unexpected escalation shows
/// up as a fallback intent.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    last_context: Mutex<Option<ModelContext>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Reply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<ModelContext> {
        self.last_context.lock().ok().and_then(|c| c.clone())
    }
}

impl LanguageModel for ScriptedModel {
    fn resolve(&self, _text: &str, context: &ModelContext) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_context.lock() {
            *last = Some(context.clone());
        }
        let reply = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match reply {
            Some(Reply::Answer(value)) => Ok(value),
            Some(Reply::Slow(delay, value)) => {
                thread::sleep(delay);
                Ok(value)
            }
            Some(Reply::Fail(message)) => Err(IceError::ProviderError(message)),
            None => Err(IceError::ProviderError("no scripted reply".to_string())),
        }
    }
}
