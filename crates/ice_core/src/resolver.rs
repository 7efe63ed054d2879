//! The capability shared by the rule matcher and the language-model
//! disambiguator: turn text into an [`Intent`].

use crate::index::CodebaseIndex;
use crate::types::{ConversationTurn, Intent, TurnId};

/// Everything a resolver may look at besides the raw text.
///
/// Borrowed from the session and the index snapshot taken at the start of
/// the turn, so resolution always sees state through the previous turn.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// Id the resolved intent will carry.
    pub turn_id: TurnId,
    /// File the session is currently focused on.
    pub active_file: Option<&'a str>,
    /// Completed turns, oldest first.
    pub recent_turns: &'a [ConversationTurn],
    /// Index snapshot for this turn.
    pub index: Option<&'a CodebaseIndex>,
    /// What an earlier resolver in the chain came up with.
    pub best_guess: Option<&'a Intent>,
}

impl<'a> ResolutionContext<'a> {
    /// A context with no session state.
    pub fn new(turn_id: TurnId) -> Self {
        Self {
            turn_id,
            active_file: None,
            recent_turns: &[],
            index: None,
            best_guess: None,
        }
    }

    pub fn with_active_file(mut self, path: Option<&'a str>) -> Self {
        self.active_file = path;
        self
    }

    pub fn with_turns(mut self, turns: &'a [ConversationTurn]) -> Self {
        self.recent_turns = turns;
        self
    }

    pub fn with_index(mut self, index: &'a CodebaseIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_best_guess(mut self, intent: &'a Intent) -> Self {
        self.best_guess = Some(intent);
        self
    }
}

/// Resolves text to an intent. Never fails: an unresolvable input is
/// [`Intent::unknown`].
pub trait Resolver {
    fn resolve(&self, text: &str, context: &ResolutionContext<'_>) -> Intent;
}
