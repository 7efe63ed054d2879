//! Deterministic intent matching.
//!
//! Input is normalized (case-folded, trimmed, whitespace collapsed, leading
//! politeness like "please" or "can you" dropped) and checked against an
//! ordered rule list. Rules are ordered by specificity: whole-phrase rules
//! first, then verb + object, then bare verbs. The first rule whose confidence
//! still clears the configured minimum wins.

use crate::config::MatcherConfig;
use crate::resolver::{ResolutionContext, Resolver};
use crate::types::{Intent, IntentSource, IntentType, Language};
use tracing::debug;

/// Filler words allowed between a verb and its object ("create *a python* function").
const MAX_FILLERS: usize = 3;

const PRONOUNS: &[&str] = &["it", "this", "that"];

const POLITENESS: &[&[&str]] = &[
    &["please"],
    &["can", "you"],
    &["could", "you"],
    &["would", "you"],
    &["will", "you"],
    &["i", "want", "to"],
    &["i", "need", "to"],
    &["i'd", "like", "to"],
    &["i", "would", "like", "to"],
    &["let's"],
    &["lets"],
    &["go", "ahead", "and"],
    &["now"],
    &["then"],
];

/// Nouns that name a unit of code; a language name right before one of these
/// is a language parameter ("a go file").
const CODE_NOUNS: &[&str] = &[
    "file", "files", "script", "module", "program", "function", "functions", "class", "classes",
    "method", "methods", "component", "code", "project", "app", "test", "tests",
];

/// Words skipped when turning a search request into a query.
const QUERY_FILLERS: &[&str] = &[
    "for", "the", "a", "an", "all", "usages", "usage", "uses", "of", "references", "to", "where",
    "is", "are", "definition", "definitions", "me", "symbol", "called", "named",
];

/// Words too common to be worth searching for.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "into", "file", "code", "function",
    "please", "can", "you", "what", "does", "make", "create", "write", "add", "new", "run",
];

/// Which kinds of tokens count as the object of a verb.
#[derive(Debug, Clone, Copy)]
struct Objects {
    words: &'static [&'static str],
    path: bool,
    pronoun: bool,
}

const fn objects(words: &'static [&'static str], path: bool, pronoun: bool) -> Objects {
    Objects { words, path, pronoun }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// The whole normalized input equals one of the phrases.
    Phrase(&'static [&'static str]),
    /// First token is a verb, followed within `MAX_FILLERS` words by an object.
    VerbObject {
        verbs: &'static [&'static str],
        objects: Objects,
    },
    /// First token is a verb, followed by at least `min_rest` tokens.
    Verb {
        verbs: &'static [&'static str],
        min_rest: usize,
    },
}

impl Pattern {
    /// Number of tokens the pattern pins down; higher is more specific.
    fn specificity(&self) -> u8 {
        match self {
            Pattern::Phrase(_) => 3,
            Pattern::VerbObject { .. } => 2,
            Pattern::Verb { .. } => 1,
        }
    }

    fn matches(&self, input: &Normalized) -> bool {
        let tokens = &input.lower;
        match self {
            Pattern::Phrase(phrases) => phrases.iter().any(|p| *p == input.text),
            Pattern::VerbObject { verbs, objects } => {
                let Some(first) = tokens.first() else {
                    return false;
                };
                verbs.contains(&first.as_str())
                    && tokens.iter().skip(1).take(MAX_FILLERS + 1).any(|t| {
                        objects.words.contains(&t.as_str())
                            || (objects.path && looks_like_path(t))
                            || (objects.pronoun && PRONOUNS.contains(&t.as_str()))
                    })
            }
            Pattern::Verb { verbs, min_rest } => tokens
                .first()
                .is_some_and(|t| verbs.contains(&t.as_str()) && tokens.len() > *min_rest),
        }
    }
}

/// One trigger rule.
#[derive(Debug, Clone, Copy)]
struct Rule {
    intent: IntentType,
    pattern: Pattern,
    confidence: f64,
}

const fn rule(intent: IntentType, pattern: Pattern, confidence: f64) -> Rule {
    Rule {
        intent,
        pattern,
        confidence,
    }
}

const PHRASE: f64 = 0.95;
const VERB_OBJECT: f64 = 0.9;
const SEARCH_VERB: f64 = 0.85;
const VERB_ONLY: f64 = 0.6;

const FILE_LIKE: &[&str] = &["file", "files", "script", "module", "program", "code", "function", "class", "method", "component"];

/// Default rule table, in author order; [`Matcher::new`] sorts it by specificity.
const RULES: &[Rule] = &[
    rule(
        IntentType::Help,
        Pattern::Phrase(&[
            "help",
            "?",
            "what can you do",
            "show commands",
            "show me the commands",
            "show the commands",
            "list commands",
            "commands",
        ]),
        PHRASE,
    ),
    rule(
        IntentType::Status,
        Pattern::Phrase(&[
            "status",
            "show status",
            "show the status",
            "show me the status",
            "what is the current status",
            "what's the current status",
            "current status",
            "list files",
            "list the files",
        ]),
        PHRASE,
    ),
    rule(
        IntentType::Undo,
        Pattern::Phrase(&[
            "undo",
            "undo it",
            "undo that",
            "undo last change",
            "undo the last change",
            "undo last edit",
            "undo the last edit",
            "revert",
            "revert that",
            "revert the last change",
            "revert last change",
            "rollback",
            "roll back",
        ]),
        PHRASE,
    ),
    rule(
        IntentType::TestCode,
        Pattern::VerbObject {
            verbs: &["test", "write", "add", "create", "generate", "run", "execute"],
            objects: objects(&["test", "tests", "unittest", "unittests", "spec", "specs"], false, false),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::CreateFile,
        Pattern::VerbObject {
            verbs: &["create", "make", "generate", "write", "build", "scaffold"],
            objects: objects(FILE_LIKE, true, false),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::DeleteFile,
        Pattern::VerbObject {
            verbs: &["delete", "erase", "rm", "trash"],
            objects: objects(&["file", "files", "script", "module"], true, true),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::DeleteFile,
        Pattern::VerbObject {
            verbs: &["remove"],
            objects: objects(&["file", "files"], false, false),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::ExecuteCode,
        Pattern::VerbObject {
            verbs: &["run", "execute", "launch", "start"],
            objects: objects(&["code", "script", "program", "file", "app", "main"], true, true),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::EditFile,
        Pattern::VerbObject {
            verbs: &["edit", "modify", "change", "update", "add", "append", "insert", "remove", "rewrite", "rename"],
            objects: objects(FILE_LIKE, true, true),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::DebugCode,
        Pattern::VerbObject {
            verbs: &["debug", "fix", "troubleshoot", "diagnose", "repair"],
            objects: objects(
                &["code", "bug", "bugs", "error", "errors", "issue", "issues", "crash", "exception", "failure", "function", "problem"],
                true,
                true,
            ),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::AnalyzeCode,
        Pattern::VerbObject {
            verbs: &["analyze", "analyse", "check", "review", "inspect", "audit", "lint"],
            objects: objects(&["code", "file", "function", "class", "module", "project", "codebase"], true, true),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::ExplainCode,
        Pattern::VerbObject {
            verbs: &["explain", "describe", "summarize", "summarise"],
            objects: objects(&["code", "file", "function", "class", "module", "method", "project", "codebase"], true, true),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::ExplainCode,
        Pattern::VerbObject {
            verbs: &["what"],
            objects: objects(&["does"], false, false),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::RefactorCode,
        Pattern::VerbObject {
            verbs: &["refactor", "restructure", "clean", "simplify", "optimize", "optimise", "reorganize", "tidy"],
            objects: objects(&["code", "up", "function", "class", "module", "file", "method"], true, true),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::SearchCode,
        Pattern::VerbObject {
            verbs: &["where"],
            objects: objects(&["is", "are"], false, false),
        },
        VERB_OBJECT,
    ),
    rule(
        IntentType::SearchCode,
        Pattern::Verb {
            verbs: &["find", "search", "locate", "grep", "lookup", "show"],
            min_rest: 1,
        },
        SEARCH_VERB,
    ),
    rule(IntentType::CreateFile, Pattern::Verb { verbs: &["create", "make", "generate", "write"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::EditFile, Pattern::Verb { verbs: &["edit", "modify", "change", "update", "add"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::DeleteFile, Pattern::Verb { verbs: &["delete", "remove"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::ExecuteCode, Pattern::Verb { verbs: &["run", "execute"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::AnalyzeCode, Pattern::Verb { verbs: &["analyze", "analyse", "review", "check"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::DebugCode, Pattern::Verb { verbs: &["debug", "fix"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::TestCode, Pattern::Verb { verbs: &["test"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::ExplainCode, Pattern::Verb { verbs: &["explain", "why"], min_rest: 0 }, VERB_ONLY),
    rule(IntentType::RefactorCode, Pattern::Verb { verbs: &["refactor", "improve"], min_rest: 0 }, VERB_ONLY),
];

/// Normalized input, in lowercase and original casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Lowercase tokens joined by single spaces.
    pub text: String,
    lower: Vec<String>,
    original: Vec<String>,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }
}

/// Case-folds, trims, collapses whitespace, strips surrounding punctuation
/// from each word and drops leading politeness.
///
/// ```
/// use ice_core::normalize;
///
/// assert_eq!(normalize("  Please   RUN   it! ").text, "run it");
/// ```
pub fn normalize(input: &str) -> Normalized {
    let mut original: Vec<String> = input
        .split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '!' | '"' | '\'' | '(' | ')' | '`'))
                .trim_end_matches(['.', '?'])
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect();
    if original.is_empty() && input.trim() == "?" {
        original.push("?".to_string());
    }

    loop {
        let lower: Vec<String> = original.iter().map(|t| t.to_lowercase()).collect();
        let prefix = POLITENESS.iter().find(|p| {
            p.len() < lower.len() && p.iter().zip(lower.iter()).all(|(a, b)| *a == b.as_str())
        });
        match prefix {
            Some(p) => {
                original.drain(..p.len());
            }
            None => break,
        }
    }
    if original.len() > 1 && original.last().is_some_and(|t| t.eq_ignore_ascii_case("please")) {
        original.pop();
    }

    let lower: Vec<String> = original.iter().map(|t| t.to_lowercase()).collect();
    Normalized {
        text: lower.join(" "),
        lower,
        original,
    }
}

/// Significant words of a request, in original casing, for index lookups.
pub fn keywords(input: &str) -> Vec<String> {
    let norm = normalize(input);
    let mut out: Vec<String> = Vec::new();
    for (lower, original) in norm.lower.iter().zip(norm.original.iter()) {
        if lower.chars().count() < 3 || STOPWORDS.contains(&lower.as_str()) || PRONOUNS.contains(&lower.as_str()) {
            continue;
        }
        if !out.iter().any(|o| o.eq_ignore_ascii_case(original)) {
            out.push(original.clone());
        }
    }
    out
}

fn looks_like_path(token: &str) -> bool {
    let Some((stem, ext)) = token.rsplit_once('.') else {
        return false;
    };
    let stem_name = stem.rsplit('/').next().unwrap_or(stem);
    !stem_name.is_empty()
        && (1..=5).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && ext.chars().any(|c| c.is_ascii_alphabetic())
}

/// Rule-based [`Resolver`].
#[derive(Debug, Clone)]
pub struct Matcher {
    rules: Vec<Rule>,
    config: MatcherConfig,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        let mut rules = RULES.to_vec();
        // Stable: equal specificity keeps author order.
        rules.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));
        Self { rules, config }
    }

    /// Confidence at or above which no escalation is needed.
    pub fn accept_threshold(&self) -> f64 {
        self.config.accept_threshold
    }

    pub fn is_confident(&self, intent: &Intent) -> bool {
        !intent.is_unknown() && intent.confidence() >= self.config.accept_threshold
    }

    fn apply(&self, rule: &Rule, input: &Normalized, context: &ResolutionContext<'_>) -> Intent {
        let mut confidence = rule.confidence;
        let explicit = input.original.iter().find(|t| looks_like_path(t)).cloned();
        let has_pronoun = input.lower.iter().any(|t| PRONOUNS.contains(&t.as_str()));

        let target = match explicit {
            Some(path) => Some(path),
            None if targets_file(rule.intent) => match context.active_file {
                Some(active) => Some(active.to_string()),
                None => {
                    if has_pronoun {
                        confidence *= 0.5;
                    }
                    None
                }
            },
            None => None,
        };

        let mut intent = Intent::new(rule.intent, confidence, context.turn_id, IntentSource::Matcher);
        if let Some(target) = target {
            intent = intent.with_target(target);
        }
        if matches!(rule.pattern, Pattern::Phrase(_)) {
            return intent;
        }

        intent = intent.with_param("description", input.text.clone());
        if let Some(language) = detect_language(input, intent.target_path()) {
            intent = intent.with_param("language", language.as_str());
        }
        if rule.intent == IntentType::SearchCode {
            if let Some(query) = search_query(input) {
                intent = intent.with_param("query", query);
            }
        }
        intent
    }
}

impl Resolver for Matcher {
    fn resolve(&self, text: &str, context: &ResolutionContext<'_>) -> Intent {
        let input = normalize(text);
        if input.is_empty() {
            return Intent::unknown(context.turn_id, IntentSource::Matcher);
        }
        for rule in &self.rules {
            if !rule.pattern.matches(&input) {
                continue;
            }
            let intent = self.apply(rule, &input, context);
            if intent.confidence() >= self.config.min_confidence {
                debug!(intent = %intent.intent_type(), confidence = intent.confidence(), "rule matched");
                return intent;
            }
        }
        debug!(input = %input.text, "no rule matched");
        Intent::unknown(context.turn_id, IntentSource::Matcher)
    }
}

/// Intents that act on an existing file and fall back to the active one.
fn targets_file(intent: IntentType) -> bool {
    matches!(
        intent,
        IntentType::EditFile
            | IntentType::DeleteFile
            | IntentType::ExecuteCode
            | IntentType::AnalyzeCode
            | IntentType::DebugCode
            | IntentType::TestCode
            | IntentType::ExplainCode
            | IntentType::RefactorCode
    )
}

fn detect_language(input: &Normalized, target: Option<&str>) -> Option<Language> {
    const AMBIGUOUS: &[&str] = &["go", "c", "sh", "rs", "ts", "js", "py", "node"];
    for (i, token) in input.lower.iter().enumerate() {
        let Some(language) = Language::from_name(token) else {
            continue;
        };
        if !AMBIGUOUS.contains(&token.as_str()) {
            return Some(language);
        }
        let before = i.checked_sub(1).and_then(|j| input.lower.get(j)).map(String::as_str);
        let after = input.lower.get(i + 1).map(String::as_str);
        if matches!(before, Some("in" | "using" | "with" | "a" | "an"))
            || after.is_some_and(|a| CODE_NOUNS.contains(&a))
        {
            return Some(language);
        }
    }
    target.and_then(Language::from_path)
}

fn search_query(input: &Normalized) -> Option<String> {
    let rest: Vec<&str> = input
        .lower
        .iter()
        .zip(input.original.iter())
        .skip(1)
        .skip_while(|(lower, _)| QUERY_FILLERS.contains(&lower.as_str()))
        .map(|(_, original)| original.as_str())
        .collect();
    (!rest.is_empty()).then(|| rest.join(" "))
}
