//! Core data types for ICE.

use crate::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Monotonic identifier of a conversation turn within one session.
pub type TurnId = u64;

/// Kind of an extracted symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Function, method, or free-standing routine.
    Function,
    /// Class, struct, enum, trait, interface, or named type.
    Class,
    /// Import / use / require statement.
    Import,
    /// Module-level constant.
    Constant,
}

impl SymbolKind {
    /// Lowercase label used in summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Import => "import",
            Self::Constant => "constant",
        }
    }
}

/// Inclusive 1-based line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    /// First line of the symbol (1-based).
    pub start: u32,
    /// Last line of the symbol (1-based, inclusive).
    pub end: u32,
}

impl LineRange {
    /// Creates a range, clamping `end` to be at least `start`.
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Creates a single-line range.
    pub fn line(line: u32) -> Self {
        Self::new(line, line)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A named declaration found in one file.
///
/// Owned by the codebase index and replaced wholesale whenever its file is
/// re-extracted; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// Declared name (for imports, the imported module).
    pub name: String,
    /// What kind of declaration this is.
    pub kind: SymbolKind,
    /// Workspace-relative path of the declaring file.
    pub file_path: String,
    /// Lines covered by the declaration.
    pub line_range: LineRange,
    /// First line of the attached documentation, if any.
    pub doc_summary: Option<String>,
    /// Trimmed declaration line.
    pub signature: String,
}

/// Source language, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Scala,
    Shell,
    Sql,
}

const EXTENSIONS: &[(&str, Language)] = &[
    ("py", Language::Python),
    ("rs", Language::Rust),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("go", Language::Go),
    ("java", Language::Java),
    ("c", Language::C),
    ("h", Language::C),
    ("cpp", Language::Cpp),
    ("cc", Language::Cpp),
    ("hpp", Language::Cpp),
    ("cs", Language::CSharp),
    ("rb", Language::Ruby),
    ("php", Language::Php),
    ("swift", Language::Swift),
    ("kt", Language::Kotlin),
    ("scala", Language::Scala),
    ("sh", Language::Shell),
    ("bash", Language::Shell),
    ("sql", Language::Sql),
];

impl Language {
    /// Detects the language of a path from its extension.
    ///
    /// Returns `None` for files that are not source code.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, lang)| *lang)
    }

    /// Looks a language up by name, as users and models spell it.
    pub fn from_name(name: &str) -> Option<Self> {
        let lang = match name.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Self::Python,
            "rust" | "rs" => Self::Rust,
            "javascript" | "js" | "node" => Self::JavaScript,
            "typescript" | "ts" => Self::TypeScript,
            "go" | "golang" => Self::Go,
            "java" => Self::Java,
            "c" => Self::C,
            "cpp" | "c++" => Self::Cpp,
            "csharp" | "c#" => Self::CSharp,
            "ruby" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kotlin" => Self::Kotlin,
            "scala" => Self::Scala,
            "bash" | "shell" | "sh" => Self::Shell,
            "sql" => Self::Sql,
            _ => return None,
        };
        Some(lang)
    }

    /// Lowercase language name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
            Self::Shell => "bash",
            Self::Sql => "sql",
        }
    }

    /// Conventional file extension, used when naming generated files.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Rust => "rs",
            Self::JavaScript => "js",
            Self::TypeScript => "ts",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "cs",
            Self::Ruby => "rb",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kt",
            Self::Scala => "scala",
            Self::Shell => "sh",
            Self::Sql => "sql",
        }
    }

    /// Whether symbols are extracted for this language.
    pub fn has_extractor(&self) -> bool {
        matches!(
            self,
            Self::Python | Self::Rust | Self::JavaScript | Self::TypeScript | Self::Go
        )
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file index entry.
///
/// `imported_by` is always the exact inverse of `imported_paths` across the
/// snapshot the record belongs to; both are recomputed on every rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Workspace-relative path with `/` separators.
    pub path: String,
    /// Detected language.
    pub language: Language,
    /// Number of lines in the file.
    pub line_count: u32,
    /// Hash of the raw file content.
    pub content_hash: ContentHash,
    /// Symbols ordered by starting line.
    pub symbols: Vec<SymbolRecord>,
    /// Workspace files this file imports.
    pub imported_paths: BTreeSet<String>,
    /// Workspace files importing this file.
    pub imported_by: BTreeSet<String>,
    /// Imported module names that did not resolve to a workspace file.
    pub external_imports: BTreeSet<String>,
    /// Set when the extractor could not parse the content.
    pub parse_degraded: bool,
}

/// The closed set of actions a request can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntentType {
    CreateFile,
    EditFile,
    DeleteFile,
    ExecuteCode,
    AnalyzeCode,
    DebugCode,
    TestCode,
    ExplainCode,
    RefactorCode,
    SearchCode,
    Undo,
    Status,
    Help,
    Unknown,
}

impl IntentType {
    /// Every intent type, in declaration order.
    pub const ALL: [IntentType; 14] = [
        Self::CreateFile,
        Self::EditFile,
        Self::DeleteFile,
        Self::ExecuteCode,
        Self::AnalyzeCode,
        Self::DebugCode,
        Self::TestCode,
        Self::ExplainCode,
        Self::RefactorCode,
        Self::SearchCode,
        Self::Undo,
        Self::Status,
        Self::Help,
        Self::Unknown,
    ];

    /// Snake-case wire name, as exchanged with the language model.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateFile => "create_file",
            Self::EditFile => "edit_file",
            Self::DeleteFile => "delete_file",
            Self::ExecuteCode => "execute_code",
            Self::AnalyzeCode => "analyze_code",
            Self::DebugCode => "debug_code",
            Self::TestCode => "test_code",
            Self::ExplainCode => "explain_code",
            Self::RefactorCode => "refactor_code",
            Self::SearchCode => "search_code",
            Self::Undo => "undo",
            Self::Status => "status",
            Self::Help => "help",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a wire name. Accepts `create_file`, `CreateFile` and
    /// `create-file`, plus the legacy `undo_changes` / `show_status` names.
    pub fn parse(name: &str) -> Option<Self> {
        let folded: String = name
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "undochanges" => return Some(Self::Undo),
            "showstatus" => return Some(Self::Status),
            _ => {}
        }
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().replace('_', "") == folded)
    }

    /// Destructive or side-effecting actions that need an explicit confirmation.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::DeleteFile | Self::ExecuteCode | Self::Undo)
    }

    /// Actions after which the active file moves to the intent's target.
    pub fn updates_active_file(&self) -> bool {
        matches!(self, Self::CreateFile | Self::EditFile | Self::ExecuteCode)
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which resolver produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentSource {
    /// Deterministic rule match.
    Matcher,
    /// Validated language-model answer.
    Model,
    /// Matcher best guess used after the model failed.
    Fallback,
}

#[derive(Deserialize)]
struct IntentWire {
    intent_type: IntentType,
    confidence: f64,
    target_path: Option<String>,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
    source_turn_id: TurnId,
    source: IntentSource,
}

impl From<IntentWire> for Intent {
    fn from(wire: IntentWire) -> Self {
        let mut intent = Intent::new(wire.intent_type, wire.confidence, wire.source_turn_id, wire.source);
        intent.target_path = wire.target_path;
        intent.parameters = wire.parameters;
        intent
    }
}

/// Structured representation of a request.
///
/// Constructed only through [`Intent::new`] / [`Intent::unknown`], which clamp
/// confidence into `[0, 1]` and pin `Unknown` intents to confidence 0, so a
/// confident intent is never `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "IntentWire")]
pub struct Intent {
    intent_type: IntentType,
    confidence: f64,
    target_path: Option<String>,
    parameters: BTreeMap<String, String>,
    source_turn_id: TurnId,
    source: IntentSource,
}

impl Intent {
    /// Creates an intent with no target and no parameters.
    pub fn new(intent_type: IntentType, confidence: f64, turn: TurnId, source: IntentSource) -> Self {
        let confidence = if intent_type == IntentType::Unknown || !confidence.is_finite() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            intent_type,
            confidence,
            target_path: None,
            parameters: BTreeMap::new(),
            source_turn_id: turn,
            source,
        }
    }

    /// The "could not resolve" intent.
    pub fn unknown(turn: TurnId, source: IntentSource) -> Self {
        Self::new(IntentType::Unknown, 0.0, turn, source)
    }

    /// Sets the target path.
    pub fn with_target(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Re-tags the intent with another source, keeping everything else.
    pub fn with_source(mut self, source: IntentSource) -> Self {
        self.source = source;
        self
    }

    /// Scales confidence down (e.g. when a pronoun target could not be bound).
    pub fn scaled(self, factor: f64) -> Self {
        let confidence = self.confidence * factor;
        let mut scaled = Self::new(self.intent_type, confidence, self.source_turn_id, self.source);
        scaled.target_path = self.target_path;
        scaled.parameters = self.parameters;
        scaled
    }

    pub fn intent_type(&self) -> IntentType {
        self.intent_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn source_turn_id(&self) -> TurnId {
        self.source_turn_id
    }

    pub fn source(&self) -> IntentSource {
        self.source
    }

    pub fn is_unknown(&self) -> bool {
        self.intent_type == IntentType::Unknown
    }
}

/// One user input and its resolution. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Monotonic turn id.
    pub id: TurnId,
    /// Text exactly as the user typed it.
    pub raw_input: String,
    /// What the input resolved to.
    pub resolved_intent: Intent,
    /// Unix timestamp (seconds) of resolution.
    pub timestamp: i64,
    /// Outcome reported by the collaborators.
    pub result_summary: String,
    /// Version of the index snapshot the turn was resolved against.
    pub index_version: u64,
}

/// Audit record of one accepted mutation.
///
/// Only `reverted` ever changes, and only from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    /// Workspace-relative path of the mutated file.
    pub path: String,
    /// Content before the edit ([`ContentHash::ABSENT`] if the file was created).
    pub before_hash: ContentHash,
    /// Content after the edit ([`ContentHash::ABSENT`] if the file was deleted).
    pub after_hash: ContentHash,
    /// Turn that produced the edit.
    pub turn_id: TurnId,
    /// Whether the edit has been undone.
    pub reverted: bool,
}
