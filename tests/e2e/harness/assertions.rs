use anyhow::Result;
use ice_core::{IntentSource, IntentType, Orchestrator};

/// Declarative assertions on ICE state
pub enum Assertion {
    // Last response
    Response(ResponseMatch),
    ResponseContains(String),

    // Last resolved intent
    IntentIs(IntentType),
    IntentSourceIs(IntentSource),
    IntentTarget(Option<String>),
    IntentParam { key: String, value: String },
    ConfidenceAtLeast(f64),

    // Session
    ActiveFile(Option<String>),
    TurnCount(usize),
    LastTurnSummaryContains(String),
    EditCount(usize),
    RevertedCount(usize),
    NoPendingTurn,
    SessionTimestamp(i64),

    // Workspace files
    FileContent { path: String, content: Vec<u8> },
    FileMissing(String),

    // Undo
    LastUndoReverted(Vec<String>),

    // Index
    IndexVersion(u64),
    IndexHasSymbol(String),
    IndexLacksSymbol(String),
    SearchTopHit { query: String, path: String },
    SearchStable { query: String },
    RelatedTo { path: String, related: String },
    CacheWasLoaded,

    // Language model
    ModelCalls(usize),
    ModelSawTurns(usize),
    ModelSawActiveFile(Option<String>),

    Custom(Box<dyn Fn(&Orchestrator) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response(r) => write!(f, "Response({:?})", r),
            Self::ResponseContains(s) => write!(f, "ResponseContains({:?})", s),
            Self::IntentIs(t) => write!(f, "IntentIs({:?})", t),
            Self::IntentSourceIs(s) => write!(f, "IntentSourceIs({:?})", s),
            Self::IntentTarget(p) => write!(f, "IntentTarget({:?})", p),
            Self::IntentParam { key, value } => write!(f, "IntentParam {{ {:?}: {:?} }}", key, value),
            Self::ConfidenceAtLeast(c) => write!(f, "ConfidenceAtLeast({})", c),
            Self::ActiveFile(p) => write!(f, "ActiveFile({:?})", p),
            Self::TurnCount(n) => write!(f, "TurnCount({})", n),
            Self::LastTurnSummaryContains(s) => write!(f, "LastTurnSummaryContains({:?})", s),
            Self::EditCount(n) => write!(f, "EditCount({})", n),
            Self::RevertedCount(n) => write!(f, "RevertedCount({})", n),
            Self::NoPendingTurn => write!(f, "NoPendingTurn"),
            Self::SessionTimestamp(t) => write!(f, "SessionTimestamp({})", t),
            Self::FileContent { path, .. } => write!(f, "FileContent {{ path: {:?} }}", path),
            Self::FileMissing(p) => write!(f, "FileMissing({:?})", p),
            Self::LastUndoReverted(p) => write!(f, "LastUndoReverted({:?})", p),
            Self::IndexVersion(v) => write!(f, "IndexVersion({})", v),
            Self::IndexHasSymbol(s) => write!(f, "IndexHasSymbol({:?})", s),
            Self::IndexLacksSymbol(s) => write!(f, "IndexLacksSymbol({:?})", s),
            Self::SearchTopHit { query, path } => {
                write!(f, "SearchTopHit {{ query: {:?}, path: {:?} }}", query, path)
            }
            Self::SearchStable { query } => write!(f, "SearchStable {{ query: {:?} }}", query),
            Self::RelatedTo { path, related } => {
                write!(f, "RelatedTo {{ path: {:?}, related: {:?} }}", path, related)
            }
            Self::CacheWasLoaded => write!(f, "CacheWasLoaded"),
            Self::ModelCalls(n) => write!(f, "ModelCalls({})", n),
            Self::ModelSawTurns(n) => write!(f, "ModelSawTurns({})", n),
            Self::ModelSawActiveFile(p) => write!(f, "ModelSawActiveFile({:?})", p),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// Match against the kind of the last turn response
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseMatch {
    Proceed,
    /// Confirmation requested because the action is destructive.
    ConfirmDestructive,
    /// Confirmation requested because the model was unsure.
    ConfirmLowConfidence,
    Done,
    Help,
}
