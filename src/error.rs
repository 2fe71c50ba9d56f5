//! Error taxonomy for the review engine.
//!
//! Per-paragraph embedding failures are absorbed by the segmenter (degraded
//! classification); everything surfaced here is either per-document and
//! terminal for that document, or per-example inside a training batch.

use thiserror::Error;

use crate::models::DocumentState;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or unsupported document structure.
    #[error("document parse failed: {0}")]
    Parse(String),

    /// The embedding step could not process input and no degraded path applied.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The pattern library is unreadable or corrupt.
    #[error("pattern library error: {0}")]
    PatternMatch(String),

    /// Redline or clean construction failed; with a well-formed
    /// [`AnalysisResult`](crate::models::AnalysisResult) this indicates an
    /// internal-consistency fault.
    #[error("artifact generation failed: {0}")]
    Generation(String),

    /// Operation invoked out of lifecycle order. Caller-fixable, never retried.
    #[error("invalid state {state}: {reason}")]
    InvalidState { state: DocumentState, reason: String },

    /// A training pair's paragraphs could not be aligned confidently enough.
    #[error("training alignment failed: {0}")]
    TrainingAlignment(String),

    /// A pipeline stage exceeded its configured budget.
    #[error("stage '{stage}' timed out after {budget_secs}s")]
    Timeout { stage: String, budget_secs: u64 },
}

impl EngineError {
    /// Short kind tag recorded on a document's terminal `Error` state.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Parse(_) => "parse",
            EngineError::Embedding(_) => "embedding",
            EngineError::PatternMatch(_) => "pattern_match",
            EngineError::Generation(_) => "generation",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::TrainingAlignment(_) => "training_alignment",
            EngineError::Timeout { .. } => "timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
