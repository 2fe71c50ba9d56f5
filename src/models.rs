//! Core data models for the review engine.
//!
//! These types flow through the analysis pipeline: paragraphs extracted from
//! a document, clauses assembled from paragraphs, suggestions attached by the
//! matcher, and the immutable [`AnalysisResult`] snapshot handed back to the
//! caller.

use serde::{Deserialize, Serialize};

/// Legal clause category. Closed set; `Other` is the explicit catch-all for
/// text the classifier cannot place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Confidentiality,
    Duration,
    Scope,
    Liability,
    Termination,
    GoverningLaw,
    Other,
}

impl Category {
    /// Every category, in declaration order. Iteration over this slice is the
    /// deterministic order used for centroid argmax and missing-category checks.
    pub const ALL: [Category; 7] = [
        Category::Confidentiality,
        Category::Duration,
        Category::Scope,
        Category::Liability,
        Category::Termination,
        Category::GoverningLaw,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Confidentiality => "confidentiality",
            Category::Duration => "duration",
            Category::Scope => "scope",
            Category::Liability => "liability",
            Category::Termination => "termination",
            Category::GoverningLaw => "governing_law",
            Category::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy-derived severity attached to a clause or a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Reviewer decision on a clause's suggested edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Accepted,
    Rejected,
}

/// One formatted run inside a paragraph: a span of text sharing bold /
/// italic / underline state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFormat {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

/// A body-level paragraph extracted from `word/document.xml`.
///
/// `span` is the byte range of the whole `<w:p>` element inside the source
/// `document.xml`; untouched paragraphs are reproduced by copying that range
/// verbatim, which is what makes the byte-identity invariant checkable.
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub index: usize,
    pub text: String,
    pub style: Option<String>,
    pub runs: Vec<RunFormat>,
    pub span: (usize, usize),
    /// Byte range of the `<w:pPr>` element inside the paragraph, if present;
    /// carried into rewritten paragraphs so styling survives an edit.
    pub ppr_span: Option<(usize, usize)>,
    /// True when the paragraph already carries `<w:ins>`/`<w:del>` markers.
    pub has_markup: bool,
    pub embedding: Option<Vec<f32>>,
}

impl Paragraph {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A ranked correction candidate attached to a clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub pattern_id: String,
    /// Raw cosine similarity, reported before any threshold filtering so
    /// near-misses stay auditable downstream.
    pub similarity: f32,
    pub replacement: String,
    pub confidence: f32,
    pub support_count: u32,
}

/// One or more contiguous paragraphs classified under a single category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    /// Ordinal within the document; doubles as the tracked-change marker id
    /// the redline writer stamps, which is how clean decisions are addressed.
    pub id: u32,
    /// First paragraph index (inclusive).
    pub para_start: usize,
    /// Last paragraph index (inclusive).
    pub para_end: usize,
    pub category: Category,
    pub text: String,
    pub risk: RiskLevel,
    pub suggestions: Vec<Suggestion>,
    pub decision: Decision,
}

impl Clause {
    pub fn best_suggestion(&self) -> Option<&Suggestion> {
        self.suggestions.first()
    }

    pub fn contains_paragraph(&self, index: usize) -> bool {
        index >= self.para_start && index <= self.para_end
    }
}

/// Immutable output of one analysis run, tied to the library version in
/// effect when the matcher ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document_id: String,
    pub paragraph_count: usize,
    pub clauses: Vec<Clause>,
    /// Mandatory categories absent from the whole document.
    pub missing_categories: Vec<Category>,
    pub document_risk: RiskLevel,
    pub library_version: i64,
}

impl AnalysisResult {
    /// Paragraph indices covered by a clause that carries a pending or
    /// accepted suggestion, i.e. the paragraphs the redline writer rewrites.
    pub fn edited_paragraphs(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for clause in &self.clauses {
            if clause.suggestions.is_empty() || clause.decision == Decision::Rejected {
                continue;
            }
            out.extend(clause.para_start..=clause.para_end);
        }
        out
    }
}

/// Lifecycle of a tracked document inside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Received,
    Analyzed,
    RedlineReady,
    CleanReady,
    Error { kind: String },
}

impl DocumentState {
    pub fn is_at_least_redline_ready(&self) -> bool {
        matches!(
            self,
            DocumentState::RedlineReady | DocumentState::CleanReady
        )
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentState::Received => write!(f, "received"),
            DocumentState::Analyzed => write!(f, "analyzed"),
            DocumentState::RedlineReady => write!(f, "redline_ready"),
            DocumentState::CleanReady => write!(f, "clean_ready"),
            DocumentState::Error { kind } => write!(f, "error({})", kind),
        }
    }
}

/// A paired (original, corrected) paragraph mined from a training document
/// pair, categorized on the original side.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub original: String,
    pub corrected: String,
    pub category: Category,
    pub embedding: Vec<f32>,
}

/// Outcome of one training-pair ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub patterns_created: u64,
    pub patterns_reinforced: u64,
    pub examples_skipped: u64,
}
