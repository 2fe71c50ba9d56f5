//! Engine facade and per-document lifecycle pipeline.
//!
//! [`Engine`] owns the process-wide pieces: the embedding provider, the
//! category centroids, the pattern library behind a reader/writer lock, and
//! the library store. Its methods are the external contract; they are pure
//! with respect to document bytes, so a document is safe to resubmit from
//! the beginning after an abort.
//!
//! [`DocumentPipeline`] adds lifecycle tracking on top: states, per-stage
//! timeouts, and the clean-generation gate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::clean::{self, DecisionSet};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{EngineError, Result};
use crate::extract::{self, DocxDocument};
use crate::library::PatternLibrary;
use crate::models::{AnalysisResult, Clause, Decision, DocumentState, TrainingReport};
use crate::redline;
use crate::risk;
use crate::segment::{self, CategoryCentroids, ClauseDraft};
use crate::store;
use crate::train;
use crate::matcher;

/// The clause analysis, pattern learning, and document generation engine.
pub struct Engine {
    config: Config,
    provider: Box<dyn EmbeddingProvider>,
    centroids: CategoryCentroids,
    library: RwLock<PatternLibrary>,
    pool: SqlitePool,
}

impl Engine {
    /// Build the embedding provider, embed the category seed phrases into
    /// centroids, and load the pattern library from the store.
    pub async fn init(config: Config) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        let centroids =
            CategoryCentroids::build(provider.as_ref(), &config.embedding, &config.segmenter)
                .await?;

        let pool = store::connect(&config.db.path).await?;
        store::run_migrations(&pool).await?;
        let library = store::load(&pool).await?;

        Ok(Self {
            config,
            provider,
            centroids,
            library: RwLock::new(library),
            pool,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current pattern library version.
    pub async fn library_version(&self) -> i64 {
        self.library.read().await.version()
    }

    /// Snapshot of the pattern library (listing, diagnostics).
    pub async fn library_snapshot(&self) -> PatternLibrary {
        self.library.read().await.clone()
    }

    /// Analyze a document: extract, segment, match, and assess.
    ///
    /// Deterministic for fixed config and library version; the document id
    /// is the content hash of the input bytes.
    pub async fn analyze(&self, bytes: &[u8]) -> Result<AnalysisResult> {
        let mut doc = self.extract_stage(bytes)?;
        let drafts = self.segment_stage(&mut doc).await?;
        self.match_stage(bytes, &doc, drafts).await
    }

    /// Generate the redline artifact for analyzed document bytes.
    pub fn generate_redline(&self, bytes: &[u8], result: &AnalysisResult) -> Result<Vec<u8>> {
        let doc = extract::parse_docx(bytes)?;
        redline::generate_redline(&doc, result, &self.config.redline)
    }

    /// Apply decisions to redlined bytes, producing the markup-free artifact.
    pub fn generate_clean(&self, redlined: &[u8], decisions: &DecisionSet) -> Result<Vec<u8>> {
        let doc = extract::parse_docx(redlined)?;
        clean::generate_clean(&doc, decisions)
    }

    /// Ingest one (original, expert-corrected) training pair. The library is
    /// mutated and persisted only after the whole pair is mined; matcher
    /// readers never observe a partial update.
    pub async fn ingest_training_pair(
        &self,
        original: &[u8],
        corrected: &[u8],
    ) -> Result<TrainingReport> {
        let original_doc = extract::parse_docx(original)?;
        let corrected_doc = extract::parse_docx(corrected)?;

        let batch = train::mine_training_pair(
            self.provider.as_ref(),
            &self.config.embedding,
            &self.config.alignment,
            &self.config.segmenter,
            &self.centroids,
            &original_doc.paragraphs,
            &corrected_doc.paragraphs,
        )
        .await?;

        let now = chrono::Utc::now().timestamp();
        let mut library = self.library.write().await;
        let report = train::apply_batch(
            &mut library,
            &batch,
            self.config.training.merge_threshold,
            now,
        );
        if report.patterns_created > 0 || report.patterns_reinforced > 0 {
            store::commit(&self.pool, &mut library).await?;
        }
        Ok(report)
    }

    // ---- stages (also driven individually by DocumentPipeline) ----

    pub(crate) fn extract_stage(&self, bytes: &[u8]) -> Result<DocxDocument> {
        extract::parse_docx(bytes)
    }

    pub(crate) async fn segment_stage(&self, doc: &mut DocxDocument) -> Result<Vec<ClauseDraft>> {
        segment::segment_paragraphs(
            self.provider.as_ref(),
            &self.config.embedding,
            &self.config.segmenter,
            &self.centroids,
            &mut doc.paragraphs,
        )
        .await
    }

    pub(crate) async fn match_stage(
        &self,
        bytes: &[u8],
        doc: &DocxDocument,
        drafts: Vec<ClauseDraft>,
    ) -> Result<AnalysisResult> {
        let library = self.library.read().await;

        let mut clauses = Vec::with_capacity(drafts.len());
        for (id, draft) in drafts.into_iter().enumerate() {
            let suggestions = match &draft.embedding {
                Some(vec) => {
                    matcher::match_clause(&library, draft.category, vec, &self.config.matching)
                }
                None => Vec::new(),
            };
            let risk = risk::assess_clause(&suggestions, &self.config.risk);
            clauses.push(Clause {
                id: id as u32,
                para_start: draft.para_start,
                para_end: draft.para_end,
                category: draft.category,
                text: draft.text,
                risk,
                suggestions,
                decision: Decision::Pending,
            });
        }

        let missing = risk::missing_mandatory(&clauses, &self.config.risk.mandatory());
        let document_risk = risk::document_risk(&clauses, &missing);

        Ok(AnalysisResult {
            document_id: content_hash(bytes),
            paragraph_count: doc.paragraphs.len(),
            clauses,
            missing_categories: missing,
            document_risk,
            library_version: library.version(),
        })
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A document tracked through its lifecycle.
struct TrackedDocument {
    source: Vec<u8>,
    state: DocumentState,
    result: Option<AnalysisResult>,
    redline: Option<Vec<u8>>,
    clean: Option<Vec<u8>>,
}

/// Lifecycle orchestration over [`Engine`]: submit → analyze → redline →
/// clean, with per-stage timeouts and the state gate on clean generation.
///
/// Documents are independent units of work; the only shared mutable state is
/// the engine's pattern library, which analysis only reads.
pub struct DocumentPipeline {
    engine: Arc<Engine>,
    documents: Mutex<HashMap<String, TrackedDocument>>,
}

impl DocumentPipeline {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Register document bytes; returns the tracking id.
    pub async fn submit(&self, bytes: Vec<u8>) -> String {
        let id = Uuid::new_v4().to_string();
        self.documents.lock().await.insert(
            id.clone(),
            TrackedDocument {
                source: bytes,
                state: DocumentState::Received,
                result: None,
                redline: None,
                clean: None,
            },
        );
        id
    }

    pub async fn state(&self, id: &str) -> Option<DocumentState> {
        self.documents.lock().await.get(id).map(|d| d.state.clone())
    }

    pub async fn analysis(&self, id: &str) -> Option<AnalysisResult> {
        self.documents.lock().await.get(id).and_then(|d| d.result.clone())
    }

    pub async fn redline_artifact(&self, id: &str) -> Option<Vec<u8>> {
        self.documents.lock().await.get(id).and_then(|d| d.redline.clone())
    }

    pub async fn clean_artifact(&self, id: &str) -> Option<Vec<u8>> {
        self.documents.lock().await.get(id).and_then(|d| d.clean.clone())
    }

    /// Drop a document and all its in-memory artifacts. Abandoning a
    /// document has no other side effects.
    pub async fn discard(&self, id: &str) {
        self.documents.lock().await.remove(id);
    }

    /// Run extract → segment → match under the per-stage timeout and record
    /// the result. On failure the document enters the terminal error state.
    pub async fn analyze(&self, id: &str) -> Result<AnalysisResult> {
        let bytes = self.source_bytes(id).await?;
        let budget = Duration::from_secs(self.engine.config().pipeline.stage_timeout_secs);

        let outcome = self.run_analysis(&bytes, budget).await;
        match outcome {
            Ok(result) => {
                self.update(id, |doc| {
                    doc.state = DocumentState::Analyzed;
                    doc.result = Some(result.clone());
                })
                .await;
                Ok(result)
            }
            Err(err) => {
                self.fail(id, &err).await;
                Err(err)
            }
        }
    }

    async fn run_analysis(&self, bytes: &[u8], budget: Duration) -> Result<AnalysisResult> {
        let engine = &self.engine;

        let mut doc = staged(budget, "extract", async { engine.extract_stage(bytes) }).await?;
        let drafts = staged(budget, "segment", engine.segment_stage(&mut doc)).await?;
        staged(budget, "match", engine.match_stage(bytes, &doc, drafts)).await
    }

    /// Generate the redline artifact and advance to `RedlineReady`.
    pub async fn generate_redline(&self, id: &str) -> Result<Vec<u8>> {
        let (bytes, result) = {
            let documents = self.documents.lock().await;
            let doc = documents
                .get(id)
                .ok_or_else(|| EngineError::Generation(format!("unknown document {}", id)))?;
            let result = doc.result.clone().ok_or_else(|| EngineError::InvalidState {
                state: doc.state.clone(),
                reason: "redline requires a completed analysis".to_string(),
            })?;
            (doc.source.clone(), result)
        };

        let budget = Duration::from_secs(self.engine.config().pipeline.stage_timeout_secs);
        let engine = &self.engine;
        let outcome = staged(budget, "redline", async {
            engine.generate_redline(&bytes, &result)
        })
        .await;

        match outcome {
            Ok(artifact) => {
                self.update(id, |doc| {
                    doc.state = DocumentState::RedlineReady;
                    doc.redline = Some(artifact.clone());
                })
                .await;
                Ok(artifact)
            }
            Err(err) => {
                self.fail(id, &err).await;
                Err(err)
            }
        }
    }

    /// Apply decisions to the redlined artifact. Requires state at least
    /// `RedlineReady`; otherwise fails with `InvalidState` and produces
    /// nothing.
    pub async fn generate_clean(&self, id: &str, decisions: &DecisionSet) -> Result<Vec<u8>> {
        let redlined = {
            let documents = self.documents.lock().await;
            let doc = documents
                .get(id)
                .ok_or_else(|| EngineError::Generation(format!("unknown document {}", id)))?;
            if !doc.state.is_at_least_redline_ready() {
                return Err(EngineError::InvalidState {
                    state: doc.state.clone(),
                    reason: "clean generation requires a redline".to_string(),
                });
            }
            doc.redline.clone().ok_or_else(|| {
                EngineError::Generation("redline artifact missing".to_string())
            })?
        };

        let artifact = self.engine.generate_clean(&redlined, decisions)?;
        self.update(id, |doc| {
            doc.state = DocumentState::CleanReady;
            doc.clean = Some(artifact.clone());
        })
        .await;
        Ok(artifact)
    }

    async fn source_bytes(&self, id: &str) -> Result<Vec<u8>> {
        let documents = self.documents.lock().await;
        documents
            .get(id)
            .map(|d| d.source.clone())
            .ok_or_else(|| EngineError::Parse(format!("unknown document {}", id)))
    }

    async fn update(&self, id: &str, f: impl FnOnce(&mut TrackedDocument)) {
        if let Some(doc) = self.documents.lock().await.get_mut(id) {
            f(doc);
        }
    }

    async fn fail(&self, id: &str, err: &EngineError) {
        self.update(id, |doc| {
            doc.state = DocumentState::Error {
                kind: err.kind().to_string(),
            };
        })
        .await;
    }
}

/// Run one stage under the timeout budget, translating expiry into the
/// timeout error for that stage.
async fn staged<T>(
    budget: Duration,
    stage: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout {
            stage: stage.to_string(),
            budget_secs: budget.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::path::PathBuf;

    fn docx(paragraph_texts: &[&str]) -> Vec<u8> {
        let body: String = paragraph_texts
            .iter()
            .map(|t| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", t))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    async fn memory_engine() -> Arc<Engine> {
        let mut config = Config::default();
        config.db.path = PathBuf::from(":memory:");
        Arc::new(Engine::init(config).await.unwrap())
    }

    #[tokio::test]
    async fn analyze_assigns_content_hash_id() {
        let engine = memory_engine().await;
        let bytes = docx(&["Some paragraph of agreement text."]);
        let a = engine.analyze(&bytes).await.unwrap();
        let b = engine.analyze(&bytes).await.unwrap();
        assert_eq!(a.document_id, b.document_id);
        assert_eq!(a.document_id.len(), 64);
    }

    #[tokio::test]
    async fn analyze_rejects_garbage_with_parse_error() {
        let engine = memory_engine().await;
        let err = engine.analyze(b"definitely not a docx").await.unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[tokio::test]
    async fn clean_before_redline_is_invalid_state() {
        let engine = memory_engine().await;
        let pipeline = DocumentPipeline::new(engine);
        let id = pipeline.submit(docx(&["Text."])).await;

        let err = pipeline
            .generate_clean(&id, &DecisionSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        // No artifact, no state change.
        assert_eq!(
            pipeline.state(&id).await.unwrap(),
            DocumentState::Received
        );

        pipeline.analyze(&id).await.unwrap();
        let err = pipeline
            .generate_clean(&id, &DecisionSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        assert_eq!(
            pipeline.state(&id).await.unwrap(),
            DocumentState::Analyzed
        );
    }

    #[tokio::test]
    async fn lifecycle_advances_through_states() {
        let engine = memory_engine().await;
        let pipeline = DocumentPipeline::new(engine);
        let id = pipeline.submit(docx(&["Agreement text here."])).await;
        assert_eq!(pipeline.state(&id).await.unwrap(), DocumentState::Received);

        pipeline.analyze(&id).await.unwrap();
        assert_eq!(pipeline.state(&id).await.unwrap(), DocumentState::Analyzed);

        pipeline.generate_redline(&id).await.unwrap();
        assert_eq!(
            pipeline.state(&id).await.unwrap(),
            DocumentState::RedlineReady
        );

        pipeline
            .generate_clean(&id, &DecisionSet::new())
            .await
            .unwrap();
        assert_eq!(
            pipeline.state(&id).await.unwrap(),
            DocumentState::CleanReady
        );
        assert!(pipeline.analysis(&id).await.is_some());
        assert!(pipeline.redline_artifact(&id).await.is_some());
        assert!(pipeline.clean_artifact(&id).await.is_some());
    }

    #[tokio::test]
    async fn failed_analysis_reaches_terminal_error_state() {
        let engine = memory_engine().await;
        let pipeline = DocumentPipeline::new(engine);
        let id = pipeline.submit(b"garbage".to_vec()).await;
        assert!(pipeline.analyze(&id).await.is_err());
        assert!(matches!(
            pipeline.state(&id).await.unwrap(),
            DocumentState::Error { .. }
        ));
    }

    #[tokio::test]
    async fn discard_forgets_the_document() {
        let engine = memory_engine().await;
        let pipeline = DocumentPipeline::new(engine);
        let id = pipeline.submit(docx(&["Text."])).await;
        pipeline.discard(&id).await;
        assert!(pipeline.state(&id).await.is_none());
    }
}
