//! End-to-end engine tests over in-memory .docx fixtures.
//!
//! Covers the externally observable properties: byte-identical untouched
//! paragraphs, deterministic analysis, the clean-generation state gate,
//! pattern reinforcement across training ingestions, accept-all clean
//! output, the duration-clause matching scenario, concurrent analyses, and
//! reorder-tolerant training alignment.

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use redline_engine::clean::DecisionSet;
use redline_engine::config::Config;
use redline_engine::embedding;
use redline_engine::extract::parse_docx;
use redline_engine::library::Pattern;
use redline_engine::models::{Category, DocumentState, RiskLevel};
use redline_engine::pipeline::{DocumentPipeline, Engine};
use redline_engine::store;
use redline_engine::EngineError;

const CONFIDENTIALITY_PARA: &str =
    "The Receiving Party shall hold all Confidential Information in strict confidence and shall \
     not disclose it to any third party.";
const GOVERNING_LAW_PARA: &str =
    "This Agreement shall be governed by the laws of the State of Delaware, and the parties \
     submit to the exclusive jurisdiction of its courts.";
const DURATION_SENTENCE: &str = "This Agreement shall remain in effect indefinitely.";
const DURATION_CORRECTION: &str = "for a period of 2 years from the Effective Date";

const TRAIN_DURATION_ORIGINAL: &str =
    "The term of this Agreement shall be perpetual and shall remain in effect indefinitely.";
const TRAIN_DURATION_CORRECTED: &str =
    "The term of this Agreement shall be two years and shall remain in effect until the second \
     anniversary.";

/// Build a minimal but multi-entry .docx: content types, document, styles.
fn build_docx(paragraph_texts: &[&str]) -> Vec<u8> {
    let body: String = paragraph_texts
        .iter()
        .map(|t| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", t))
        .collect();
    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}<w:sectPr/></w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(
            b"<?xml version=\"1.0\"?><Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"/>",
        )
        .unwrap();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        zip.start_file("word/styles.xml", options).unwrap();
        zip.write_all(b"<?xml version=\"1.0\"?><w:styles xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"/>")
            .unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn temp_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.db.path = tmp.path().join("patterns.sqlite");
    config
}

async fn engine_with_tempdb() -> (TempDir, Arc<Engine>) {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::init(temp_config(&tmp)).await.unwrap();
    (tmp, Arc::new(engine))
}

/// Seed the store with a duration pattern: centroid at the problem
/// sentence, correction text as the canonical fix.
async fn seed_duration_pattern(config: &Config) {
    let provider = embedding::create_provider(&config.embedding).unwrap();
    let centroid = embedding::embed_one(provider.as_ref(), &config.embedding, DURATION_SENTENCE)
        .await
        .unwrap();

    let pool = store::connect(&config.db.path).await.unwrap();
    store::run_migrations(&pool).await.unwrap();
    let mut library = store::load(&pool).await.unwrap();
    library.insert(Pattern {
        id: "duration-indefinite".to_string(),
        category: Category::Duration,
        centroid,
        correction: DURATION_CORRECTION.to_string(),
        support_count: 1,
        created_at: 0,
        updated_at: 0,
    });
    store::commit(&pool, &mut library).await.unwrap();
    pool.close().await;
}

#[tokio::test]
async fn duration_scenario_matches_and_redlines() {
    let tmp = TempDir::new().unwrap();
    let config = temp_config(&tmp);
    seed_duration_pattern(&config).await;

    let engine = Engine::init(config).await.unwrap();
    let source = build_docx(&[CONFIDENTIALITY_PARA, DURATION_SENTENCE, GOVERNING_LAW_PARA]);
    let result = engine.analyze(&source).await.unwrap();

    let duration_clause = result
        .clauses
        .iter()
        .find(|c| c.category == Category::Duration)
        .expect("duration clause not found");
    assert!(duration_clause.contains_paragraph(1));

    let suggestion = duration_clause
        .best_suggestion()
        .expect("no suggestion on duration clause");
    assert_eq!(suggestion.replacement, DURATION_CORRECTION);
    assert!(
        suggestion.similarity >= 0.75,
        "similarity {} below threshold",
        suggestion.similarity
    );
    // Matched clause risk is elevated over an unmatched baseline.
    assert!(duration_clause.risk > RiskLevel::Low);
    let unmatched = result
        .clauses
        .iter()
        .find(|c| c.suggestions.is_empty())
        .expect("expected at least one unmatched clause");
    assert!(duration_clause.risk > unmatched.risk);

    // The redline shows a deletion of the original sentence and an insertion
    // of the suggestion at the same paragraph position.
    let redlined = engine.generate_redline(&source, &result).unwrap();
    let redoc = parse_docx(&redlined).unwrap();
    let para_xml = String::from_utf8(redoc.paragraph_bytes(1).unwrap().to_vec()).unwrap();
    assert!(para_xml.contains("<w:del "));
    assert!(para_xml.contains("<w:delText"));
    assert!(para_xml.contains(DURATION_SENTENCE));
    assert!(para_xml.contains("<w:ins "));
    assert!(para_xml.contains(DURATION_CORRECTION));
}

#[tokio::test]
async fn untouched_paragraphs_are_byte_identical_in_redline() {
    let tmp = TempDir::new().unwrap();
    let config = temp_config(&tmp);
    seed_duration_pattern(&config).await;

    let engine = Engine::init(config).await.unwrap();
    let source = build_docx(&[CONFIDENTIALITY_PARA, DURATION_SENTENCE, GOVERNING_LAW_PARA]);
    let result = engine.analyze(&source).await.unwrap();
    let redlined = engine.generate_redline(&source, &result).unwrap();

    let original = parse_docx(&source).unwrap();
    let redoc = parse_docx(&redlined).unwrap();
    assert_eq!(original.paragraphs.len(), redoc.paragraphs.len());

    let edited = result.edited_paragraphs();
    assert!(edited.contains(&1));
    for index in 0..original.paragraphs.len() {
        if edited.contains(&index) {
            continue;
        }
        assert_eq!(
            original.paragraph_bytes(index).unwrap(),
            redoc.paragraph_bytes(index).unwrap(),
            "paragraph {} changed",
            index
        );
    }
}

#[tokio::test]
async fn analyze_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let config = temp_config(&tmp);
    seed_duration_pattern(&config).await;
    let engine = Engine::init(config).await.unwrap();

    let source = build_docx(&[CONFIDENTIALITY_PARA, DURATION_SENTENCE, GOVERNING_LAW_PARA]);
    let a = engine.analyze(&source).await.unwrap();
    let b = engine.analyze(&source).await.unwrap();

    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[tokio::test]
async fn clean_before_redline_ready_fails_with_invalid_state() {
    let (_tmp, engine) = engine_with_tempdb().await;
    let pipeline = DocumentPipeline::new(engine);
    let id = pipeline
        .submit(build_docx(&[CONFIDENTIALITY_PARA]))
        .await;

    let err = pipeline
        .generate_clean(&id, &DecisionSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
    assert_eq!(pipeline.state(&id).await.unwrap(), DocumentState::Received);

    pipeline.analyze(&id).await.unwrap();
    let err = pipeline
        .generate_clean(&id, &DecisionSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[tokio::test]
async fn accept_all_clean_applies_suggestions_and_strips_markers() {
    let tmp = TempDir::new().unwrap();
    let config = temp_config(&tmp);
    seed_duration_pattern(&config).await;

    let engine = Engine::init(config).await.unwrap();
    let source = build_docx(&[CONFIDENTIALITY_PARA, DURATION_SENTENCE, GOVERNING_LAW_PARA]);
    let result = engine.analyze(&source).await.unwrap();
    let redlined = engine.generate_redline(&source, &result).unwrap();

    let clean = engine
        .generate_clean(&redlined, &DecisionSet::accept_all(&result))
        .unwrap();
    let cleandoc = parse_docx(&clean).unwrap();
    let xml = String::from_utf8(cleandoc.document_xml().to_vec()).unwrap();

    assert!(!xml.contains("<w:ins"), "insert markers remain");
    assert!(!xml.contains("<w:del"), "delete markers remain");
    assert_eq!(cleandoc.paragraphs[1].text, DURATION_CORRECTION);
    assert!(!xml.contains(DURATION_SENTENCE));
    // Unmatched paragraphs ride through the whole redline+clean cycle intact.
    assert_eq!(cleandoc.paragraphs[0].text, CONFIDENTIALITY_PARA);
    assert_eq!(cleandoc.paragraphs[2].text, GOVERNING_LAW_PARA);
}

#[tokio::test]
async fn training_reinforces_patterns_and_persists() {
    let tmp = TempDir::new().unwrap();

    let original = build_docx(&[
        CONFIDENTIALITY_PARA,
        TRAIN_DURATION_ORIGINAL,
        GOVERNING_LAW_PARA,
    ]);
    let corrected = build_docx(&[
        CONFIDENTIALITY_PARA,
        TRAIN_DURATION_CORRECTED,
        GOVERNING_LAW_PARA,
    ]);

    {
        let engine = Engine::init(temp_config(&tmp)).await.unwrap();
        let first = engine
            .ingest_training_pair(&original, &corrected)
            .await
            .unwrap();
        assert_eq!(first.patterns_created, 1);
        assert_eq!(first.patterns_reinforced, 0);
        assert_eq!(first.examples_skipped, 0);

        let second = engine
            .ingest_training_pair(&original, &corrected)
            .await
            .unwrap();
        assert_eq!(second.patterns_created, 0);
        assert_eq!(second.patterns_reinforced, 1);

        let library = engine.library_snapshot().await;
        let pattern = library.iter().next().unwrap();
        assert_eq!(pattern.support_count, 2);
        assert_eq!(engine.library_version().await, 2);
    }

    // A fresh engine over the same database sees the committed library.
    let engine = Engine::init(temp_config(&tmp)).await.unwrap();
    assert_eq!(engine.library_version().await, 2);
    let library = engine.library_snapshot().await;
    assert_eq!(library.len(), 1);
    assert_eq!(library.iter().next().unwrap().support_count, 2);
}

#[tokio::test]
async fn trained_pattern_matches_future_documents() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::init(temp_config(&tmp)).await.unwrap();

    let original = build_docx(&[TRAIN_DURATION_ORIGINAL, GOVERNING_LAW_PARA]);
    let corrected = build_docx(&[TRAIN_DURATION_CORRECTED, GOVERNING_LAW_PARA]);
    engine
        .ingest_training_pair(&original, &corrected)
        .await
        .unwrap();

    // A new document containing the same problem clause gets the learned
    // correction suggested.
    let target = build_docx(&[CONFIDENTIALITY_PARA, TRAIN_DURATION_ORIGINAL]);
    let result = engine.analyze(&target).await.unwrap();
    let flagged = result
        .clauses
        .iter()
        .find(|c| !c.suggestions.is_empty())
        .expect("trained pattern produced no suggestion");
    assert!(flagged.contains_paragraph(1));
    assert_eq!(
        flagged.best_suggestion().unwrap().replacement,
        TRAIN_DURATION_CORRECTED
    );
    assert_eq!(result.library_version, 1);
}

#[tokio::test]
async fn concurrent_analyses_report_identical_suggestions() {
    let tmp = TempDir::new().unwrap();
    let config = temp_config(&tmp);
    seed_duration_pattern(&config).await;
    let engine = Arc::new(Engine::init(config).await.unwrap());

    let source = build_docx(&[CONFIDENTIALITY_PARA, DURATION_SENTENCE, GOVERNING_LAW_PARA]);

    let (a, b) = tokio::join!(
        {
            let engine = engine.clone();
            let bytes = source.clone();
            tokio::spawn(async move { engine.analyze(&bytes).await.unwrap() })
        },
        {
            let engine = engine.clone();
            let bytes = source.clone();
            tokio::spawn(async move { engine.analyze(&bytes).await.unwrap() })
        }
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.library_version, b.library_version);
    assert_eq!(a.clauses.len(), b.clauses.len());
    for (ca, cb) in a.clauses.iter().zip(b.clauses.iter()) {
        assert_eq!(ca.text, cb.text);
        assert_eq!(
            serde_json::to_string(&ca.suggestions).unwrap(),
            serde_json::to_string(&cb.suggestions).unwrap()
        );
    }
}

#[tokio::test]
async fn reordered_training_pair_learns_nothing() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::init(temp_config(&tmp)).await.unwrap();
    let version_before = engine.library_version().await;

    let original = build_docx(&[CONFIDENTIALITY_PARA, GOVERNING_LAW_PARA]);
    let reordered = build_docx(&[GOVERNING_LAW_PARA, CONFIDENTIALITY_PARA]);
    let report = engine
        .ingest_training_pair(&original, &reordered)
        .await
        .unwrap();

    assert_eq!(report.patterns_created, 0);
    assert_eq!(report.patterns_reinforced, 0);
    assert_eq!(report.examples_skipped, 0);
    // Nothing learned, nothing committed.
    assert_eq!(engine.library_version().await, version_before);
}

#[tokio::test]
async fn missing_mandatory_category_elevates_document_risk() {
    let (_tmp, engine) = engine_with_tempdb().await;

    // Confidentiality and governing law present, duration absent.
    let source = build_docx(&[CONFIDENTIALITY_PARA, GOVERNING_LAW_PARA]);
    let result = engine.analyze(&source).await.unwrap();
    assert!(result.missing_categories.contains(&Category::Duration));
    assert_eq!(result.document_risk, RiskLevel::High);
}

#[tokio::test]
async fn garbage_bytes_fail_with_parse_error_and_no_artifact() {
    let (_tmp, engine) = engine_with_tempdb().await;
    let err = engine.analyze(b"not a document").await.unwrap_err();
    assert!(matches!(err, EngineError::Parse(_)));
}

#[tokio::test]
async fn memory_database_engine_works_without_files() {
    let mut config = Config::default();
    config.db.path = PathBuf::from(":memory:");
    let engine = Engine::init(config).await.unwrap();
    let result = engine
        .analyze(&build_docx(&[CONFIDENTIALITY_PARA]))
        .await
        .unwrap();
    assert_eq!(result.library_version, 0);
    assert_eq!(result.paragraph_count, 1);
}
