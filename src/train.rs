//! Training-pair mining: aligned paragraph pairs become training examples,
//! which the pattern library absorbs.
//!
//! Failures are per-example: an aligned pair whose similarity is too low to
//! trust is counted as skipped and the batch continues. Identical aligned
//! pairs are silent skips, not corrections.

use crate::config::{AlignmentConfig, EmbeddingConfig, SegmenterConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::library::{Absorption, PatternLibrary};
use crate::models::{Paragraph, TrainingExample, TrainingReport};
use crate::segment::CategoryCentroids;
use crate::{align, models::Category};

/// Examples mined from one training pair, plus the per-example skip count.
#[derive(Debug, Default)]
pub struct MinedBatch {
    pub examples: Vec<TrainingExample>,
    pub skipped: u64,
}

/// Align an (original, corrected) paragraph pair and turn every trusted,
/// differing pair into a [`TrainingExample`] categorized on the original side.
pub async fn mine_training_pair(
    provider: &dyn EmbeddingProvider,
    embed_cfg: &EmbeddingConfig,
    align_cfg: &AlignmentConfig,
    seg_cfg: &SegmenterConfig,
    centroids: &CategoryCentroids,
    original: &[Paragraph],
    corrected: &[Paragraph],
) -> Result<MinedBatch> {
    let original_texts: Vec<String> = original.iter().map(|p| p.text.clone()).collect();
    let corrected_texts: Vec<String> = corrected.iter().map(|p| p.text.clone()).collect();

    let pairs = align::align_paragraphs(&original_texts, &corrected_texts, align_cfg.min_similarity);

    let mut batch = MinedBatch::default();
    let mut candidates: Vec<(String, String)> = Vec::new();

    for pair in pairs {
        let orig = original_texts[pair.original_index].trim();
        let corr = corrected_texts[pair.corrected_index].trim();
        if orig == corr {
            continue;
        }
        if pair.similarity < align_cfg.trust_threshold {
            // Too far apart to trust as the same clause; a correction mined
            // from it would poison the library.
            batch.skipped += 1;
            continue;
        }
        candidates.push((orig.to_string(), corr.to_string()));
    }

    if candidates.is_empty() {
        return Ok(batch);
    }

    let originals: Vec<String> = candidates.iter().map(|(o, _)| o.clone()).collect();
    let vectors = embedding::embed_texts(provider, embed_cfg, &originals).await?;

    for ((original_text, corrected_text), vector) in candidates.into_iter().zip(vectors) {
        let category = classify_example(centroids, seg_cfg, &vector);
        batch.examples.push(TrainingExample {
            original: original_text,
            corrected: corrected_text,
            category,
            embedding: vector,
        });
    }

    Ok(batch)
}

fn classify_example(
    centroids: &CategoryCentroids,
    seg_cfg: &SegmenterConfig,
    embedding: &[f32],
) -> Category {
    centroids.classify(embedding, seg_cfg.min_category_similarity)
}

/// Fold a mined batch into the library and report what happened. The caller
/// holds the writer lock and commits the library afterwards.
pub fn apply_batch(
    library: &mut PatternLibrary,
    batch: &MinedBatch,
    merge_threshold: f32,
    now: i64,
) -> TrainingReport {
    let mut report = TrainingReport {
        examples_skipped: batch.skipped,
        ..Default::default()
    };
    for example in &batch.examples {
        match library.absorb(example, merge_threshold, now) {
            Absorption::Created(_) => report.patterns_created += 1,
            Absorption::Reinforced(_) => report.patterns_reinforced += 1,
        }
    }
    report
}
