//! Semantic clause segmentation.
//!
//! Each paragraph gets an embedding and a category (nearest category
//! centroid under cosine similarity); adjacent paragraphs sharing a category
//! merge into one clause draft. Boundaries are always paragraph-aligned.
//!
//! Category centroids are configuration, not learned state: seed phrases per
//! category are embedded once at engine init and averaged.

use crate::config::{EmbeddingConfig, SegmenterConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{EngineError, Result};
use crate::models::{Category, Paragraph};

/// Per-category centroid vectors, in [`Category::ALL`] order for the seeded
/// categories. `Other` carries no centroid; it is the floor fallback.
pub struct CategoryCentroids {
    items: Vec<(Category, Vec<f32>)>,
}

impl CategoryCentroids {
    /// Embed every seed phrase and average them into one centroid per
    /// seeded category.
    pub async fn build(
        provider: &dyn EmbeddingProvider,
        embed_cfg: &EmbeddingConfig,
        seg_cfg: &SegmenterConfig,
    ) -> Result<Self> {
        let mut items = Vec::new();
        for category in Category::ALL {
            let Some(seeds) = seg_cfg
                .seeds
                .iter()
                .find(|s| Category::parse(&s.category) == Some(category))
            else {
                continue;
            };
            let vectors = embedding::embed_texts(provider, embed_cfg, &seeds.phrases).await?;
            let refs: Vec<&[f32]> = vectors.iter().map(|v| v.as_slice()).collect();
            let centroid = embedding::mean_vector(&refs).ok_or_else(|| {
                EngineError::Embedding(format!("no seed embeddings for category {}", category))
            })?;
            items.push((category, centroid));
        }
        Ok(Self { items })
    }

    /// Nearest-centroid classification. Below the floor, or with no usable
    /// embedding, the answer is `Other`.
    pub fn classify(&self, embedding: &[f32], floor: f32) -> Category {
        let mut best = Category::Other;
        let mut best_sim = floor;
        for (category, centroid) in &self.items {
            let sim = embedding::cosine_similarity(embedding, centroid);
            if sim > best_sim {
                best_sim = sim;
                best = *category;
            }
        }
        best
    }

    #[cfg(test)]
    pub(crate) fn from_raw(items: Vec<(Category, Vec<f32>)>) -> Self {
        Self { items }
    }
}

/// A clause before matching: contiguous paragraph range, category, joined
/// text, and the mean embedding of its member paragraphs.
#[derive(Debug, Clone)]
pub struct ClauseDraft {
    pub para_start: usize,
    pub para_end: usize,
    pub category: Category,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    /// True when at least one member paragraph could not be embedded and was
    /// degraded to `Other` instead of aborting the document.
    pub degraded: bool,
}

/// Embed and classify every paragraph, then merge contiguous same-category
/// paragraphs into clause drafts.
///
/// Embedding failures are absorbed per paragraph: a batch failure falls back
/// to per-paragraph embedding, and a paragraph that still fails is classified
/// `Other` with no embedding rather than failing the document.
pub async fn segment_paragraphs(
    provider: &dyn EmbeddingProvider,
    embed_cfg: &EmbeddingConfig,
    seg_cfg: &SegmenterConfig,
    centroids: &CategoryCentroids,
    paragraphs: &mut [Paragraph],
) -> Result<Vec<ClauseDraft>> {
    embed_paragraphs(provider, embed_cfg, paragraphs).await;

    let mut categories = Vec::with_capacity(paragraphs.len());
    for para in paragraphs.iter() {
        let category = match (&para.embedding, para.is_empty()) {
            (Some(vec), false) => centroids.classify(vec, seg_cfg.min_category_similarity),
            _ => Category::Other,
        };
        categories.push(category);
    }

    let mut drafts: Vec<ClauseDraft> = Vec::new();
    for (i, para) in paragraphs.iter().enumerate() {
        let category = categories[i];
        match drafts.last_mut() {
            Some(draft) if draft.category == category && draft.para_end + 1 == i => {
                draft.para_end = i;
                if !draft.text.is_empty() && !para.text.is_empty() {
                    draft.text.push('\n');
                }
                draft.text.push_str(&para.text);
                draft.degraded |= !para.is_empty() && para.embedding.is_none();
            }
            _ => {
                drafts.push(ClauseDraft {
                    para_start: i,
                    para_end: i,
                    category,
                    text: para.text.clone(),
                    embedding: None,
                    degraded: !para.is_empty() && para.embedding.is_none(),
                });
            }
        }
    }

    // Clause embedding: mean of the member paragraphs that embedded.
    for draft in &mut drafts {
        let members: Vec<&[f32]> = paragraphs[draft.para_start..=draft.para_end]
            .iter()
            .filter_map(|p| p.embedding.as_deref())
            .collect();
        draft.embedding = embedding::mean_vector(&members);
    }

    Ok(drafts)
}

/// Fill the embedding cache of every non-empty paragraph, batched. A failed
/// batch is retried paragraph-by-paragraph; individual failures leave the
/// cache empty (degraded classification).
async fn embed_paragraphs(
    provider: &dyn EmbeddingProvider,
    embed_cfg: &EmbeddingConfig,
    paragraphs: &mut [Paragraph],
) {
    let pending: Vec<usize> = paragraphs
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_empty() && p.embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    for batch in pending.chunks(embed_cfg.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|&i| paragraphs[i].text.clone()).collect();
        match embedding::embed_texts(provider, embed_cfg, &texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (&i, vec) in batch.iter().zip(vectors) {
                    paragraphs[i].embedding = Some(vec);
                }
            }
            _ => {
                for &i in batch {
                    let text = paragraphs[i].text.clone();
                    if let Ok(vec) = embedding::embed_one(provider, embed_cfg, &text).await {
                        paragraphs[i].embedding = Some(vec);
                    }
                }
            }
        }
    }
}
