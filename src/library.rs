//! In-memory pattern library: the learned knowledge base of
//! (problem-embedding centroid, canonical correction) records per category.
//!
//! Matching only ever scans same-category patterns, so the in-memory shape is
//! a map from category to pattern list. The library is mutated exclusively by
//! training ingestion and persisted through [`crate::store`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::models::{Category, TrainingExample};

/// A learned problem/correction association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub category: Category,
    /// Running average of the contributing example embeddings, weighted by
    /// `support_count`.
    pub centroid: Vec<f32>,
    /// Canonical correction text. Reinforcement never rewrites it.
    pub correction: String,
    /// Number of training examples reinforcing this pattern. Only increases.
    pub support_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Pattern {
    /// Confidence derived from support: `n / (n + 1)`, monotone in support
    /// and bounded below 1.
    pub fn confidence(&self) -> f32 {
        let n = self.support_count as f32;
        n / (n + 1.0)
    }
}

/// What happened to a training example when the library absorbed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Absorption {
    Created(String),
    Reinforced(String),
}

/// The process-wide pattern collection plus its persisted version counter.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    by_category: HashMap<Category, Vec<Pattern>>,
    version: i64,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Patterns of one category, in insertion order.
    pub fn patterns(&self, category: Category) -> &[Pattern] {
        self.by_category
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All patterns, iterated in [`Category::ALL`] order for deterministic
    /// listing and persistence.
    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        Category::ALL
            .iter()
            .flat_map(move |c| self.patterns(*c).iter())
    }

    pub fn insert(&mut self, pattern: Pattern) {
        self.by_category
            .entry(pattern.category)
            .or_default()
            .push(pattern);
    }

    /// Fold a training example into the library: reinforce the closest
    /// same-category pattern at or above `merge_threshold`, otherwise create
    /// a new pattern with support 1. Centroid and support update together.
    pub fn absorb(
        &mut self,
        example: &TrainingExample,
        merge_threshold: f32,
        now: i64,
    ) -> Absorption {
        let list = self.by_category.entry(example.category).or_default();

        let mut best: Option<(usize, f32)> = None;
        for (i, pattern) in list.iter().enumerate() {
            let sim = cosine_similarity(&pattern.centroid, &example.embedding);
            if sim >= merge_threshold && best.map_or(true, |(_, s)| sim > s) {
                best = Some((i, sim));
            }
        }

        match best {
            Some((i, _)) => {
                let pattern = &mut list[i];
                let n = pattern.support_count as f32;
                for (c, x) in pattern.centroid.iter_mut().zip(example.embedding.iter()) {
                    *c = (*c * n + x) / (n + 1.0);
                }
                pattern.support_count += 1;
                pattern.updated_at = now;
                Absorption::Reinforced(pattern.id.clone())
            }
            None => {
                let pattern = Pattern {
                    id: Uuid::new_v4().to_string(),
                    category: example.category,
                    centroid: example.embedding.clone(),
                    correction: example.corrected.clone(),
                    support_count: 1,
                    created_at: now,
                    updated_at: now,
                };
                let id = pattern.id.clone();
                list.push(pattern);
                Absorption::Created(id)
            }
        }
    }
}
