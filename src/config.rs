use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Category;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub embedding: EmbeddingConfig,
    pub segmenter: SegmenterConfig,
    pub matching: MatchingConfig,
    pub risk: RiskConfig,
    pub alignment: AlignmentConfig,
    pub training: TrainingConfig,
    pub redline: RedlineConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            embedding: EmbeddingConfig::default(),
            segmenter: SegmenterConfig::default(),
            matching: MatchingConfig::default(),
            risk: RiskConfig::default(),
            alignment: AlignmentConfig::default(),
            training: TrainingConfig::default(),
            redline: RedlineConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    /// Pattern library database. The literal `:memory:` keeps the library
    /// in-process only (tests, throwaway runs).
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/patterns.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hashed`, `openai`, `ollama`, or `local` (feature-gated).
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashed".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SegmenterConfig {
    /// A paragraph whose best centroid similarity falls below this floor is
    /// classified `other`.
    pub min_category_similarity: f32,
    /// Seed phrases per category, embedded once at engine init and averaged
    /// into the category centroid. Keys are category names.
    pub seeds: Vec<CategorySeeds>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategorySeeds {
    pub category: String,
    pub phrases: Vec<String>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_category_similarity: 0.30,
            seeds: default_seeds(),
        }
    }
}

/// Built-in NDA-domain seed phrases. Config may replace them wholesale.
fn default_seeds() -> Vec<CategorySeeds> {
    let seed = |category: &str, phrases: &[&str]| CategorySeeds {
        category: category.to_string(),
        phrases: phrases.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        seed(
            "confidentiality",
            &[
                "the receiving party shall hold all confidential information in strict confidence",
                "recipient shall not disclose confidential information to any third party",
                "confidential information includes trade secrets and proprietary data disclosed by the disclosing party",
            ],
        ),
        seed(
            "duration",
            &[
                "this agreement shall remain in effect for a period of years from the effective date",
                "the term of this agreement shall expire upon the expiration date",
                "confidentiality obligations shall survive indefinitely or until a perpetual duration ends",
            ],
        ),
        seed(
            "scope",
            &[
                "the scope of this agreement covers any information disclosed for the stated purpose",
                "recipient may use the information solely for the purpose of evaluating the transaction",
                "all information and any data exchanged falls within the scope of permitted use",
            ],
        ),
        seed(
            "liability",
            &[
                "neither party shall be liable for indirect or consequential damages",
                "recipient agrees to indemnification for damages arising from unauthorized disclosure",
                "no warranty is given and liability is limited to direct damages",
            ],
        ),
        seed(
            "termination",
            &[
                "either party may terminate this agreement upon written notice",
                "upon termination the recipient shall return or destroy all materials",
                "this agreement may end when terminated by either party",
            ],
        ),
        seed(
            "governing_law",
            &[
                "this agreement shall be governed by the laws of the state",
                "the parties submit to the exclusive jurisdiction and venue of the courts",
                "any dispute shall be resolved under the governing law of this agreement",
            ],
        ),
    ]
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum cosine similarity for a pattern to yield a suggestion.
    pub threshold: f32,
    /// Suggestions kept per clause after ranking.
    pub top_k: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            top_k: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    /// Similarity at or above which a match is considered strong.
    pub strong_match: f32,
    /// Support count at or above which a pattern counts as severe.
    pub severe_support: u32,
    /// Categories expected in every document; absence elevates document risk.
    pub mandatory_categories: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            strong_match: 0.90,
            severe_support: 3,
            mandatory_categories: vec![
                "confidentiality".to_string(),
                "duration".to_string(),
                "governing_law".to_string(),
            ],
        }
    }
}

impl RiskConfig {
    pub fn mandatory(&self) -> Vec<Category> {
        self.mandatory_categories
            .iter()
            .filter_map(|s| Category::parse(s))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Pairs scoring below this never align.
    pub min_similarity: f32,
    /// Aligned pairs scoring below this are skipped as untrustworthy.
    pub trust_threshold: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.40,
            trust_threshold: 0.60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrainingConfig {
    /// Centroid similarity at or above which an example reinforces an
    /// existing pattern instead of creating a new one.
    pub merge_threshold: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.85,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RedlineConfig {
    /// Author stamped on `<w:ins>`/`<w:del>` markers.
    pub author: String,
}

impl Default for RedlineConfig {
    fn default() -> Self {
        Self {
            author: "Redline Engine".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Budget per pipeline stage; an expired stage moves the document to the
    /// terminal error state with a timeout kind.
    pub stage_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 120,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if present, otherwise fall back to built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if !(0.0..=1.0).contains(&config.matching.threshold) {
        anyhow::bail!("matching.threshold must be in [0.0, 1.0]");
    }
    if config.matching.top_k == 0 {
        anyhow::bail!("matching.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.training.merge_threshold) {
        anyhow::bail!("training.merge_threshold must be in [0.0, 1.0]");
    }
    if config.alignment.min_similarity > config.alignment.trust_threshold {
        anyhow::bail!("alignment.min_similarity must not exceed alignment.trust_threshold");
    }
    if config.pipeline.stage_timeout_secs == 0 {
        anyhow::bail!("pipeline.stage_timeout_secs must be > 0");
    }

    for seeds in &config.segmenter.seeds {
        let category = Category::parse(&seeds.category).ok_or_else(|| {
            anyhow::anyhow!("segmenter.seeds: unknown category '{}'", seeds.category)
        })?;
        if category == Category::Other {
            anyhow::bail!("segmenter.seeds: 'other' is the fallback and takes no seeds");
        }
        if seeds.phrases.is_empty() {
            anyhow::bail!("segmenter.seeds: category '{}' has no phrases", seeds.category);
        }
    }

    for name in &config.risk.mandatory_categories {
        if Category::parse(name).is_none() {
            anyhow::bail!("risk.mandatory_categories: unknown category '{}'", name);
        }
    }

    match config.embedding.provider.as_str() {
        "hashed" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashed, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.provider == "openai" || config.embedding.provider == "ollama" {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}
