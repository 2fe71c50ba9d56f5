//! # Redline CLI (`redline`)
//!
//! Development and operator surface over the review engine. The production
//! transport (upload/status/download) lives outside this crate; the CLI
//! drives the same library contract against local files.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `redline init` | Create the pattern database and run migrations |
//! | `redline analyze <file>` | Analyze a document, print the JSON report |
//! | `redline redline <file> -o <out>` | Write the tracked-change artifact |
//! | `redline clean <file> --accept all\|1,2 -o <out>` | Apply decisions, write the clean artifact |
//! | `redline train <original> <corrected>` | Ingest one training pair |
//! | `redline train-dir <dir>` | Ingest every `*_original.docx`/`*_corrected.docx` pair |
//! | `redline patterns` | List the learned pattern library |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use redline_engine::clean::DecisionSet;
use redline_engine::config;
use redline_engine::models::Decision;
use redline_engine::pipeline::Engine;

/// Redline — clause analysis, pattern learning, and redline generation for
/// NDA review.
#[derive(Parser)]
#[command(
    name = "redline",
    about = "Redline — clause analysis, pattern learning, and redline generation for NDA review",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/redline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the pattern database and run schema migrations. Idempotent.
    Init,

    /// Analyze a document and print the analysis report as JSON.
    Analyze {
        /// Path to a .docx file.
        file: PathBuf,
    },

    /// Generate the tracked-change (redline) artifact for a document.
    Redline {
        /// Path to a .docx file.
        file: PathBuf,
        /// Output path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Apply accept/reject decisions to a redlined document and write the
    /// clean artifact.
    Clean {
        /// Path to a redlined .docx file.
        file: PathBuf,
        /// `all`, or a comma-separated list of clause ids to accept
        /// (everything else reverts).
        #[arg(long, default_value = "all")]
        accept: String,
        /// Output path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Ingest one (original, expert-corrected) training pair.
    Train {
        original: PathBuf,
        corrected: PathBuf,
    },

    /// Ingest every training pair in a directory. Pairs follow the
    /// `<name>_original.docx` / `<name>_corrected.docx` convention.
    TrainDir { dir: PathBuf },

    /// List the learned pattern library.
    Patterns,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let engine = Engine::init(config).await?;
            println!("init");
            println!("  patterns: {}", engine.library_snapshot().await.len());
            println!("  library version: {}", engine.library_version().await);
            println!("ok");
        }

        Commands::Analyze { file } => {
            let bytes = read_file(&file)?;
            let engine = Engine::init(config).await?;
            let result = engine.analyze(&bytes).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Redline { file, output } => {
            let bytes = read_file(&file)?;
            let engine = Engine::init(config).await?;
            let result = engine.analyze(&bytes).await?;
            let artifact = engine.generate_redline(&bytes, &result)?;
            std::fs::write(&output, &artifact)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            let flagged = result
                .clauses
                .iter()
                .filter(|c| !c.suggestions.is_empty())
                .count();
            println!("redline {}", file.display());
            println!("  clauses: {}", result.clauses.len());
            println!("  flagged: {}", flagged);
            println!("  document risk: {:?}", result.document_risk);
            println!("  wrote: {}", output.display());
            println!("ok");
        }

        Commands::Clean {
            file,
            accept,
            output,
        } => {
            let bytes = read_file(&file)?;
            let engine = Engine::init(config).await?;
            let decisions = parse_decisions(&accept)?;
            let artifact = engine.generate_clean(&bytes, &decisions)?;
            std::fs::write(&output, &artifact)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("clean {}", file.display());
            println!("  wrote: {}", output.display());
            println!("ok");
        }

        Commands::Train {
            original,
            corrected,
        } => {
            let engine = Engine::init(config).await?;
            let report = engine
                .ingest_training_pair(&read_file(&original)?, &read_file(&corrected)?)
                .await?;
            print_training_report("train", &report);
            println!("  library version: {}", engine.library_version().await);
            println!("ok");
        }

        Commands::TrainDir { dir } => {
            let engine = Engine::init(config).await?;
            let pairs = find_training_pairs(&dir)?;
            if pairs.is_empty() {
                bail!(
                    "No *_original.docx / *_corrected.docx pairs found in {}",
                    dir.display()
                );
            }
            let mut total = redline_engine::models::TrainingReport::default();
            let mut failed = 0usize;
            for (name, original, corrected) in &pairs {
                match engine
                    .ingest_training_pair(&read_file(original)?, &read_file(corrected)?)
                    .await
                {
                    Ok(report) => {
                        total.patterns_created += report.patterns_created;
                        total.patterns_reinforced += report.patterns_reinforced;
                        total.examples_skipped += report.examples_skipped;
                    }
                    Err(e) => {
                        eprintln!("Warning: pair '{}' failed: {}", name, e);
                        failed += 1;
                    }
                }
            }
            println!("train-dir {}", dir.display());
            println!("  pairs: {}", pairs.len());
            println!("  pairs failed: {}", failed);
            print_training_report_body(&total);
            println!("  library version: {}", engine.library_version().await);
            println!("ok");
        }

        Commands::Patterns => {
            let engine = Engine::init(config).await?;
            let library = engine.library_snapshot().await;
            println!("patterns (version {})", library.version());
            for pattern in library.iter() {
                println!(
                    "  [{}] support {:>3}  {}  \"{}\"",
                    pattern.category,
                    pattern.support_count,
                    pattern.id,
                    pattern.correction
                );
            }
            println!("  total: {}", library.len());
        }
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_decisions(accept: &str) -> Result<DecisionSet> {
    if accept.trim() == "all" {
        return Ok(DecisionSet::accept_unlisted());
    }
    let mut decisions = DecisionSet::new();
    for part in accept.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id: u32 = part
            .parse()
            .with_context(|| format!("Invalid clause id '{}'", part))?;
        decisions.set(id, Decision::Accepted);
    }
    Ok(decisions)
}

/// Scan a directory for `<name>_original.docx` / `<name>_corrected.docx`
/// pairs. Files without a counterpart are reported and skipped.
fn find_training_pairs(dir: &Path) -> Result<Vec<(String, PathBuf, PathBuf)>> {
    let mut originals: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut correcteds: BTreeMap<String, PathBuf> = BTreeMap::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if entry.path().extension().and_then(|e| e.to_str()) != Some("docx") {
            continue;
        }
        if let Some(name) = stem.strip_suffix("_original") {
            originals.insert(name.to_string(), entry.path().to_path_buf());
        } else if let Some(name) = stem.strip_suffix("_corrected") {
            correcteds.insert(name.to_string(), entry.path().to_path_buf());
        }
    }

    let mut pairs = Vec::new();
    for (name, original) in originals {
        match correcteds.remove(&name) {
            Some(corrected) => pairs.push((name, original, corrected)),
            None => eprintln!("Warning: {}_original.docx has no corrected counterpart", name),
        }
    }
    for name in correcteds.keys() {
        eprintln!("Warning: {}_corrected.docx has no original counterpart", name);
    }
    Ok(pairs)
}

fn print_training_report(label: &str, report: &redline_engine::models::TrainingReport) {
    println!("{}", label);
    print_training_report_body(report);
}

fn print_training_report_body(report: &redline_engine::models::TrainingReport) {
    println!("  patterns created: {}", report.patterns_created);
    println!("  patterns reinforced: {}", report.patterns_reinforced);
    println!("  examples skipped: {}", report.examples_skipped);
}
