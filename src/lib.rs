//! # Redline Engine
//!
//! Clause analysis, pattern learning, and redline generation for NDA review.
//!
//! The engine flags risky clauses in Word documents, proposes corrections
//! learned from previously reviewed document pairs, and emits tracked-change
//! ("redline") and final clean artifacts. Untouched content is reproduced
//! byte-for-byte.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌─────────┐   ┌──────┐
//! │ Extract  │──▶│ Segment  │──▶│ Match    │──▶│ Risk │──▶ AnalysisResult
//! │ (docx)  │   │ (embed)  │   │ (library)│   └──────┘        │
//! └─────────┘   └──────────┘   └────▲─────┘                   ▼
//!                                    │                  ┌──────────┐
//!                    ┌──────────┐    │                  │ Redline  │
//!                    │ Training │────┘ (commits)        │ / Clean  │
//!                    │ pairs    │                       └──────────┘
//!                    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! redline init                                # create the pattern database
//! redline train original.docx corrected.docx # learn from a reviewed pair
//! redline analyze nda.docx                   # JSON analysis report
//! redline redline nda.docx -o nda.redline.docx
//! redline clean nda.redline.docx --accept all -o nda.clean.docx
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Word document extraction with byte-span preservation |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`segment`] | Clause segmentation and classification |
//! | [`library`] | In-memory pattern library |
//! | [`store`] | SQLite persistence of the library |
//! | [`matcher`] | Similarity matching and suggestion ranking |
//! | [`risk`] | Risk rules |
//! | [`redline`] | Tracked-change artifact generation |
//! | [`clean`] | Decision application and marker removal |
//! | [`align`] | Training-pair paragraph alignment |
//! | [`train`] | Training-example mining |
//! | [`pipeline`] | Engine facade and document lifecycle |

pub mod align;
pub mod clean;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod library;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod redline;
pub mod risk;
pub mod segment;
pub mod store;
pub mod train;

pub use clean::DecisionSet;
pub use config::Config;
pub use error::EngineError;
pub use models::{AnalysisResult, Category, Decision, DocumentState, RiskLevel, TrainingReport};
pub use pipeline::{DocumentPipeline, Engine};
