//! # SymKG Extractor
//!
//! Incremental fact extraction for the knowledge graph.
//!
//! ## Pipeline
//!
//! ```text
//! Project root
//!     │
//!     ├──> File Scanner (.gitignore aware)
//!     │      └─> source + manifest files
//!     │
//!     ├──> Change Watcher (notify, debounced; periodic rescan fallback)
//!     │      └─> per-file re-extraction tasks, bounded worker pool
//!     │
//!     ├──> Extractor (session queries → pattern rules → facts)
//!     │      └─> FactRecord[] stamped with the file's revision
//!     │
//!     └──> FactStore (upsert, then prune below the new revision)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use symkg_extractor::{AnalysisConfig, AnalysisPipeline};
//! use symkg_store::FactStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(FactStore::new());
//!     let config = AnalysisConfig::load("/path/to/project".as_ref())?;
//!     let pipeline =
//!         AnalysisPipeline::attach_with_config(store, "/path/to/project", &config).await?;
//!
//!     let stats = pipeline.analyze_project().await?;
//!     println!("{} files, {} facts", stats.files, stats.facts);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod extractor;
mod manifest;
mod pipeline;
mod revision;
mod scanner;
mod stats;
mod watcher;

pub use config::AnalysisConfig;
pub use error::{ExtractorError, Result};
pub use extractor::{ExtractionOutcome, Extractor, PartialExtraction};
pub use pipeline::{AnalysisPipeline, FileOutcome};
pub use revision::RevisionTracker;
pub use scanner::FileScanner;
pub use stats::ExtractionStats;
pub use watcher::{ChangeWatcher, ExtractionUpdate, WatcherConfig, WatcherHealth};
