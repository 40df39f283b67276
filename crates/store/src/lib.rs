//! # SymKG Store
//!
//! The knowledge graph's fact store: deduplicated, revision-stamped
//! triples/quads with pattern queries and stale-fact pruning.
//!
//! ## Pipeline position
//!
//! ```text
//! Extractor
//!     │  FactRecord[] (fact + file@revision provenance)
//!     ├──> FactStore::upsert   (merge by structural equality)
//!     ├──> FactStore::prune    (drop facts older than the file's revision)
//!     │
//!     ├──> FactStore::query    (wildcard patterns, lazy, restartable)
//!     └──> FactGraph           (petgraph view for traversal/ranking)
//! ```

mod error;
mod graph;
mod store;
mod types;

use std::path::{Path, PathBuf};

pub use error::{Result, StoreError};
pub use graph::FactGraph;
pub use store::{FactQuery, FactStore, UpsertSummary};
pub use types::{Fact, FactEndpoint, FactPattern, FactRecord, Provenance, Symbol, SymbolRef};

/// Per-project data directory (`<root>/.symkg`): configuration, memories,
/// snapshots.
#[must_use]
pub fn project_data_dir(root: &Path) -> PathBuf {
    root.join(".symkg")
}
