//! # SymKG Memory
//!
//! Durable, human-readable exports of the knowledge graph: the snapshot
//! document format (with its `load(snapshot(S)) == S` round-trip law) and
//! named memory documents consumed by downstream agents.
//!
//! This layer is invoked on demand at the boundary; it reads the fact
//! store and never mutates it, and it is decoupled from the extraction
//! pipeline.

mod error;
mod lock;
mod memories;
mod snapshot;

pub use error::{MemoryError, Result};
pub use memories::{command_reference, project_overview, MemoryStore};
pub use snapshot::{load, snapshot, SNAPSHOT_FORMAT_VERSION};
