//! # SymKG Protocol
//!
//! Wire types for the semantic-analysis backend protocol and the shared
//! fact vocabulary.
//!
//! The backend speaks newline-delimited JSON over stdio: one
//! [`BackendRequest`] per line in, one [`BackendResponse`] per line out,
//! matched by `id`. Requests are keyed by (method, file, position).
//!
//! The predicate and context vocabularies are closed, versioned enums so
//! downstream pattern matching stays exhaustive and persisted snapshots can
//! detect mismatches.

mod messages;
mod vocabulary;

pub use messages::{
    BackendRequest, BackendResponse, CallEdge, Location, Position, QueryKind, QueryResult,
    SymbolInfo, TypeEdge,
};
pub use vocabulary::{ContextTag, Predicate, SymbolKind, VOCABULARY_VERSION};
