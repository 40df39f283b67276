//! # SymKG Session
//!
//! Symbol session management: one live analysis session per project root,
//! brokering definition / reference / call-hierarchy / type-hierarchy
//! queries to an external backend process.
//!
//! ```text
//! SessionManager::attach(root) ──> SessionHandle
//!        │                              │
//!        │   query(handle, file, pos, kind)
//!        │        ├─ bounded in-flight requests (backpressure)
//!        │        └─ bounded by a query timeout
//!        │
//!        └── detach(handle)  (idempotent, cancels queued callers)
//! ```
//!
//! The backend is an owned, capability-limited resource tied to the
//! attach/detach lifetime; there is no global singleton. A failed attach is
//! retried once with a backend restart; queries are never retried
//! internally.

mod backend;
mod error;
mod limits;
mod manager;
pub mod script;

pub use backend::{Backend, BackendCommand, BackendLauncher, StdioBackend, StdioLauncher};
pub use error::{Result, SessionError};
pub use manager::{SessionHandle, SessionId, SessionManager, SessionOptions};
