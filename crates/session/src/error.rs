use symkg_protocol::QueryKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The backend could not initialize (after one restart attempt).
    /// Fatal for the project until attach is retried manually.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the bounded interval. Transient;
    /// the caller decides whether to retry.
    #[error("query timed out after {timeout_ms}ms ({method:?} on {file})")]
    QueryTimeout {
        method: QueryKind,
        file: String,
        timeout_ms: u64,
    },

    /// The handle refers to a detached session. Lifecycle error; surfaced,
    /// never retried.
    #[error("stale session handle for {0}")]
    Stale(String),

    /// The backend answered with an error payload (e.g. an unsupported
    /// file). Not retried internally.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
