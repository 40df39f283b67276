use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Internal-consistency fault: the key index and a predicate bucket
    /// disagree. Indicates a broken merge invariant, never swallowed.
    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Other(String),
}
