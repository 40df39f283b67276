use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid memory name: {0}")]
    InvalidName(String),

    #[error("memory lock error: {0}")]
    Lock(String),
}

impl MemoryError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
