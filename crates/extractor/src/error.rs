use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractorError>;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session error: {0}")]
    Session(#[from] symkg_session::SessionError),

    #[error("store error: {0}")]
    Store(#[from] symkg_store::StoreError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("unexpected backend response shape for {0}")]
    UnexpectedResponse(String),

    #[error("invalid project path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}
