use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no track given")]
    EmptyPath,

    #[error("playlist has no entry {0:?}")]
    KeyNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
