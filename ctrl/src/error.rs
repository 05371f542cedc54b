use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid allowlist entry: {0}")]
    InvalidAllowEntry(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
