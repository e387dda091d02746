use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input: zero `k`, blank query, unknown strategy name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A document produced nothing to chunk.
    #[error("No content: {0}")]
    NoContent(String),

    /// The embedding provider failed or timed out.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
