use thiserror::Error;

pub type Result<T> = std::result::Result<T, PagechatError>;

#[derive(Error, Debug)]
pub enum PagechatError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Search requested against an index with no records")]
    EmptyIndex,

    #[error("No index has been built yet")]
    NotReady,

    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Stream channel error: {0}")]
    Channel(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod highlight;
pub mod index;
pub mod notify;
pub mod retriever;
