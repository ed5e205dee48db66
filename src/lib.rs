use thiserror::Error;

pub type Result<T> = std::result::Result<T, TicketError>;

#[derive(Error, Debug)]
pub enum TicketError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector has zero norm and cannot be normalized")]
    EmptyVector,

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Invalid top_k: {0} (must be a positive integer)")]
    InvalidTopK(usize),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Load error: {0}")]
    Load(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod cancellation;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod filter;
pub mod index;
pub mod intent;
pub mod mcp;
pub mod records;
pub mod synth;
