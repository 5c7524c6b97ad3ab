use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecError>;

#[derive(Error, Debug)]
pub enum RecError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error(
        "Embedding dimension mismatch for product {product_id}: expected {expected}, got {actual}"
    )]
    EmbeddingDimensionMismatch {
        product_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid embedding for product {product_id}: {reason}")]
    InvalidEmbedding { product_id: String, reason: String },

    #[error("Explanation unavailable: {0}")]
    ExplanationUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RecError {
    /// Errors caused by the caller's input rather than by the service itself
    #[inline]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownUser(_) | Self::InvalidParameter(_) | Self::ProductNotFound(_)
        )
    }
}

pub mod behavior;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod explain;
pub mod mcp;
pub mod profile;
pub mod ranking;
pub mod service;
pub mod similarity;
