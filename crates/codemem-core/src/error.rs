//! Error types for the memory engine.

/// Engine-wide error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Missing or malformed caller input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Project / session / context lookup miss
    #[error("Not found: {0}")]
    NotFound(String),
    /// Database error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// Write attempted after the database was closed
    #[error("Storage connection closed")]
    ConnectionClosed,
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Semantic search requested while vector search is disabled or
    /// the model failed to load
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// Per-row failure during bulk embedding regeneration
    #[error("Embedding generation failed: {0}")]
    EmbeddingGenerationFailed(String),
    /// Invalid stored timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// Short machine-readable kind label, used in `_meta` payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::InvalidArgument(_) => "invalid_argument",
            MemoryError::NotFound(_) => "not_found",
            MemoryError::Storage(_) => "storage_error",
            MemoryError::ConnectionClosed => "connection_closed",
            MemoryError::Io(_) => "io_error",
            MemoryError::Serde(_) => "serialization_error",
            MemoryError::EmbeddingUnavailable(_) => "embedding_unavailable",
            MemoryError::EmbeddingGenerationFailed(_) => "embedding_generation_failed",
            MemoryError::InvalidTimestamp(_) => "invalid_timestamp",
            MemoryError::Init(_) => "init_error",
        }
    }
}
