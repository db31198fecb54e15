//! Embedding generation and vector helpers.
//!
//! The byte codec and vector math live here unconditionally; the
//! model-backed provider is gated behind the `embeddings` feature.

#[cfg(feature = "embeddings")]
mod provider;

#[cfg(feature = "embeddings")]
pub use provider::EmbeddingProvider;

#[cfg(not(feature = "embeddings"))]
mod stub;

#[cfg(not(feature = "embeddings"))]
pub use stub::EmbeddingProvider;

use serde::{Deserialize, Serialize};

/// Version string stored with every vector; bumped whenever the model
/// changes so mixed-version rows stay identifiable.
pub const EMBEDDING_VERSION: &str = "v2";

/// Cache observability snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingCacheStats {
    pub size: usize,
    pub model: String,
    pub dimensions: usize,
}

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Provider disabled by configuration or compiled out
    #[error("Embedding provider disabled")]
    Disabled,
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty text)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product. For unit-length inputs this equals cosine similarity.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity between two vectors of any magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 { dot / denominator } else { 0.0 }
}

// ============================================================================
// STORAGE CODEC
// ============================================================================

/// Serialize a vector as little-endian f32 bytes for BLOB storage.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize a BLOB back into a vector. Returns `None` for blobs
/// whose length is not a multiple of 4.
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// TESTS
// ============================================================================
