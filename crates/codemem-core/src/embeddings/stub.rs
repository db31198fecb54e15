//! No-op provider used when the `embeddings` feature is compiled out.
//!
//! Keeps the public surface identical so the service and tool layers
//! build unchanged; every embedding attempt reports `Disabled`.

use super::{EmbeddingCacheStats, EmbeddingError};
use crate::config::VectorSearchConfig;

/// Feature-disabled stand-in for the model-backed provider
pub struct EmbeddingProvider {
    model_name: String,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &VectorSearchConfig) -> Self {
        Self {
            model_name: config.model_name.clone(),
            dimensions: config.dimensions,
        }
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn initialize(&self) -> Result<(), EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }

    pub fn is_ready(&self) -> bool {
        false
    }

    pub fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }

    pub fn cache_stats(&self) -> EmbeddingCacheStats {
        EmbeddingCacheStats {
            size: 0,
            model: self.model_name.clone(),
            dimensions: self.dimensions,
        }
    }
}
