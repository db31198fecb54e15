//! Model-backed embedding provider.
//!
//! Wraps fastembed (local ONNX inference, all-MiniLM-L6-v2 by
//! default). The model handle lives in a `OnceLock` field owned by the
//! provider so the whole thing is released with the service, and
//! initialization is serialized: concurrent callers block on the same
//! `get_or_init` and the model loads at most once.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use super::{EmbeddingCacheStats, EmbeddingError, normalize_l2};
use crate::config::VectorSearchConfig;

/// Maximum text length for embedding (truncated if longer)
const MAX_TEXT_LENGTH: usize = 8192;

/// Capacity of the content-hash → vector cache
const CACHE_CAPACITY: usize = 512;

type CacheKey = [u8; 32];

/// Service for generating embeddings
pub struct EmbeddingProvider {
    model: OnceLock<Result<Mutex<TextEmbedding>, String>>,
    cache: Option<Mutex<LruCache<CacheKey, Vec<f32>>>>,
    model_name: String,
    dimensions: usize,
    enabled: bool,
}

impl EmbeddingProvider {
    /// Create a provider from the vector-search configuration. The
    /// model is not loaded until the first `initialize`/`embed` call.
    pub fn new(config: &VectorSearchConfig) -> Self {
        let cache = config.cache_embeddings.then(|| {
            // SAFETY: CACHE_CAPACITY is a non-zero constant
            Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero"),
            ))
        });

        Self {
            model: OnceLock::new(),
            cache,
            model_name: config.model_name.clone(),
            dimensions: config.dimensions,
            enabled: config.enabled,
        }
    }

    /// Whether vector search is enabled by configuration.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Model name recorded on every stored vector.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Vector dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_cache_dir() -> std::path::PathBuf {
        if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
            return std::path::PathBuf::from(path);
        }
        if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "codemem", "core") {
            return proj_dirs.cache_dir().join("fastembed");
        }
        std::path::PathBuf::from(".fastembed_cache")
    }

    fn model_kind(&self) -> EmbeddingModel {
        let name = self.model_name.to_lowercase();
        if name.contains("bge-small") {
            EmbeddingModel::BGESmallENV15
        } else {
            if !name.contains("all-minilm-l6-v2") {
                tracing::warn!(
                    "Unknown embedding model '{}', using all-MiniLM-L6-v2",
                    self.model_name
                );
            }
            EmbeddingModel::AllMiniLML6V2
        }
    }

    fn get_model(&self) -> Result<std::sync::MutexGuard<'_, TextEmbedding>, EmbeddingError> {
        if !self.enabled {
            return Err(EmbeddingError::Disabled);
        }

        let result = self.model.get_or_init(|| {
            let cache_dir = Self::model_cache_dir();
            if let Err(e) = std::fs::create_dir_all(&cache_dir) {
                tracing::warn!("Failed to create model cache directory {:?}: {}", cache_dir, e);
            }

            let options = InitOptions::new(self.model_kind())
                .with_show_download_progress(false)
                .with_cache_dir(cache_dir);

            TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
                format!(
                    "Failed to initialize embedding model '{}': {}",
                    self.model_name, e
                )
            })
        });

        match result {
            Ok(model) => model
                .lock()
                .map_err(|e| EmbeddingError::ModelInit(format!("Model lock poisoned: {e}"))),
            Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
        }
    }

    /// Load the model if necessary. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), EmbeddingError> {
        self.get_model().map(|_| ())
    }

    /// Whether the model has loaded successfully.
    pub fn is_ready(&self) -> bool {
        self.enabled && matches!(self.model.get(), Some(Ok(_)))
    }

    /// Generate a unit-length embedding for the given text.
    ///
    /// Cache hits return the identical vector; cache misses run the
    /// model and populate the cache keyed by the content's SHA-256.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }

        let key = content_key(text);
        if let Some(ref cache) = self.cache {
            if let Ok(mut cache) = cache.lock() {
                if let Some(hit) = cache.get(&key) {
                    return Ok(hit.clone());
                }
            }
        }

        let truncated = truncate_on_char_boundary(text, MAX_TEXT_LENGTH);

        let vector = {
            let mut model = self.get_model()?;
            let mut embeddings = model
                .embed(vec![truncated], None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            embeddings
                .pop()
                .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding generated".to_string()))?
        };

        let vector = self.fit_dimensions(vector);

        if let Some(ref cache) = self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.put(key, vector.clone());
            }
        }

        Ok(vector)
    }

    /// Truncate to the configured dimensionality and re-normalize.
    fn fit_dimensions(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if vector.len() > self.dimensions {
            vector.truncate(self.dimensions);
        }
        normalize_l2(&mut vector);
        vector
    }

    /// Cache observability snapshot.
    pub fn cache_stats(&self) -> EmbeddingCacheStats {
        let size = self
            .cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|c| c.len()))
            .unwrap_or(0);
        EmbeddingCacheStats {
            size,
            model: self.model_name.clone(),
            dimensions: self.dimensions,
        }
    }
}

/// SHA-256 of the content, used as the cache key.
fn content_key(text: &str) -> CacheKey {
    let digest = Sha256::digest(text.as_bytes());
    digest.into()
}

/// Truncate at a UTF-8 character boundary at or below `max_bytes`.
fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_is_stable() {
        assert_eq!(content_key("hello"), content_key("hello"));
        assert_ne!(content_key("hello"), content_key("hello "));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "修复了认证模块的密码哈希错误";
        let cut = truncate_on_char_boundary(text, 10);
        assert!(cut.len() <= 10);
        // Still valid UTF-8 prefix
        assert!(text.starts_with(cut));
    }

    #[test]
    fn test_disabled_provider_refuses_to_embed() {
        let config = VectorSearchConfig {
            enabled: false,
            ..Default::default()
        };
        let provider = EmbeddingProvider::new(&config);
        assert!(!provider.is_enabled());
        assert!(matches!(provider.embed("hello"), Err(EmbeddingError::Disabled)));
        assert!(!provider.is_ready());
    }

    #[test]
    fn test_empty_text_is_invalid() {
        let provider = EmbeddingProvider::new(&VectorSearchConfig::default());
        assert!(matches!(
            provider.embed(""),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cache_stats_shape() {
        let provider = EmbeddingProvider::new(&VectorSearchConfig::default());
        let stats = provider.cache_stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.dimensions, 384);
        assert!(stats.model.contains("MiniLM") || stats.model.contains("all-"));
    }
}
