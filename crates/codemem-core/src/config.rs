//! Engine configuration.
//!
//! A single `MemoryConfig` is handed to [`crate::MemoryService`] at
//! startup. Every field has a serde default so hosts can supply a
//! partial JSON blob (or nothing at all).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default embedding model (384 dimensions, ONNX local inference)
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default embedding dimensionality
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    /// Database file location. `None` resolves to `<home>/.devmind/memory.db`.
    pub database_path: Option<PathBuf>,
    /// Minimum quality score for contexts surfaced by default listings
    pub quality_threshold: f64,
    /// Auto-save interval for host-driven flushes, in milliseconds
    pub auto_save_interval_ms: u64,
    /// Glob patterns skipped by the codebase indexer
    pub ignored_patterns: Vec<String>,
    /// File extensions the codebase indexer picks up
    pub included_extensions: Vec<String>,
    /// Vector search settings
    pub vector_search: VectorSearchConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            quality_threshold: 0.3,
            auto_save_interval_ms: 60_000,
            ignored_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/.git/**".to_string(),
                "**/dist/**".to_string(),
                "**/build/**".to_string(),
                "**/__pycache__/**".to_string(),
            ],
            included_extensions: vec![
                "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "rb", "c", "cc", "cpp", "h",
                "hpp", "cs", "swift", "kt", "md", "toml", "yaml", "yml", "json", "sql", "sh",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            vector_search: VectorSearchConfig::default(),
        }
    }
}

/// Vector search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorSearchConfig {
    /// Master switch. When false, `semantic_search` degrades to
    /// keyword-plus-metadata scoring and ingest skips embedding tasks.
    pub enabled: bool,
    /// Embedding model name (recorded on every stored vector)
    pub model_name: String,
    /// Vector dimensionality, fixed for the lifetime of a database
    pub dimensions: usize,
    /// Default minimum cosine similarity for vector hits
    pub similarity_threshold: f64,
    /// Default weight of the vector score inside the hybrid score
    pub hybrid_weight: f64,
    /// Keep an LRU content-hash cache of computed vectors
    pub cache_embeddings: bool,
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            similarity_threshold: 0.5,
            hybrid_weight: 0.7,
            cache_embeddings: true,
        }
    }
}

impl MemoryConfig {
    /// Resolve the database path, falling back to `<home>/.devmind/memory.db`.
    pub fn resolve_database_path(&self) -> Option<PathBuf> {
        if let Some(ref p) = self.database_path {
            return Some(p.clone());
        }
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".devmind").join("memory.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = MemoryConfig::default();
        assert!(cfg.vector_search.enabled);
        assert_eq!(cfg.vector_search.dimensions, 384);
        assert!((cfg.vector_search.hybrid_weight - 0.7).abs() < f64::EPSILON);
        assert!((cfg.vector_search.similarity_threshold - 0.5).abs() < f64::EPSILON);
        assert!(cfg.ignored_patterns.iter().any(|p| p.contains("node_modules")));
    }

    #[test]
    fn test_partial_json_deserializes_with_defaults() {
        let cfg: MemoryConfig =
            serde_json::from_str(r#"{"vectorSearch": {"hybridWeight": 0.5}}"#).unwrap();
        assert!((cfg.vector_search.hybrid_weight - 0.5).abs() < f64::EPSILON);
        // Untouched fields keep their defaults
        assert_eq!(cfg.vector_search.dimensions, 384);
        assert!((cfg.quality_threshold - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_database_path_override() {
        let cfg = MemoryConfig {
            database_path: Some(PathBuf::from("/tmp/custom.db")),
            ..Default::default()
        };
        assert_eq!(
            cfg.resolve_database_path().unwrap(),
            PathBuf::from("/tmp/custom.db")
        );
    }
}
