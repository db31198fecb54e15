//! # Codemem Core
//!
//! Per-developer memory engine for AI coding assistants:
//!
//! - **Storage engine**: SQLite-backed relational store of projects,
//!   sessions, contexts, file associations, and embeddings
//! - **Hybrid retrieval**: unit-vector similarity fused with a keyword
//!   baseline, re-ranked by metadata relevance (files, project, tags,
//!   recency)
//! - **Ingestion pipeline**: project/session resolution, duplicate
//!   advisories, auto-classification, git/project enrichment, and
//!   asynchronous embedding generation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use codemem_core::{MemoryConfig, MemoryService, RecordContextInput, SearchRequest};
//!
//! let service = MemoryService::new(MemoryConfig::default())?;
//!
//! // Record a memory
//! let outcome = service.record_context(RecordContextInput {
//!     content: "Fixed the password hash truncation bug".to_string(),
//!     project_path: "/work/webapp".to_string(),
//!     ..Default::default()
//! }).await?;
//!
//! // Search it back
//! let results = service.semantic_search(SearchRequest {
//!     query: "auth bug".to_string(),
//!     project_path: Some("/work/webapp".to_string()),
//!     ..Default::default()
//! }).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local embedding generation with fastembed

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod classify;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod filepath;
pub mod ingest;
pub mod model;
pub mod resolver;
pub mod search;
pub mod service;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::{DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL, MemoryConfig, VectorSearchConfig};
pub use error::{MemoryError, Result};

// Domain model
pub use model::{
    ChangeType, Context, ContextFile, ContextFileEntry, ContextPatch, ContextType, DiffStats,
    FileIndexEntry, ImpactLevel, MemoryStats, NewContext, NewFileIndexEntry, Project,
    ProjectSummary, RelationType, Relationship, Session, SessionStatus,
};

// Storage layer
pub use storage::{ContextFilter, Database};

// Embeddings
pub use embeddings::{
    EMBEDDING_VERSION, EmbeddingCacheStats, EmbeddingError, EmbeddingProvider, cosine_similarity,
    dot_product, normalize_l2, vector_from_bytes, vector_to_bytes,
};

// Retrieval
pub use search::{
    Candidate, MetadataScore, ScoredCandidate, SearchRequest, SearchResponse, SearchResultRow,
    final_score, hybrid_score, metadata_score,
};

// Ingestion
pub use ingest::{FileSummary, IngestTier, RecordContextInput, RecordOutcome};

// Detectors and advisories
pub use dedup::DuplicateAdvisory;
pub use detect::{GitDetector, GitInfo, ProjectDetector, ProjectInfo};

// Service facade
pub use service::{IndexReport, MemoryService, MemoryStatus, RegenerateReport};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
