//! Hybrid retrieval engine.
//!
//! Pure scoring lives in [`hybrid`]; additive query expansion in
//! [`enhance`]. The service glues them to the DAO candidate set.

pub mod enhance;
pub mod hybrid;

pub use hybrid::{MetadataScore, ScoredCandidate, final_score, hybrid_score, metadata_score, rank};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CANDIDATE ROWS
// ============================================================================

/// A retrieval candidate: a context row with its vector, or a
/// file-index row projected into the context shape (`type=code`,
/// prior quality 0.95).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub session_id: String,
    pub context_type: String,
    pub content: String,
    pub file_path: Option<String>,
    pub tags: Vec<String>,
    pub quality_score: f64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub vector: Option<Vec<f32>>,
    pub embedding_version: Option<String>,
    /// True for file-index rows; they never bump context hit counters
    pub from_file_index: bool,
}

/// Prior quality score assigned to projected file-index rows so
/// "how is X implemented" queries favor code.
pub const FILE_INDEX_PRIOR_QUALITY: f64 = 0.95;

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// `semantic_search` request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default, rename = "type")]
    pub context_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub hybrid_weight: Option<f64>,
}

fn default_limit() -> usize {
    10
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            project_path: None,
            session_id: None,
            file_path: None,
            context_type: None,
            limit: 10,
            similarity_threshold: None,
            hybrid_weight: None,
        }
    }
}

/// One returned search row with full score transparency
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultRow {
    pub context_id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub context_type: String,
    pub content: String,
    pub file_path: Option<String>,
    pub tags: Vec<String>,
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
    pub from_file_index: bool,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub hybrid_score: f64,
    pub metadata_score: MetadataScore,
    pub final_score: f64,
}

/// `semantic_search` response
#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchResponse {
    pub query: String,
    /// The pre-enhancement query, kept for transparency
    pub original_query: String,
    pub total_candidates: usize,
    pub results: Vec<SearchResultRow>,
    /// Present when the candidate set was empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Candidate {
    /// Age in fractional days at `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }
}
