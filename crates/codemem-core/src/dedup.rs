//! Duplicate detection.
//!
//! Before an ingest commits, the coordinator runs a constrained
//! similarity search over the project's recent contexts. A strong
//! match produces an *advisory string only*: the engine never merges
//! or updates an existing record on similarity. The whole check is
//! best-effort; any failure means no advisory.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::search::Candidate;

/// Top-K for the constrained search.
pub const SEARCH_LIMIT: usize = 5;
/// Similarity floor for the constrained search.
pub const SEARCH_THRESHOLD: f64 = 0.75;
/// Gate on the best match before an advisory is raised.
pub const SIMILARITY_GATE: f64 = 0.7;
/// Matches older than this never trigger an advisory.
pub const MAX_AGE_HOURS: i64 = 24;

/// A raised advisory
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateAdvisory {
    pub context_id: String,
    pub similarity: f64,
    pub created_at: DateTime<Utc>,
    pub preview: String,
}

/// Evaluate scored matches (similarity, candidate) from the
/// constrained search. File-index rows never count as duplicates.
pub fn evaluate(matches: &[(f64, &Candidate)], now: DateTime<Utc>) -> Option<DuplicateAdvisory> {
    let (similarity, best) = matches
        .iter()
        .filter(|(_, c)| !c.from_file_index)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))?;

    if *similarity <= SIMILARITY_GATE {
        return None;
    }
    let age_hours = (now - best.created_at).num_hours();
    if age_hours >= MAX_AGE_HOURS {
        return None;
    }

    Some(DuplicateAdvisory {
        context_id: best.id.clone(),
        similarity: *similarity,
        created_at: best.created_at,
        preview: crate::extract::preview(&best.content, 80),
    })
}

/// Human-readable advisory line appended to the ingest response.
pub fn advisory_text(advisory: &DuplicateAdvisory, chinese: bool) -> String {
    if chinese {
        format!(
            "⚠️ 检测到可能重复的记录 {} (相似度 {:.0}%): \"{}\"。未自动合并。",
            advisory.context_id,
            advisory.similarity * 100.0,
            advisory.preview
        )
    } else {
        format!(
            "⚠️ Possible duplicate of context {} ({:.0}% similar): \"{}\". No automatic merge was performed.",
            advisory.context_id,
            advisory.similarity * 100.0,
            advisory.preview
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
