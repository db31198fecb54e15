//! Hybrid ranking.
//!
//! Pure scoring over the candidate set:
//!
//! - `hybrid = w · similarity + (1 − w) · keyword_hit`
//! - metadata score out of 20: file match (0/5), project match (0/3),
//!   2 per overlapping tag, time weight `max(0, 10 − days)`
//! - `final = 0.7 · hybrid + 0.3 · min(metadata / 20, 1)`
//!
//! Ties on the final score break toward the more recent row.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Candidate;
use crate::embeddings::dot_product;
use crate::filepath::extract_path_tokens;
use crate::model::metadata;

/// Points for a file match
const FILE_MATCH_POINTS: f64 = 5.0;
/// Points for a project-scope match
const PROJECT_MATCH_POINTS: f64 = 3.0;
/// Points per overlapping tag
const TAG_MATCH_POINTS: f64 = 2.0;
/// Ceiling of the recency component
const TIME_WEIGHT_MAX: f64 = 10.0;
/// Denominator of the normalized metadata share
const METADATA_SCALE: f64 = 20.0;

/// Share of the hybrid score in the final score
const HYBRID_SHARE: f64 = 0.7;
/// Share of the normalized metadata score in the final score
const METADATA_SHARE: f64 = 0.3;

/// Metadata relevance breakdown (out of 20 points)
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataScore {
    pub file_match: f64,
    pub project_match: f64,
    pub tag_match: f64,
    pub time_weight: f64,
    pub total: f64,
}

/// A candidate with its complete score breakdown
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub hybrid_score: f64,
    pub metadata: MetadataScore,
    pub final_score: f64,
}

// ============================================================================
// SCORE COMPONENTS
// ============================================================================

/// Weighted combination of vector similarity and the keyword-hit
/// indicator.
pub fn hybrid_score(similarity: f64, keyword_hit: bool, hybrid_weight: f64) -> f64 {
    let keyword = if keyword_hit { 1.0 } else { 0.0 };
    hybrid_weight * similarity + (1.0 - hybrid_weight) * keyword
}

/// `0.7 · hybrid + 0.3 · min(metadata/20, 1)`
pub fn final_score(hybrid: f64, metadata_total: f64) -> f64 {
    HYBRID_SHARE * hybrid + METADATA_SHARE * (metadata_total / METADATA_SCALE).min(1.0)
}

/// Metadata relevance for one candidate against the query.
pub fn metadata_score(
    candidate: &Candidate,
    query_files: &[String],
    query_terms: &[String],
    scope_project_path: Option<&str>,
    now: DateTime<Utc>,
) -> MetadataScore {
    let file_match = if file_matches(candidate, query_files) {
        FILE_MATCH_POINTS
    } else {
        0.0
    };

    let project_match = match (scope_project_path, metadata::project_path(&candidate.metadata)) {
        (Some(scope), Some(recorded)) if scope == recorded => PROJECT_MATCH_POINTS,
        _ => 0.0,
    };

    // A tag overlaps when a query term equals it or contains it
    // (so `auth` matches the term `src/auth.ts`)
    let overlapping = candidate
        .tags
        .iter()
        .filter(|tag| {
            let tag = tag.to_lowercase();
            query_terms
                .iter()
                .any(|term| *term == tag || (tag.len() >= 3 && term.contains(tag.as_str())))
        })
        .count();
    let tag_match = overlapping as f64 * TAG_MATCH_POINTS;

    let days = (now - candidate.created_at).num_days().max(0) as f64;
    let time_weight = (TIME_WEIGHT_MAX - days).max(0.0);

    let total = file_match + project_match + tag_match + time_weight;

    MetadataScore {
        file_match,
        project_match,
        tag_match,
        time_weight,
        total,
    }
}

/// Any candidate file vs any query file: exact, basename, or
/// substring containment in either direction.
fn file_matches(candidate: &Candidate, query_files: &[String]) -> bool {
    if query_files.is_empty() {
        return false;
    }

    let mut candidate_files: Vec<String> = metadata::files_changed(&candidate.metadata)
        .into_iter()
        .map(|e| e.file_path)
        .collect();
    if let Some(ref legacy) = candidate.file_path {
        candidate_files.push(legacy.clone());
    }
    if candidate_files.is_empty() {
        return false;
    }

    candidate_files.iter().any(|cf| {
        let cf_lower = cf.to_lowercase();
        let cf_base = basename(&cf_lower);
        query_files.iter().any(|qf| {
            let qf_lower = qf.to_lowercase();
            cf_lower == qf_lower
                || cf_base == basename(&qf_lower)
                || cf_lower.contains(&qf_lower)
                || qf_lower.contains(&cf_lower)
        })
    })
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ============================================================================
// RANKING
// ============================================================================

/// Ranking parameters resolved from the request and configuration.
#[derive(Debug, Clone)]
pub struct RankParams<'a> {
    pub query: &'a str,
    pub query_vector: Option<&'a [f32]>,
    /// Ids present in the keyword baseline
    pub keyword_ids: &'a HashSet<String>,
    pub scope_project_path: Option<&'a str>,
    pub hybrid_weight: f64,
    pub similarity_threshold: f64,
    pub type_filter: Option<&'a str>,
    pub limit: usize,
    pub now: DateTime<Utc>,
}

/// Score, filter, sort, and slice the candidate set.
pub fn rank(candidates: Vec<Candidate>, params: &RankParams) -> Vec<ScoredCandidate> {
    let query_files = extract_path_tokens(params.query);
    let query_terms: Vec<String> = params
        .query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .filter(|c| {
            params
                .type_filter
                .is_none_or(|wanted| c.context_type == wanted)
        })
        .filter_map(|candidate| {
            let similarity = match (params.query_vector, candidate.vector.as_deref()) {
                (Some(q), Some(v)) => dot_product(q, v) as f64,
                _ => 0.0,
            };
            let keyword_hit = params.keyword_ids.contains(&candidate.id);

            // Below-threshold rows survive only on a keyword hit
            if similarity < params.similarity_threshold && !keyword_hit {
                return None;
            }

            let hybrid = hybrid_score(similarity, keyword_hit, params.hybrid_weight);
            let meta = metadata_score(
                &candidate,
                &query_files,
                &query_terms,
                params.scope_project_path,
                params.now,
            );
            let final_s = final_score(hybrid, meta.total);

            Some(ScoredCandidate {
                candidate,
                vector_score: similarity,
                keyword_score: if keyword_hit { 1.0 } else { 0.0 },
                hybrid_score: hybrid,
                metadata: meta,
                final_score: final_s,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.candidate.created_at.cmp(&a.candidate.created_at))
    });
    scored.truncate(params.limit);
    scored
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn candidate(id: &str, content: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            session_id: "s".into(),
            context_type: "code".into(),
            content: content.to_string(),
            file_path: None,
            tags: vec![],
            quality_score: 0.5,
            metadata: json!({}),
            created_at: Utc::now(),
            vector: None,
            embedding_version: None,
            from_file_index: false,
        }
    }

    fn params<'a>(
        query: &'a str,
        query_vector: Option<&'a [f32]>,
        keyword_ids: &'a HashSet<String>,
    ) -> RankParams<'a> {
        RankParams {
            query,
            query_vector,
            keyword_ids,
            scope_project_path: None,
            hybrid_weight: 0.7,
            similarity_threshold: 0.5,
            type_filter: None,
            limit: 10,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_full_metadata_score_is_twenty() {
        // Query "fix src/auth.ts" against a same-project context with
        // files_changed containing src/auth.ts, one overlapping tag,
        // created today: 5 + 3 + 2 + 10 = 20.
        let now = Utc::now();
        let mut c = candidate("x", "password hash bug fix");
        c.tags = vec!["auth".into()];
        c.metadata = json!({
            "project_path": "/p",
            "files_changed": [{"file_path": "src/auth.ts", "change_type": "modify"}]
        });

        let query_files = extract_path_tokens("fix src/auth.ts");
        let query_terms: Vec<String> = "fix src/auth.ts"
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let score = metadata_score(&c, &query_files, &query_terms, Some("/p"), now);

        assert_eq!(score.file_match, 5.0);
        assert_eq!(score.project_match, 3.0);
        assert_eq!(score.tag_match, 2.0);
        assert_eq!(score.time_weight, 10.0);
        assert_eq!(score.total, 20.0);
    }

    #[test]
    fn test_partial_metadata_score() {
        // No file in the query, same project, one tag, two days old:
        // 0 + 3 + 2 + 8 = 13.
        let now = Utc::now();
        let mut c = candidate("x", "password hash bug fix");
        c.tags = vec!["auth".into()];
        c.metadata = json!({"project_path": "/p", "files_changed": [{"file_path": "auth.ts"}]});
        c.created_at = now - Duration::days(2);

        let query_terms: Vec<String> =
            "auth bug".split_whitespace().map(str::to_lowercase).collect();
        let score = metadata_score(&c, &[], &query_terms, Some("/p"), now);

        assert_eq!(score.file_match, 0.0);
        assert_eq!(score.project_match, 3.0);
        assert_eq!(score.tag_match, 2.0);
        assert_eq!(score.time_weight, 8.0);
        assert_eq!(score.total, 13.0);
    }

    #[test]
    fn test_final_score_formula() {
        // Exactly 0.7·hybrid + 0.3·min(metadata/20, 1)
        assert!((final_score(1.0, 20.0) - 1.0).abs() < 1e-12);
        assert!((final_score(0.5, 10.0) - (0.35 + 0.15)).abs() < 1e-12);
        // Metadata share saturates at 20 points
        assert!((final_score(0.0, 40.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_final_score_is_monotonic() {
        for meta in [0.0, 5.0, 13.0, 20.0] {
            assert!(final_score(0.8, meta) > final_score(0.4, meta));
        }
        for hybrid in [0.0, 0.4, 0.9] {
            assert!(final_score(hybrid, 15.0) > final_score(hybrid, 5.0));
        }
    }

    #[test]
    fn test_hybrid_score_weights() {
        assert!((hybrid_score(0.8, false, 0.7) - 0.56).abs() < 1e-12);
        assert!((hybrid_score(0.8, true, 0.7) - 0.86).abs() < 1e-12);
        // Weight 1.0 ignores keywords entirely
        assert!((hybrid_score(0.8, true, 1.0) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_drops_unless_keyword_hit() {
        let query_vec = vec![1.0_f32, 0.0];
        let mut below = candidate("below", "unrelated");
        below.vector = Some(vec![0.3, 0.954]); // similarity ≈ 0.3
        let mut rescued = candidate("rescued", "keyword match");
        rescued.vector = Some(vec![0.3, 0.954]);

        let mut keyword_ids = HashSet::new();
        keyword_ids.insert("rescued".to_string());

        let ranked = rank(
            vec![below, rescued],
            &params("query", Some(&query_vec), &keyword_ids),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.id, "rescued");
        assert_eq!(ranked[0].keyword_score, 1.0);
    }

    #[test]
    fn test_rows_without_vectors_default_to_zero_similarity() {
        let query_vec = vec![1.0_f32, 0.0];
        let keyword_ids: HashSet<String> =
            ["plain".to_string()].into_iter().collect();
        let ranked = rank(
            vec![candidate("plain", "file index row")],
            &params("query", Some(&query_vec), &keyword_ids),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].vector_score, 0.0);
        // hybrid = 0.7·0 + 0.3·1
        assert!((ranked[0].hybrid_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_type_filter() {
        let mut code = candidate("code", "code row");
        code.vector = Some(vec![1.0, 0.0]);
        let mut design = candidate("design", "design row");
        design.context_type = "design".into();
        design.vector = Some(vec![1.0, 0.0]);

        let query_vec = vec![1.0_f32, 0.0];
        let keyword_ids = HashSet::new();
        let mut p = params("query", Some(&query_vec), &keyword_ids);
        p.type_filter = Some("design");

        let ranked = rank(vec![code, design], &p);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.id, "design");
    }

    #[test]
    fn test_tie_breaks_on_recency() {
        let now = Utc::now();
        let mut older = candidate("older", "same");
        older.vector = Some(vec![1.0, 0.0]);
        older.created_at = now - Duration::days(30); // outside time weight
        let mut newer = candidate("newer", "same");
        newer.vector = Some(vec![1.0, 0.0]);
        newer.created_at = now - Duration::days(20);

        let query_vec = vec![1.0_f32, 0.0];
        let keyword_ids = HashSet::new();
        let ranked = rank(vec![older, newer], &params("same", Some(&query_vec), &keyword_ids));
        assert_eq!(ranked[0].candidate.id, "newer");
        assert_eq!(ranked[1].candidate.id, "older");
        assert!((ranked[0].final_score - ranked[1].final_score).abs() < 1e-12);
    }

    #[test]
    fn test_limit_slices_results() {
        let query_vec = vec![1.0_f32, 0.0];
        let keyword_ids = HashSet::new();
        let candidates: Vec<Candidate> = (0..25)
            .map(|i| {
                let mut c = candidate(&format!("c{i}"), "row");
                c.vector = Some(vec![1.0, 0.0]);
                c
            })
            .collect();
        let mut p = params("row", Some(&query_vec), &keyword_ids);
        p.limit = 5;
        assert_eq!(rank(candidates, &p).len(), 5);
    }

    #[test]
    fn test_literal_content_match_keeps_metadata_floor() {
        // A keyword-hit row's final score is at least the metadata share
        let keyword_ids: HashSet<String> = ["hit".to_string()].into_iter().collect();
        let mut c = candidate("hit", "exact query text lives here");
        c.metadata = json!({"project_path": "/p"});
        let mut p = params("exact query text", None, &keyword_ids);
        p.scope_project_path = Some("/p");

        let ranked = rank(vec![c], &p);
        let row = &ranked[0];
        assert!(row.final_score >= METADATA_SHARE * (row.metadata.total / METADATA_SCALE).min(1.0));
    }
}
