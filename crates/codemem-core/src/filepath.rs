//! File-path inference.
//!
//! When an ingest arrives with no file information, this detector
//! guesses the affected files from (a) path-like tokens in the content
//! and (b) files recently touched in the same session. Suggestions are
//! only promoted when the evidence is strong: best confidence above
//! 0.6 with more than one high-confidence match.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Context, metadata};

/// How many suggestions may be promoted to `files_changed`.
pub const MAX_PROMOTED: usize = 5;

/// Promotion gate on the best suggestion.
pub const PROMOTION_THRESHOLD: f64 = 0.6;

/// One suggested file with detection confidence
#[derive(Debug, Clone, PartialEq)]
pub struct PathSuggestion {
    pub file_path: String,
    pub confidence: f64,
}

fn path_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Tokens like `src/auth.ts`, `lib/db/mod.rs`, `a.py`
        Regex::new(r"[A-Za-z0-9_\-]+(?:/[A-Za-z0-9_\-.]+)*\.[A-Za-z][A-Za-z0-9]{0,7}")
            .expect("static regex compiles")
    })
}

/// Suggest affected files for `content`, using the session's recent
/// contexts as supporting evidence. Sorted by confidence descending.
pub fn suggest(content: &str, recent: &[Context]) -> Vec<PathSuggestion> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    // Direct mentions in the content are the strongest signal
    for m in path_token_regex().find_iter(content) {
        let token = m.as_str().trim_matches(['.', ',']);
        if looks_like_source_path(token) {
            let entry = scores.entry(token.to_string()).or_insert(0.0);
            *entry = entry.max(0.9);
        }
    }

    // Frequency of files touched by the session's recent work
    let mut history: HashMap<String, usize> = HashMap::new();
    for context in recent {
        if let Some(ref path) = context.file_path {
            *history.entry(path.clone()).or_default() += 1;
        }
        for entry in metadata::files_changed(&context.metadata) {
            *history.entry(entry.file_path).or_default() += 1;
        }
    }

    let content_lower = content.to_lowercase();
    for (path, count) in history {
        let mut confidence = (0.35 + count as f64 * 0.1).min(0.75);
        // A mentioned basename corroborates the history signal
        if let Some(basename) = path.rsplit('/').next() {
            if let Some(stem) = basename.split('.').next() {
                if stem.len() >= 3 && content_lower.contains(&stem.to_lowercase()) {
                    confidence = (confidence + 0.2).min(0.85);
                }
            }
        }
        let entry = scores.entry(path).or_insert(0.0);
        *entry = entry.max(confidence);
    }

    let mut suggestions: Vec<PathSuggestion> = scores
        .into_iter()
        .map(|(file_path, confidence)| PathSuggestion { file_path, confidence })
        .collect();
    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
    suggestions
}

/// Path-like tokens lexed out of free text (also used by the search
/// engine's file-match scoring).
pub fn extract_path_tokens(text: &str) -> Vec<String> {
    path_token_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim_matches(['.', ',']).to_string())
        .filter(|t| looks_like_source_path(t))
        .collect()
}

/// Apply the promotion gate: a best suggestion above the threshold
/// plus at least one more high-confidence match.
pub fn promotable(suggestions: &[PathSuggestion]) -> Option<Vec<PathSuggestion>> {
    let best = suggestions.first()?;
    if best.confidence <= PROMOTION_THRESHOLD {
        return None;
    }
    let high: Vec<PathSuggestion> = suggestions
        .iter()
        .filter(|s| s.confidence > PROMOTION_THRESHOLD)
        .take(MAX_PROMOTED)
        .cloned()
        .collect();
    (high.len() > 1).then_some(high)
}

fn looks_like_source_path(token: &str) -> bool {
    // Reject version-ish and domain-ish tokens (`1.2.3`, `example.com`)
    let Some((_, ext)) = token.rsplit_once('.') else {
        return false;
    };
    if ext.chars().all(|c| c.is_numeric()) {
        return false;
    }
    const NON_SOURCE: &[&str] = &["com", "org", "net", "io", "dev"];
    if !token.contains('/') && NON_SOURCE.contains(&ext) {
        return false;
    }
    true
}

// ============================================================================
// TESTS
// ============================================================================
