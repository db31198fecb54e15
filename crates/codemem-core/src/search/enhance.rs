//! Query enhancement.
//!
//! Additive expansion of the search query with developer-vocabulary
//! synonyms and a coarse intent label. The enhanced text replaces the
//! original for both vector and keyword search; the original query is
//! preserved in the response for transparency.

use serde::Serialize;

/// Coarse query intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// "how is X implemented", "where does X happen"
    Implementation,
    /// errors, failures, debugging
    Debugging,
    /// "what is X"
    Definition,
    /// "when did X change", commit archaeology
    History,
    #[default]
    General,
}

/// An enhanced query with its provenance
#[derive(Debug, Clone)]
pub struct EnhancedQuery {
    /// Expanded text used for embedding and keyword search
    pub text: String,
    /// The caller's untouched query
    pub original: String,
    pub intent: QueryIntent,
}

/// Developer-vocabulary synonym table. Expansion terms are appended,
/// never substituted.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("bug", &["fix", "error", "defect"]),
    ("fix", &["bug", "resolved"]),
    ("auth", &["authentication", "login"]),
    ("login", &["auth", "session"]),
    ("db", &["database", "sql"]),
    ("database", &["sql", "query"]),
    ("perf", &["performance", "optimize"]),
    ("slow", &["performance", "latency"]),
    ("config", &["configuration", "settings"]),
    ("deploy", &["deployment", "release"]),
    ("test", &["tests", "assertion"]),
    ("crash", &["panic", "exception", "error"]),
];

/// Maximum number of appended expansion terms.
const MAX_EXPANSIONS: usize = 4;

/// Classify the query's intent from its leading words and shape.
pub fn classify_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();
    if lower.starts_with("how ")
        || lower.contains("implemented")
        || lower.contains("where is")
        || lower.contains("where does")
    {
        return QueryIntent::Implementation;
    }
    if lower.contains("error")
        || lower.contains("crash")
        || lower.contains("fail")
        || lower.contains("panic")
        || lower.starts_with("why ")
    {
        return QueryIntent::Debugging;
    }
    if lower.starts_with("what is") || lower.starts_with("what are") {
        return QueryIntent::Definition;
    }
    if lower.starts_with("when ") || lower.contains("changed") || lower.contains("history") {
        return QueryIntent::History;
    }
    QueryIntent::General
}

/// Expand a query additively.
pub fn enhance(query: &str) -> EnhancedQuery {
    let original = query.to_string();
    let lower = query.to_lowercase();
    let existing: Vec<&str> = lower.split_whitespace().collect();

    let mut expansions: Vec<&str> = Vec::new();
    for (needle, terms) in SYNONYMS {
        if !existing.iter().any(|w| w == needle) {
            continue;
        }
        for term in *terms {
            if expansions.len() >= MAX_EXPANSIONS {
                break;
            }
            if !existing.contains(term) && !expansions.contains(term) {
                expansions.push(*term);
            }
        }
    }

    let intent = classify_intent(query);
    // Intent adds a retrieval bias term for implementation questions
    if intent == QueryIntent::Implementation
        && expansions.len() < MAX_EXPANSIONS
        && !existing.contains(&"code")
    {
        expansions.push("code");
    }

    let text = if expansions.is_empty() {
        original.clone()
    } else {
        format!("{} {}", original, expansions.join(" "))
    };

    EnhancedQuery { text, original, intent }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_are_additive() {
        let enhanced = enhance("auth bug");
        assert!(enhanced.text.starts_with("auth bug"));
        assert!(enhanced.text.contains("authentication"));
        assert!(enhanced.text.contains("fix"));
        assert_eq!(enhanced.original, "auth bug");
    }

    #[test]
    fn test_no_duplicate_terms() {
        let enhanced = enhance("bug fix");
        let words: Vec<&str> = enhanced.text.split_whitespace().collect();
        let mut deduped = words.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(words.len(), deduped.len());
    }

    #[test]
    fn test_expansion_cap() {
        let enhanced = enhance("bug auth db perf config deploy crash");
        let added = enhanced.text.split_whitespace().count()
            - enhanced.original.split_whitespace().count();
        assert!(added <= MAX_EXPANSIONS);
    }

    #[test]
    fn test_intent_classification() {
        assert_eq!(classify_intent("how is rate limiting implemented"), QueryIntent::Implementation);
        assert_eq!(classify_intent("why does login crash"), QueryIntent::Debugging);
        assert_eq!(classify_intent("what is the session resolver"), QueryIntent::Definition);
        assert_eq!(classify_intent("when did the schema change"), QueryIntent::History);
        assert_eq!(classify_intent("auth token"), QueryIntent::General);
    }

    #[test]
    fn test_plain_query_is_untouched() {
        let enhanced = enhance("session resolver");
        assert_eq!(enhanced.text, "session resolver");
    }
}
