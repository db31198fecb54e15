//! Typed accessors over the free-form context metadata blob.
//!
//! Contexts carry a permissive JSON `metadata` object. Well-known keys
//! get schema'd getters/setters here; anything else passes through
//! untouched so hosts can stash their own data.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::records::{ContextFileEntry, DiffStats};

/// Well-known metadata keys
pub mod keys {
    pub const GIT_BRANCH: &str = "git_branch";
    pub const GIT_AUTHOR: &str = "git_author";
    pub const PROJECT_NAME: &str = "project_name";
    pub const PROJECT_VERSION: &str = "project_version";
    pub const PROJECT_TYPE: &str = "project_type";
    pub const PROJECT_PATH: &str = "project_path";
    pub const CHANGE_TYPE: &str = "change_type";
    pub const IMPACT_LEVEL: &str = "impact_level";
    pub const DIFF_STATS: &str = "diff_stats";
    pub const FILES_CHANGED: &str = "files_changed";
    pub const LINE_RANGES: &str = "line_ranges";
    pub const QUALITY_METRICS: &str = "quality_metrics";
    pub const LAST_ACCESSED: &str = "last_accessed";
    pub const AI_ENRICHMENT: &str = "ai_enrichment";
    pub const AUTO_CLASSIFICATION: &str = "auto_classification";
}

/// Borrow the metadata as an object map, if it is one.
fn as_object(meta: &Value) -> Option<&Map<String, Value>> {
    meta.as_object()
}

/// Get a string field from the metadata root.
pub fn get_str<'a>(meta: &'a Value, key: &str) -> Option<&'a str> {
    as_object(meta)?.get(key)?.as_str()
}

/// Set a field at the metadata root, turning non-objects into objects.
pub fn set(meta: &mut Value, key: &str, value: Value) {
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    if let Some(obj) = meta.as_object_mut() {
        obj.insert(key.to_string(), value);
    }
}

/// Set a field only when the caller did not already supply it.
pub fn set_if_absent(meta: &mut Value, key: &str, value: Value) {
    if get(meta, key).is_none() {
        set(meta, key, value);
    }
}

/// Get any field from the metadata root.
pub fn get<'a>(meta: &'a Value, key: &str) -> Option<&'a Value> {
    as_object(meta)?.get(key)
}

/// Project path recorded at ingest time (used by project-match scoring).
pub fn project_path(meta: &Value) -> Option<&str> {
    get_str(meta, keys::PROJECT_PATH)
}

/// `files_changed` entries recorded in metadata.
pub fn files_changed(meta: &Value) -> Vec<ContextFileEntry> {
    get(meta, keys::FILES_CHANGED)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Aggregated diff stats recorded in metadata.
pub fn diff_stats(meta: &Value) -> Option<DiffStats> {
    get(meta, keys::DIFF_STATS).and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Update `quality_metrics.last_accessed` to the given instant.
pub fn touch_last_accessed(meta: &mut Value, at: DateTime<Utc>) {
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    let obj = match meta.as_object_mut() {
        Some(o) => o,
        None => return,
    };
    let metrics = obj
        .entry(keys::QUALITY_METRICS.to_string())
        .or_insert_with(|| json!({}));
    if !metrics.is_object() {
        *metrics = json!({});
    }
    if let Some(m) = metrics.as_object_mut() {
        m.insert(keys::LAST_ACCESSED.to_string(), json!(at.to_rfc3339()));
    }
}

/// `quality_metrics.last_accessed`, if recorded.
pub fn last_accessed(meta: &Value) -> Option<DateTime<Utc>> {
    let s = get(meta, keys::QUALITY_METRICS)?.get(keys::LAST_ACCESSED)?.as_str()?;
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_if_absent_respects_caller_values() {
        let mut meta = json!({"project_name": "theirs"});
        set_if_absent(&mut meta, keys::PROJECT_NAME, json!("ours"));
        set_if_absent(&mut meta, keys::PROJECT_TYPE, json!("node"));
        assert_eq!(get_str(&meta, keys::PROJECT_NAME), Some("theirs"));
        assert_eq!(get_str(&meta, keys::PROJECT_TYPE), Some("node"));
    }

    #[test]
    fn test_set_upgrades_non_object_metadata() {
        let mut meta = Value::Null;
        set(&mut meta, keys::GIT_BRANCH, json!("main"));
        assert_eq!(get_str(&meta, keys::GIT_BRANCH), Some("main"));
    }

    #[test]
    fn test_touch_last_accessed_roundtrip() {
        let mut meta = json!({"custom": 42});
        let at = Utc::now();
        touch_last_accessed(&mut meta, at);
        let read = last_accessed(&meta).unwrap();
        assert!((read - at).num_seconds().abs() <= 1);
        // Unknown keys pass through untouched
        assert_eq!(meta["custom"], 42);
    }

    #[test]
    fn test_files_changed_parses_wire_entries() {
        let meta = json!({
            "files_changed": [
                {"file_path": "a.ts", "change_type": "modify"},
                {"file_path": "b.ts"}
            ]
        });
        let files = files_changed(&meta);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_path, "a.ts");
    }
}
