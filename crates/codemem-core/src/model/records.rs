//! Stored entities and the write-side input rows.
//!
//! Entities mirror the database schema: Project owns Sessions, a
//! Session owns Contexts, a Context owns its ContextFile rows and the
//! embedding columns. FileIndex rows live beside contexts and join the
//! candidate set at retrieval time only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kinds::{ChangeType, ContextType, SessionStatus};

// ============================================================================
// PROJECT
// ============================================================================

/// Stable identity for a codebase on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique identifier (UUID v4)
    pub id: String,
    pub name: String,
    /// Canonical absolute path; unique per database
    pub path: String,
    pub language: Option<String>,
    pub framework: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Project row with aggregated counters, for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub session_count: i64,
    pub context_count: i64,
}

// ============================================================================
// SESSION
// ============================================================================

/// A development episode within a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub tool_used: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// A single recorded memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub id: String,
    pub session_id: String,
    /// Stored string form of [`ContextType`]
    pub context_type: String,
    pub content: String,
    /// Legacy single-file association; `None` for multi-file contexts
    pub file_path: Option<String>,
    pub line_start: Option<i64>,
    pub line_end: Option<i64>,
    pub language: Option<String>,
    pub tags: Vec<String>,
    /// Clamped to [0, 1] at write time
    pub quality_score: f64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// True when all four embedding columns are populated
    pub has_embedding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_version: Option<String>,
    /// Durable search-hit counter
    pub search_hits: i64,
}

impl Context {
    /// Parsed context type
    pub fn kind(&self) -> ContextType {
        ContextType::parse_name(&self.context_type)
    }

    /// Age in whole days
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}

/// Write-side row for a new context. The DAO assigns id and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewContext {
    pub session_id: String,
    pub context_type: ContextType,
    pub content: String,
    pub file_path: Option<String>,
    pub line_start: Option<i64>,
    pub line_end: Option<i64>,
    pub language: Option<String>,
    pub tags: Vec<String>,
    pub quality_score: f64,
    pub metadata: serde_json::Value,
}

/// Partial update for an existing context. `None` leaves a column
/// untouched; `session_id` is deliberately not updatable.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub context_type: Option<ContextType>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub quality_score: Option<f64>,
    pub metadata: Option<serde_json::Value>,
    pub file_path: Option<Option<String>>,
}

impl ContextPatch {
    pub fn is_empty(&self) -> bool {
        self.context_type.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.quality_score.is_none()
            && self.metadata.is_none()
            && self.file_path.is_none()
    }
}

// ============================================================================
// CONTEXT FILES
// ============================================================================

/// Diff statistics for a single changed file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
    #[serde(default)]
    pub changes: i64,
}

impl DiffStats {
    pub fn merge(&mut self, other: &DiffStats) {
        self.additions += other.additions;
        self.deletions += other.deletions;
        self.changes += other.changes;
    }

    pub fn is_zero(&self) -> bool {
        self.additions == 0 && self.deletions == 0 && self.changes == 0
    }
}

/// Normalized file association for a context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFile {
    pub id: i64,
    pub context_id: String,
    pub file_path: String,
    pub change_type: Option<ChangeType>,
    /// Inclusive `[start, end]` pairs, strictly increasing
    pub line_ranges: Vec<(i64, i64)>,
    pub diff_stats: Option<DiffStats>,
}

/// Write-side file entry (also the wire shape of `files_changed` items)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFileEntry {
    #[serde(alias = "filePath")]
    pub file_path: String,
    #[serde(default, alias = "changeType")]
    pub change_type: Option<ChangeType>,
    #[serde(default, alias = "lineRanges")]
    pub line_ranges: Vec<(i64, i64)>,
    #[serde(default, alias = "diffStats")]
    pub diff_stats: Option<DiffStats>,
}

impl ContextFileEntry {
    /// Validate line ranges: `start <= end`, pairs strictly increasing.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut prev_end: Option<i64> = None;
        for &(start, end) in &self.line_ranges {
            if start > end {
                return Err(format!(
                    "line range [{start}, {end}] in {} has start > end",
                    self.file_path
                ));
            }
            if let Some(prev) = prev_end {
                if start <= prev {
                    return Err(format!(
                        "line ranges in {} must be strictly increasing",
                        self.file_path
                    ));
                }
            }
            prev_end = Some(end);
        }
        Ok(())
    }
}

// ============================================================================
// FILE INDEX
// ============================================================================

/// Indexed source file from the codebase tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIndexEntry {
    pub id: String,
    pub session_id: String,
    pub project_id: String,
    pub file_path: String,
    pub content: String,
    pub tags: Vec<String>,
    pub indexed_at: DateTime<Utc>,
    pub modified_time: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub has_embedding: bool,
}

/// Write-side file-index row
#[derive(Debug, Clone)]
pub struct NewFileIndexEntry {
    pub session_id: String,
    pub project_id: String,
    pub file_path: String,
    pub content: String,
    pub tags: Vec<String>,
    pub modified_time: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

// ============================================================================
// RELATIONSHIPS
// ============================================================================

/// Directed edge between two contexts. Cycles are allowed and are
/// never traversed transitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: i64,
    pub from_context_id: String,
    pub to_context_id: String,
    pub relation_type: super::kinds::RelationType,
    /// Clamped to [0, 1]
    pub strength: f64,
}

// ============================================================================
// STATS
// ============================================================================

/// Aggregate counters for observability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_projects: i64,
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub total_contexts: i64,
    pub contexts_with_embeddings: i64,
    pub total_context_files: i64,
    pub total_indexed_files: i64,
    pub total_relationships: i64,
    pub oldest_context: Option<DateTime<Utc>>,
    pub newest_context: Option<DateTime<Utc>>,
    pub database_size_bytes: Option<i64>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_range_validation() {
        let mut entry = ContextFileEntry {
            file_path: "src/auth.ts".into(),
            change_type: Some(ChangeType::Modify),
            line_ranges: vec![(1, 10), (20, 25)],
            diff_stats: None,
        };
        assert!(entry.validate().is_ok());

        entry.line_ranges = vec![(10, 5)];
        assert!(entry.validate().unwrap_err().contains("start > end"));

        entry.line_ranges = vec![(1, 10), (5, 20)];
        assert!(entry.validate().unwrap_err().contains("strictly increasing"));
    }

    #[test]
    fn test_diff_stats_merge() {
        let mut total = DiffStats::default();
        total.merge(&DiffStats { additions: 3, deletions: 1, changes: 4 });
        total.merge(&DiffStats { additions: 2, deletions: 0, changes: 2 });
        assert_eq!(total.additions, 5);
        assert_eq!(total.deletions, 1);
        assert_eq!(total.changes, 6);
    }

    #[test]
    fn test_context_patch_emptiness() {
        assert!(ContextPatch::default().is_empty());
        let patch = ContextPatch {
            content: Some("new".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_files_changed_wire_shape() {
        // The shape hosts send in record_context.files_changed
        let entry: ContextFileEntry = serde_json::from_str(
            r#"{"file_path": "a.ts", "change_type": "modify", "diff_stats": {"additions": 3, "deletions": 1, "changes": 4}}"#,
        )
        .unwrap();
        assert_eq!(entry.change_type, Some(ChangeType::Modify));
        assert_eq!(entry.diff_stats.unwrap().additions, 3);

        // camelCase aliases are accepted too
        let entry: ContextFileEntry =
            serde_json::from_str(r#"{"filePath": "b.ts", "changeType": "add"}"#).unwrap();
        assert_eq!(entry.change_type, Some(ChangeType::Add));
    }
}
