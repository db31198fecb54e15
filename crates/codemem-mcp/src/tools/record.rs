//! record_context tool.
//!
//! Thin wrapper over the engine's ingestion pipeline; the interesting
//! behavior (enrichment, classification, tiering, async embedding)
//! lives in codemem-core.

use serde_json::{Value, json};
use std::sync::Arc;

use super::engine_error;
use crate::protocol::messages::CallToolResult;
use codemem_core::{MemoryService, RecordContextInput};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The development artifact to remember (code, fix notes, design...)"
            },
            "project_path": {
                "type": "string",
                "description": "Path inside the project; resolved to the project root"
            },
            "session_id": {
                "type": "string",
                "description": "Record into this session instead of the active/main one"
            },
            "type": {
                "type": "string",
                "description": "Context type; generic 'code'/'conversation' may be auto-classified",
                "enum": [
                    "code", "conversation", "error", "solution", "documentation", "test",
                    "configuration", "commit", "code_create", "code_modify", "code_delete",
                    "code_refactor", "code_optimize", "bug_fix", "bug_report", "feature_add",
                    "feature_update", "feature_remove", "design", "learning"
                ]
            },
            "file_path": {
                "type": "string",
                "description": "Single affected file (use files_changed for multi-file work)"
            },
            "files_changed": {
                "type": "array",
                "description": "Per-file change entries",
                "items": {
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string" },
                        "change_type": {
                            "type": "string",
                            "enum": ["add", "modify", "delete", "refactor", "rename"]
                        },
                        "line_ranges": {
                            "type": "array",
                            "items": { "type": "array", "items": { "type": "integer" } }
                        },
                        "diff_stats": {
                            "type": "object",
                            "properties": {
                                "additions": { "type": "integer" },
                                "deletions": { "type": "integer" },
                                "changes": { "type": "integer" }
                            }
                        }
                    },
                    "required": ["file_path"]
                }
            },
            "line_ranges": {
                "type": "array",
                "description": "Inclusive [start, end] pairs within file_path",
                "items": { "type": "array", "items": { "type": "integer" } }
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" }
            },
            "metadata": {
                "type": "object",
                "description": "Free-form metadata; well-known keys are merged, unknown keys pass through"
            },
            "change_type": {
                "type": "string",
                "enum": ["add", "modify", "delete", "refactor", "rename"]
            },
            "impact_level": {
                "type": "string",
                "enum": ["low", "medium", "high", "critical"]
            },
            "related_files": {
                "type": "array",
                "items": { "type": "string" }
            },
            "priority": { "type": "string" },
            "diff_stats": {
                "type": "object",
                "properties": {
                    "additions": { "type": "integer" },
                    "deletions": { "type": "integer" },
                    "changes": { "type": "integer" }
                }
            },
            "force_remember": {
                "type": "boolean",
                "description": "Store even skip-tier content (conversation, error)",
                "default": false
            }
        },
        "required": ["content", "project_path"]
    })
}

pub async fn execute(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let input: RecordContextInput = super::parse_args(args)?;

    match service.record_context(input).await {
        Ok(outcome) => {
            let structured = serde_json::to_value(&outcome)
                .map_err(|e| format!("Failed to serialize outcome: {e}"))?;
            Ok(CallToolResult::text(outcome.message.clone())
                .with_structured(structured)
                .with_meta(json!({
                    "tier": outcome.tier,
                    "stored": outcome.stored,
                })))
        }
        Err(e) => Ok(engine_error(&e)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{project_dir, test_service};

    #[tokio::test]
    async fn test_record_basic() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);

        let result = execute(
            &service,
            Some(json!({"content": "Initial commit", "project_path": path})),
        )
        .await
        .unwrap();

        assert!(!result.is_error);
        let text = result.first_text().to_string();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["stored"], true);
        let context_id = structured["contextId"].as_str().unwrap();
        assert!(text.contains(context_id));
    }

    #[tokio::test]
    async fn test_record_duplicate_content_never_merges() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);

        for _ in 0..2 {
            let result = execute(
                &service,
                Some(json!({"content": "fixed the flaky retry test", "project_path": path})),
            )
            .await
            .unwrap();
            assert!(!result.is_error);
        }
        // Two distinct rows: similarity advisories never auto-merge
        assert_eq!(service.db().stats().unwrap().total_contexts, 2);
    }

    #[tokio::test]
    async fn test_record_missing_content_is_invalid() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);
        let result = execute(&service, Some(json!({"content": "", "project_path": path})))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.meta.unwrap()["errorKind"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_record_missing_arguments() {
        let (service, _dir) = test_service();
        assert!(execute(&service, None).await.is_err());
    }

    #[tokio::test]
    async fn test_multi_file_response_lists_files() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);

        let result = execute(
            &service,
            Some(json!({
                "content": "refactor",
                "project_path": path,
                "type": "code_refactor",
                "files_changed": [
                    {"file_path": "a.ts", "change_type": "modify",
                     "diff_stats": {"additions": 3, "deletions": 1, "changes": 4}},
                    {"file_path": "b.ts", "change_type": "modify"}
                ]
            })),
        )
        .await
        .unwrap();

        assert!(!result.is_error);
        assert!(result.first_text().contains("a.ts"));
        assert!(result.first_text().contains("b.ts"));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["files"].as_array().unwrap().len(), 2);
    }
}
