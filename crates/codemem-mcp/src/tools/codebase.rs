//! Codebase tools: codebase (index/status), delete_codebase_index.
//!
//! Indexed files live in their own table and join the search candidate
//! set as pseudo-contexts of type `code`; they never appear in user
//! memory listings.

use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use super::{engine_error, parse_args};
use crate::protocol::messages::CallToolResult;
use codemem_core::{MemoryService, resolver};

// ============================================================================
// codebase
// ============================================================================

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "project_path": {
                "type": "string",
                "description": "Path inside the project to index"
            },
            "action": {
                "type": "string",
                "enum": ["index", "status"],
                "default": "index"
            },
            "max_files": {
                "type": "integer",
                "description": "Upper bound on files indexed in one call",
                "default": 500,
                "minimum": 1,
                "maximum": 5000
            }
        },
        "required": ["project_path"]
    })
}

#[derive(Debug, Deserialize)]
struct CodebaseArgs {
    project_path: String,
    #[serde(default = "default_action")]
    action: String,
    #[serde(default = "default_max_files")]
    max_files: usize,
}

fn default_action() -> String {
    "index".to_string()
}

fn default_max_files() -> usize {
    500
}

pub async fn execute(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: CodebaseArgs = parse_args(args)?;

    match args.action.as_str() {
        "index" => {
            let report = match service
                .index_codebase(&args.project_path, args.max_files.clamp(1, 5000))
                .await
            {
                Ok(r) => r,
                Err(e) => return Ok(engine_error(&e)),
            };
            let structured = serde_json::to_value(&report)
                .map_err(|e| format!("Failed to serialize report: {e}"))?;
            Ok(CallToolResult::text(format!(
                "Indexed {} file(s) ({} skipped). Embeddings are generated in the background.",
                report.indexed_files, report.skipped_files
            ))
            .with_structured(structured))
        }
        "status" => {
            let root = resolver::find_project_root(Path::new(&args.project_path));
            let canonical = resolver::canonicalize_path(&root);
            let project = match service.db().get_project_by_path(&canonical) {
                Ok(Some(p)) => p,
                Ok(None) => {
                    return Ok(CallToolResult::text(format!(
                        "No project recorded at {canonical}"
                    ))
                    .with_structured(json!({"indexedFiles": 0})));
                }
                Err(e) => return Ok(engine_error(&e)),
            };
            let count = match service.db().count_file_index(&project.id) {
                Ok(c) => c,
                Err(e) => return Ok(engine_error(&e)),
            };
            Ok(CallToolResult::text(format!(
                "{count} indexed file(s) for project {}",
                project.name
            ))
            .with_structured(json!({
                "projectId": project.id,
                "indexedFiles": count,
            })))
        }
        other => Err(format!("Invalid action '{other}'; expected index or status")),
    }
}

// ============================================================================
// delete_codebase_index
// ============================================================================

pub fn delete_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "project_path": { "type": "string" }
        },
        "required": ["project_path"]
    })
}

#[derive(Debug, Deserialize)]
struct DeleteIndexArgs {
    project_path: String,
}

pub async fn execute_delete(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: DeleteIndexArgs = parse_args(args)?;

    let root = resolver::find_project_root(Path::new(&args.project_path));
    let canonical = resolver::canonicalize_path(&root);
    let project = match service.db().get_project_by_path(&canonical) {
        Ok(Some(p)) => p,
        Ok(None) => {
            return Ok(
                CallToolResult::error(format!("No project recorded at {canonical}"))
                    .with_meta(json!({"errorKind": "not_found"})),
            );
        }
        Err(e) => return Ok(engine_error(&e)),
    };

    match service.db().delete_file_index(&project.id) {
        Ok(deleted) => Ok(CallToolResult::text(format!(
            "Removed {deleted} indexed file(s) for project {}.",
            project.name
        ))
        .with_structured(json!({"deleted": deleted}))),
        Err(e) => Ok(engine_error(&e)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_service;

    fn seed_project_tree(dir: &tempfile::TempDir) -> String {
        let root = dir.path().join("webapp");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        std::fs::write(root.join("src/auth.ts"), "export function hashPassword() {}").unwrap();
        std::fs::write(root.join("src/db.rs"), "pub fn connect() {}").unwrap();
        std::fs::write(root.join("notes.txt"), "not an included extension").unwrap();
        std::fs::write(root.join("node_modules/dep/index.js"), "ignored").unwrap();
        root.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_index_then_status_then_delete() {
        let (service, dir) = test_service();
        let path = seed_project_tree(&dir);

        let indexed = execute(&service, Some(json!({"project_path": path})))
            .await
            .unwrap();
        assert!(!indexed.is_error);
        let report = indexed.structured_content.unwrap();
        assert_eq!(report["indexedFiles"], 2); // auth.ts + db.rs only

        let status = execute(
            &service,
            Some(json!({"project_path": path, "action": "status"})),
        )
        .await
        .unwrap();
        assert_eq!(status.structured_content.unwrap()["indexedFiles"], 2);

        let deleted = execute_delete(&service, Some(json!({"project_path": path})))
            .await
            .unwrap();
        assert_eq!(deleted.structured_content.unwrap()["deleted"], 2);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let (service, dir) = test_service();
        let path = seed_project_tree(&dir);

        execute(&service, Some(json!({"project_path": path}))).await.unwrap();
        execute(&service, Some(json!({"project_path": path}))).await.unwrap();

        let status = execute(
            &service,
            Some(json!({"project_path": path, "action": "status"})),
        )
        .await
        .unwrap();
        // Upserts, not duplicates
        assert_eq!(status.structured_content.unwrap()["indexedFiles"], 2);
    }

    #[tokio::test]
    async fn test_delete_unknown_project() {
        let (service, _dir) = test_service();
        let result = execute_delete(
            &service,
            Some(json!({"project_path": "/nowhere/at/all"})),
        )
        .await
        .unwrap();
        assert!(result.is_error);
    }
}
