//! Project tools: list_projects, cleanup_empty_projects.

use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::engine_error;
use crate::protocol::messages::CallToolResult;
use codemem_core::MemoryService;

// ============================================================================
// list_projects
// ============================================================================

pub fn list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": {
                "type": "integer",
                "default": 50,
                "minimum": 1,
                "maximum": 500
            }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
struct ListProjectsArgs {
    #[serde(default)]
    limit: Option<i64>,
}

pub async fn execute_list(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: ListProjectsArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => ListProjectsArgs::default(),
    };

    let projects = match service
        .db()
        .list_projects(args.limit.unwrap_or(50).clamp(1, 500))
    {
        Ok(p) => p,
        Err(e) => return Ok(engine_error(&e)),
    };

    let mut text = format!("{} project(s)", projects.len());
    for summary in projects.iter().take(10) {
        text.push_str(&format!(
            "\n- {} ({}): {} session(s), {} context(s)",
            summary.project.name,
            summary.project.path,
            summary.session_count,
            summary.context_count
        ));
    }

    Ok(CallToolResult::text(text).with_structured(json!({"projects": projects})))
}

// ============================================================================
// cleanup_empty_projects
// ============================================================================

pub fn cleanup_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dry_run": {
                "type": "boolean",
                "description": "Only list removable projects (default true)",
                "default": true
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct CleanupArgs {
    #[serde(default = "default_dry_run")]
    dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}

pub async fn execute_cleanup(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: CleanupArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => CleanupArgs { dry_run: true },
    };

    let empty = match service.db().empty_projects() {
        Ok(p) => p,
        Err(e) => return Ok(engine_error(&e)),
    };
    let ids: Vec<String> = empty.iter().map(|p| p.id.clone()).collect();

    if args.dry_run {
        return Ok(CallToolResult::text(format!(
            "{} empty project(s) would be removed (dry run).",
            ids.len()
        ))
        .with_structured(json!({
            "dryRun": true,
            "projects": empty,
            "projectIds": ids,
        })));
    }

    let deleted = match service.db().delete_projects(&ids) {
        Ok(n) => n,
        Err(e) => return Ok(engine_error(&e)),
    };
    Ok(CallToolResult::text(format!("Removed {deleted} empty project(s)."))
        .with_structured(json!({
            "dryRun": false,
            "deleted": deleted,
            "projectIds": ids,
        })))
}

// ============================================================================
// TESTS
// ============================================================================
