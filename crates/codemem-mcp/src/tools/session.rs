//! Session tools: create_session, get_current_session, manage_session.

use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{engine_error, parse_args};
use crate::protocol::messages::CallToolResult;
use codemem_core::MemoryService;

// ============================================================================
// create_session
// ============================================================================

pub fn create_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "project_path": {
                "type": "string",
                "description": "Path inside the project (the root is resolved automatically)"
            },
            "tool_used": {
                "type": "string",
                "description": "Name of the tool driving this session (e.g. 'claude-code')"
            },
            "name": {
                "type": "string",
                "description": "Optional session name"
            },
            "metadata": {
                "type": "object",
                "description": "Arbitrary session metadata"
            }
        },
        "required": ["project_path", "tool_used"]
    })
}

#[derive(Debug, Deserialize)]
struct CreateSessionArgs {
    project_path: String,
    tool_used: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

pub async fn execute_create(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: CreateSessionArgs = parse_args(args)?;

    let project = match service.resolve_project(&args.project_path).await {
        Ok(p) => p,
        Err(e) => return Ok(engine_error(&e)),
    };
    let name = args
        .name
        .unwrap_or_else(|| format!("{} - {}", project.name, args.tool_used));
    let session = match service.db().create_session(
        &project.id,
        &name,
        &args.tool_used,
        args.metadata.unwrap_or_else(|| json!({})),
    ) {
        Ok(s) => s,
        Err(e) => return Ok(engine_error(&e)),
    };

    Ok(CallToolResult::text(format!(
        "Created session {} ({}) for project {}",
        session.id, session.name, project.name
    ))
    .with_structured(json!({
        "session": session,
        "project": project,
    })))
}

// ============================================================================
// get_current_session
// ============================================================================

pub fn current_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "project_path": {
                "type": "string",
                "description": "Path inside the project"
            }
        },
        "required": ["project_path"]
    })
}

#[derive(Debug, Deserialize)]
struct CurrentSessionArgs {
    project_path: String,
}

pub async fn execute_current(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: CurrentSessionArgs = parse_args(args)?;

    match service.current_session(&args.project_path).await {
        Ok(Some((project, session))) => Ok(CallToolResult::text(format!(
            "Active session {} ({}) in project {}",
            session.id, session.name, project.name
        ))
        .with_structured(json!({"session": session, "project": project}))),
        Ok(None) => Ok(CallToolResult::text(
            "No active session for this project. record_context will open one automatically.",
        )
        .with_structured(json!({"session": null}))),
        Err(e) => Ok(engine_error(&e)),
    }
}

// ============================================================================
// manage_session
// ============================================================================

pub fn manage_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["end", "delete", "end_and_delete"],
                "description": "What to do with the targeted session(s)"
            },
            "session_id": {
                "type": "string",
                "description": "Target one session by id"
            },
            "project_id": {
                "type": "string",
                "description": "Target every session of a project"
            }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
struct ManageSessionArgs {
    action: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

pub async fn execute_manage(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: ManageSessionArgs = parse_args(args)?;

    if !matches!(args.action.as_str(), "end" | "delete" | "end_and_delete") {
        return Err(format!(
            "Invalid action '{}'; expected end, delete, or end_and_delete",
            args.action
        ));
    }

    let db = service.db();
    let targets: Vec<String> = match (&args.session_id, &args.project_id) {
        (Some(session_id), _) => {
            match db.get_session(session_id) {
                Ok(Some(s)) => vec![s.id],
                Ok(None) => {
                    return Ok(CallToolResult::error(format!("Session not found: {session_id}"))
                        .with_meta(json!({"errorKind": "not_found"})));
                }
                Err(e) => return Ok(engine_error(&e)),
            }
        }
        (None, Some(project_id)) => match db.sessions_by_project(project_id) {
            Ok(sessions) => sessions.into_iter().map(|s| s.id).collect(),
            Err(e) => return Ok(engine_error(&e)),
        },
        (None, None) => {
            return Err("Either session_id or project_id is required".to_string());
        }
    };

    let mut ended = 0usize;
    let mut deleted = 0usize;
    for id in &targets {
        if matches!(args.action.as_str(), "end" | "end_and_delete") {
            match db.end_session(id) {
                Ok(true) => ended += 1,
                Ok(false) => {}
                Err(e) => return Ok(engine_error(&e)),
            }
        }
        if matches!(args.action.as_str(), "delete" | "end_and_delete") {
            match db.delete_session(id) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => return Ok(engine_error(&e)),
            }
        }
    }

    Ok(CallToolResult::text(format!(
        "Action '{}' applied: {} session(s) ended, {} deleted (contexts and file rows cascade).",
        args.action, ended, deleted
    ))
    .with_structured(json!({
        "action": args.action,
        "targets": targets,
        "ended": ended,
        "deleted": deleted,
    })))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{project_dir, test_service};

    #[tokio::test]
    async fn test_create_and_current_session() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);

        let created = execute_create(
            &service,
            Some(json!({"project_path": path, "tool_used": "test-harness"})),
        )
        .await
        .unwrap();
        assert!(!created.is_error);
        let session_id = created.structured_content.as_ref().unwrap()["session"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let current = execute_current(&service, Some(json!({"project_path": path})))
            .await
            .unwrap();
        assert!(!current.is_error);
        assert_eq!(
            current.structured_content.unwrap()["session"]["id"]
                .as_str()
                .unwrap(),
            session_id
        );
    }

    #[tokio::test]
    async fn test_current_without_session() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);
        let result = execute_current(&service, Some(json!({"project_path": path})))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.structured_content.unwrap()["session"].is_null());
    }

    #[tokio::test]
    async fn test_manage_end_and_delete_cascades() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);

        let created = execute_create(
            &service,
            Some(json!({"project_path": path, "tool_used": "test"})),
        )
        .await
        .unwrap();
        let session_id = created.structured_content.unwrap()["session"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        // Seed contexts into the session
        for i in 0..3 {
            service
                .record_context(codemem_core::RecordContextInput {
                    content: format!("fixed bug number {i}"),
                    project_path: project_dir(&dir),
                    session_id: Some(session_id.clone()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        assert_eq!(service.db().stats().unwrap().total_contexts, 3);

        let result = execute_manage(
            &service,
            Some(json!({"action": "end_and_delete", "session_id": session_id})),
        )
        .await
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(service.db().stats().unwrap().total_contexts, 0);
    }

    #[tokio::test]
    async fn test_manage_requires_target() {
        let (service, _dir) = test_service();
        let err = execute_manage(&service, Some(json!({"action": "end"})))
            .await
            .unwrap_err();
        assert!(err.contains("session_id or project_id"));
    }

    #[tokio::test]
    async fn test_manage_unknown_session() {
        let (service, _dir) = test_service();
        let result = execute_manage(
            &service,
            Some(json!({"action": "delete", "session_id": "missing"})),
        )
        .await
        .unwrap();
        assert!(result.is_error);
    }
}
