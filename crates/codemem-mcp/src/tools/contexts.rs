//! Context tools: get_context, list_contexts, update_context,
//! delete_context.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use super::{engine_error, parse_args};
use crate::protocol::messages::CallToolResult;
use codemem_core::{
    ContextFilter, ContextPatch, ContextType, MemoryService, RelationType, extract, resolver,
};

// ============================================================================
// get_context
// ============================================================================

pub fn get_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "context_ids": {
                "description": "One id or a list of ids",
                "oneOf": [
                    { "type": "string" },
                    { "type": "array", "items": { "type": "string" } }
                ]
            },
            "relation_type": {
                "type": "string",
                "enum": ["depends_on", "related_to", "fixes", "implements", "tests", "documents"],
                "description": "Pivot to directly related contexts instead of the ids themselves"
            }
        },
        "required": ["context_ids"]
    })
}

#[derive(Debug, Deserialize)]
struct GetContextArgs {
    context_ids: Value,
    #[serde(default)]
    relation_type: Option<String>,
}

pub async fn execute_get(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: GetContextArgs = parse_args(args)?;

    let ids: Vec<String> = match args.context_ids {
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => return Err("context_ids must be a string or an array of strings".to_string()),
    };
    if ids.is_empty() {
        return Err("context_ids must not be empty".to_string());
    }

    let relation_type = match args.relation_type.as_deref() {
        Some(raw) => match RelationType::try_parse(raw) {
            Some(rt) => Some(rt),
            None => return Err(format!("Unknown relation_type '{raw}'")),
        },
        None => None,
    };

    let db = service.db();

    // Pivot mode: direct edges only, never transitive
    if let Some(relation_type) = relation_type {
        let mut related = Vec::new();
        for id in &ids {
            let edges = match db.related_contexts(id, Some(relation_type)) {
                Ok(e) => e,
                Err(e) => return Ok(engine_error(&e)),
            };
            for edge in edges {
                if let Ok(Some(target)) = db.get_context(&edge.to_context_id) {
                    related.push(json!({
                        "from": edge.from_context_id,
                        "relationType": edge.relation_type.as_str(),
                        "strength": edge.strength,
                        "context": target,
                    }));
                }
            }
        }
        return Ok(CallToolResult::text(format!(
            "{} related context(s) via '{}'",
            related.len(),
            relation_type.as_str()
        ))
        .with_structured(json!({"related": related})));
    }

    let mut found = Vec::new();
    let mut missing = Vec::new();
    for id in &ids {
        match db.get_context(id) {
            Ok(Some(context)) => {
                let files = db.context_files(id).unwrap_or_default();
                found.push(json!({"context": context, "files": files}));
            }
            Ok(None) => missing.push(id.clone()),
            Err(e) => return Ok(engine_error(&e)),
        }
    }

    if found.is_empty() {
        return Ok(
            CallToolResult::error(format!("No contexts found for ids: {}", missing.join(", ")))
                .with_meta(json!({"errorKind": "not_found"})),
        );
    }

    Ok(CallToolResult::text(format!(
        "{} context(s) retrieved{}",
        found.len(),
        if missing.is_empty() {
            String::new()
        } else {
            format!(", {} missing", missing.len())
        }
    ))
    .with_structured(json!({"contexts": found, "missing": missing})))
}

// ============================================================================
// list_contexts
// ============================================================================

pub fn list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": { "type": "string" },
            "project_path": { "type": "string" },
            "since": {
                "type": "string",
                "description": "RFC3339 timestamp lower bound"
            },
            "type": {
                "type": "string",
                "description": "Filter to one context type"
            },
            "limit": {
                "type": "integer",
                "default": 50,
                "minimum": 1,
                "maximum": 500
            }
        },
        "description": "At least one of session_id, project_path, since, or type is required"
    })
}

#[derive(Debug, Deserialize)]
struct ListContextsArgs {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    since: Option<String>,
    #[serde(default, rename = "type")]
    context_type: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

pub async fn execute_list(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: ListContextsArgs = parse_args(args)?;

    let since = match args.since.as_deref() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("Invalid 'since' timestamp: {e}"))?,
        ),
        None => None,
    };
    let context_type = match args.context_type.as_deref() {
        Some(raw) => match ContextType::try_parse(raw) {
            Some(t) => Some(t),
            None => return Err(format!("Unknown context type '{raw}'")),
        },
        None => None,
    };

    let project_id = match args.project_path.as_deref() {
        Some(path) => {
            let root = resolver::find_project_root(Path::new(path));
            let canonical = resolver::canonicalize_path(&root);
            match service.db().get_project_by_path(&canonical) {
                Ok(Some(project)) => Some(project.id),
                Ok(None) => {
                    return Ok(CallToolResult::text(format!(
                        "No project recorded at {canonical}"
                    ))
                    .with_structured(json!({"contexts": []})));
                }
                Err(e) => return Ok(engine_error(&e)),
            }
        }
        None => None,
    };

    let filter = ContextFilter {
        session_id: args.session_id,
        project_id,
        since,
        context_type,
        limit: Some(args.limit.unwrap_or(50).clamp(1, 500)),
    };
    if !filter.has_scope() {
        return Err(
            "At least one scope is required: session_id, project_path, since, or type".to_string(),
        );
    }

    let contexts = match service.db().list_contexts(&filter) {
        Ok(c) => c,
        Err(e) => return Ok(engine_error(&e)),
    };

    let items: Vec<Value> = contexts
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "sessionId": c.session_id,
                "type": c.context_type,
                "preview": extract::preview(&c.content, 200),
                "filePath": c.file_path,
                "tags": c.tags,
                "qualityScore": c.quality_score,
                "createdAt": c.created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(CallToolResult::text(format!("{} context(s) in scope", items.len()))
        .with_structured(json!({"contexts": items})))
}

// ============================================================================
// update_context
// ============================================================================

pub fn update_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "context_id": { "type": "string" },
            "content": { "type": "string" },
            "type": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "quality_score": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "metadata": { "type": "object" },
            "file_path": { "type": ["string", "null"] }
        },
        "required": ["context_id"]
    })
}

#[derive(Debug, Deserialize)]
struct UpdateContextArgs {
    context_id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type")]
    context_type: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    quality_score: Option<f64>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default, with = "double_option")]
    file_path: Option<Option<String>>,
}

/// Distinguishes "field absent" from an explicit `"file_path": null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }
}

pub async fn execute_update(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: UpdateContextArgs = parse_args(args)?;

    let context_type = match args.context_type.as_deref() {
        Some(raw) => match ContextType::try_parse(raw) {
            Some(t) => Some(t),
            None => return Err(format!("Unknown context type '{raw}'")),
        },
        None => None,
    };

    let patch = ContextPatch {
        context_type,
        content: args.content,
        tags: args.tags,
        quality_score: args.quality_score,
        metadata: args.metadata,
        file_path: args.file_path,
    };
    if patch.is_empty() {
        return Err("Nothing to update: provide at least one field".to_string());
    }

    match service.db().update_context(&args.context_id, &patch) {
        Ok(context) => Ok(CallToolResult::text(format!(
            "Updated context {}. The stored embedding was not refreshed.",
            context.id
        ))
        .with_structured(json!({"context": context}))),
        Err(e) => Ok(engine_error(&e)),
    }
}

// ============================================================================
// delete_context
// ============================================================================

pub fn delete_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "context_id": { "type": "string" }
        },
        "required": ["context_id"]
    })
}

#[derive(Debug, Deserialize)]
struct DeleteContextArgs {
    context_id: String,
}

pub async fn execute_delete(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: DeleteContextArgs = parse_args(args)?;

    match service.db().delete_context(&args.context_id) {
        Ok(true) => Ok(CallToolResult::text(format!(
            "Deleted context {} (file rows cascade).",
            args.context_id
        ))
        .with_structured(json!({"deleted": true}))),
        Ok(false) => Ok(
            CallToolResult::error(format!("Context not found: {}", args.context_id))
                .with_meta(json!({"errorKind": "not_found"})),
        ),
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
    use codemem_core::RecordContextInput;

    async fn seed(service: &Arc<MemoryService>, path: &str, content: &str) -> String {
        service
            .record_context(RecordContextInput {
                content: content.into(),
                project_path: path.into(),
                context_type: Some("bug_fix".into()),
                ..Default::default()
            })
            .await
            .unwrap()
            .context_id
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_single_and_multiple() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);
        let a = seed(&service, &path, "fix one").await;
        let b = seed(&service, &path, "fix two").await;

        let single = execute_get(&service, Some(json!({"context_ids": a})))
            .await
            .unwrap();
        assert!(!single.is_error);

        let multiple = execute_get(&service, Some(json!({"context_ids": [a, b, "missing"]})))
            .await
            .unwrap();
        assert!(!multiple.is_error);
        let structured = multiple.structured_content.unwrap();
        assert_eq!(structured["contexts"].as_array().unwrap().len(), 2);
        assert_eq!(structured["missing"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_relation_pivot_is_direct_only() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);
        let a = seed(&service, &path, "bug in parser").await;
        let b = seed(&service, &path, "parser fix").await;
        let c = seed(&service, &path, "test for parser fix").await;

        // b fixes a; c tests b. Pivoting from b over 'fixes' sees only a.
        service
            .db()
            .add_relationship(&b, &a, RelationType::Fixes, 0.9)
            .unwrap();
        service
            .db()
            .add_relationship(&c, &b, RelationType::Tests, 0.8)
            .unwrap();

        let result = execute_get(
            &service,
            Some(json!({"context_ids": b, "relation_type": "fixes"})),
        )
        .await
        .unwrap();
        let related = result.structured_content.unwrap()["related"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0]["context"]["id"].as_str().unwrap(), a);
    }

    #[tokio::test]
    async fn test_get_all_missing_is_not_found() {
        let (service, _dir) = test_service();
        let result = execute_get(&service, Some(json!({"context_ids": ["nope"]})))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.meta.unwrap()["errorKind"], "not_found");
    }

    #[tokio::test]
    async fn test_list_requires_scope() {
        let (service, _dir) = test_service();
        assert!(execute_list(&service, Some(json!({}))).await.is_err());
    }

    #[tokio::test]
    async fn test_list_by_project_chronological() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);
        seed(&service, &path, "first fix").await;
        seed(&service, &path, "second fix").await;

        let result = execute_list(&service, Some(json!({"project_path": path})))
            .await
            .unwrap();
        let contexts = result.structured_content.unwrap()["contexts"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(contexts.len(), 2);
        assert!(contexts[0]["preview"].as_str().unwrap().contains("first"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);
        let id = seed(&service, &path, "original").await;

        let updated = execute_update(
            &service,
            Some(json!({"context_id": id, "content": "rewritten", "tags": ["auth"]})),
        )
        .await
        .unwrap();
        assert!(!updated.is_error);
        assert!(updated.first_text().contains("not refreshed"));

        let context = service.db().get_context(&id).unwrap().unwrap();
        assert_eq!(context.content, "rewritten");

        let deleted = execute_delete(&service, Some(json!({"context_id": id})))
            .await
            .unwrap();
        assert!(!deleted.is_error);
        assert!(service.db().get_context(&id).unwrap().is_none());

        let again = execute_delete(&service, Some(json!({"context_id": id})))
            .await
            .unwrap();
        assert!(again.is_error);
    }

    #[tokio::test]
    async fn test_update_with_no_fields_is_rejected() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);
        let id = seed(&service, &path, "content").await;
        assert!(
            execute_update(&service, Some(json!({"context_id": id})))
                .await
                .is_err()
        );
    }
}
