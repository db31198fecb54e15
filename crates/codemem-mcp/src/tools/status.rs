//! Observability tools: get_memory_status, export_memory_graph.

use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::engine_error;
use crate::protocol::messages::CallToolResult;
use codemem_core::MemoryService;

// ============================================================================
// get_memory_status
// ============================================================================

pub fn status_schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute_status(
    service: &Arc<MemoryService>,
    _args: Option<Value>,
) -> Result<CallToolResult, String> {
    let status = match service.status().await {
        Ok(s) => s,
        Err(e) => return Ok(engine_error(&e)),
    };

    let text = format!(
        "{} project(s), {} session(s) ({} active), {} context(s) ({} embedded, {} pending), {} indexed file(s). Embeddings: {}.",
        status.stats.total_projects,
        status.stats.total_sessions,
        status.stats.active_sessions,
        status.stats.total_contexts,
        status.stats.contexts_with_embeddings,
        status.pending_embeddings,
        status.stats.total_indexed_files,
        if !status.embedding_enabled {
            "disabled"
        } else if status.embedding_ready {
            "ready"
        } else {
            "enabled (model not loaded yet)"
        },
    );

    let structured =
        serde_json::to_value(&status).map_err(|e| format!("Failed to serialize status: {e}"))?;
    Ok(CallToolResult::text(text).with_structured(structured))
}

// ============================================================================
// export_memory_graph
// ============================================================================

pub fn graph_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "project_path": {
                "type": "string",
                "description": "Restrict the graph to one project"
            }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
struct GraphArgs {
    #[serde(default)]
    project_path: Option<String>,
}

pub async fn execute_graph(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let args: GraphArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => GraphArgs::default(),
    };

    let graph = match service.export_graph(args.project_path.as_deref()).await {
        Ok(g) => g,
        Err(e) => return Ok(engine_error(&e)),
    };

    let nodes = graph["nodes"].as_array().map(|a| a.len()).unwrap_or(0);
    let edges = graph["edges"].as_array().map(|a| a.len()).unwrap_or(0);
    Ok(CallToolResult::text(format!("Memory graph: {nodes} node(s), {edges} edge(s)."))
        .with_structured(graph))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{project_dir, test_service};
    use codemem_core::{RecordContextInput, RelationType};

    #[tokio::test]
    async fn test_status_on_fresh_store() {
        let (service, _dir) = test_service();
        let result = execute_status(&service, None).await.unwrap();
        assert!(!result.is_error);
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["stats"]["totalContexts"], 0);
        assert_eq!(structured["embeddingEnabled"], false);
    }

    #[tokio::test]
    async fn test_graph_includes_cycles_as_plain_edges() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);

        let mut ids = Vec::new();
        for content in ["fix a", "fix b"] {
            let outcome = service
                .record_context(RecordContextInput {
                    content: content.into(),
                    project_path: path.clone(),
                    context_type: Some("bug_fix".into()),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(outcome.context_id.unwrap());
        }
        // A two-node cycle
        service
            .db()
            .add_relationship(&ids[0], &ids[1], RelationType::RelatedTo, 0.5)
            .unwrap();
        service
            .db()
            .add_relationship(&ids[1], &ids[0], RelationType::RelatedTo, 0.5)
            .unwrap();

        let result = execute_graph(&service, Some(json!({"project_path": path})))
            .await
            .unwrap();
        let graph = result.structured_content.unwrap();
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(graph["edges"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_graph_for_unknown_project_is_not_found() {
        let (service, _dir) = test_service();
        let result = execute_graph(
            &service,
            Some(json!({"project_path": "/nowhere/recorded"})),
        )
        .await
        .unwrap();
        assert!(result.is_error);
    }
}
