//! semantic_search tool.

use serde_json::{Value, json};
use std::sync::Arc;

use super::engine_error;
use crate::protocol::messages::CallToolResult;
use codemem_core::{MemoryService, SearchRequest, extract};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Natural-language or keyword query"
            },
            "project_path": {
                "type": "string",
                "description": "Restrict to the project at this path"
            },
            "session_id": {
                "type": "string",
                "description": "Restrict to one session"
            },
            "file_path": {
                "type": "string",
                "description": "Bias results toward contexts touching this file"
            },
            "type": {
                "type": "string",
                "description": "Filter results to one context type"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum results (default 10)",
                "default": 10,
                "minimum": 1,
                "maximum": 50
            },
            "similarity_threshold": {
                "type": "number",
                "description": "Minimum cosine similarity for vector-only hits (default 0.5)",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "hybrid_weight": {
                "type": "number",
                "description": "Weight of the vector score in the hybrid combination (default 0.7)",
                "minimum": 0.0,
                "maximum": 1.0
            }
        },
        "required": ["query"]
    })
}

pub async fn execute(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<CallToolResult, String> {
    let mut request: SearchRequest = super::parse_args(args)?;
    if request.query.trim().is_empty() {
        return Err("Query cannot be empty".to_string());
    }
    request.limit = request.limit.clamp(1, 50);

    let response = match service.semantic_search(request).await {
        Ok(r) => r,
        Err(e) => return Ok(engine_error(&e)),
    };

    let mut text = if let Some(ref message) = response.message {
        message.clone()
    } else {
        format!(
            "{} result(s) for \"{}\" ({} candidates scored)",
            response.results.len(),
            response.original_query,
            response.total_candidates
        )
    };
    for row in response.results.iter().take(5) {
        text.push_str(&format!(
            "\n- [{:.3}] {} ({}): {}",
            row.final_score,
            row.context_id,
            row.context_type,
            extract::preview(&row.content, 80)
        ));
    }

    let structured = serde_json::to_value(&response)
        .map_err(|e| format!("Failed to serialize search response: {e}"))?;
    Ok(CallToolResult::text(text)
        .with_structured(structured)
        .with_meta(json!({
            "originalQuery": response.original_query,
            "enhancedQuery": response.query,
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
    async fn test_empty_query_rejected() {
        let (service, _dir) = test_service();
        assert!(execute(&service, Some(json!({"query": "  "}))).await.is_err());
    }

    #[tokio::test]
    async fn test_unscoped_search_on_empty_store() {
        let (service, _dir) = test_service();
        let result = execute(&service, Some(json!({"query": "auth bug"}))).await.unwrap();
        // Empty candidate set explains itself instead of erroring
        assert!(!result.is_error);
        assert!(result.first_text().contains("record some work"));
    }

    #[tokio::test]
    async fn test_unknown_project_scope_returns_message() {
        let (service, dir) = test_service();
        let _ = project_dir(&dir);
        let result = execute(
            &service,
            Some(json!({"query": "auth bug", "project_path": "/not/recorded/anywhere"})),
        )
        .await
        .unwrap();
        assert!(!result.is_error);
        assert!(result.first_text().contains("no project recorded"));
    }

    #[tokio::test]
    async fn test_search_with_vectors_disabled_is_error() {
        let (service, dir) = test_service();
        let path = project_dir(&dir);

        // Seed one context and give it a vector directly
        let outcome = service
            .record_context(codemem_core::RecordContextInput {
                content: "fixed the auth bug".into(),
                project_path: path.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        service
            .db()
            .update_context_embedding(
                &outcome.context_id.unwrap(),
                &[1.0, 0.0, 0.0],
                "v2",
                "test-model",
            )
            .unwrap();

        let result = execute(&service, Some(json!({"query": "auth bug"}))).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.meta.unwrap()["errorKind"], "embedding_unavailable");
    }
}
