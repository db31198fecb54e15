//! MCP server core.
//!
//! Routes JSON-RPC requests to the tool handlers. Tool-level failures
//! become `isError=true` results; only transport-shape problems map to
//! JSON-RPC errors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools;
use codemem_core::MemoryService;

/// MCP server state
pub struct McpServer {
    service: Arc<MemoryService>,
    initialized: bool,
}

impl McpServer {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self {
            service,
            initialized: false,
        }
    }

    /// Handle one request; `None` means a notification with no reply.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's protocol revision when it is older than ours
        let negotiated = if request.protocol_version.as_str() < PROTOCOL_VERSION {
            request.protocol_version.clone()
        } else {
            PROTOCOL_VERSION.to_string()
        };

        self.initialized = true;
        info!("session initialized with protocol version {}", negotiated);

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "codemem".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: None,
                prompts: None,
            },
            instructions: Some(
                "Codemem is the developer's long-term memory. record_context stores code \
                 changes, fixes, and decisions per project and session; semantic_search \
                 answers questions about past work with hybrid vector + keyword + metadata \
                 ranking. Duplicate detection is advisory only - existing records are never \
                 modified automatically."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "create_session".to_string(),
                description: Some(
                    "Open a new development session for a project. Sessions group recorded \
                     contexts; most callers can skip this and let record_context reuse the \
                     main session."
                        .to_string(),
                ),
                input_schema: tools::session::create_schema(),
            },
            ToolDescription {
                name: "record_context".to_string(),
                description: Some(
                    "Record a development artifact (code change, bug fix, design note...). \
                     Auto-classifies generic types, enriches with git/project metadata, \
                     flags likely duplicates, and embeds asynchronously. Conversation and \
                     error content is skipped unless force_remember is set."
                        .to_string(),
                ),
                input_schema: tools::record::schema(),
            },
            ToolDescription {
                name: "manage_session".to_string(),
                description: Some(
                    "End and/or delete sessions by session_id or project_id. Deleting \
                     cascades to the session's contexts and their file rows."
                        .to_string(),
                ),
                input_schema: tools::session::manage_schema(),
            },
            ToolDescription {
                name: "get_current_session".to_string(),
                description: Some("Return the project's most recent active session.".to_string()),
                input_schema: tools::session::current_schema(),
            },
            ToolDescription {
                name: "list_projects".to_string(),
                description: Some(
                    "List known projects with session and context counts.".to_string(),
                ),
                input_schema: tools::projects::list_schema(),
            },
            ToolDescription {
                name: "get_context".to_string(),
                description: Some(
                    "Fetch contexts by id (single or list), or pivot to directly related \
                     contexts with relation_type."
                        .to_string(),
                ),
                input_schema: tools::contexts::get_schema(),
            },
            ToolDescription {
                name: "semantic_search".to_string(),
                description: Some(
                    "Hybrid semantic search over recorded contexts and indexed code. \
                     Combines vector similarity, a keyword baseline, and metadata relevance \
                     (files, project, tags, recency); every result carries its full score \
                     breakdown."
                        .to_string(),
                ),
                input_schema: tools::search::schema(),
            },
            ToolDescription {
                name: "list_contexts".to_string(),
                description: Some(
                    "Chronological context listing. Requires at least one scope: \
                     session_id, project_path, since, or type."
                        .to_string(),
                ),
                input_schema: tools::contexts::list_schema(),
            },
            ToolDescription {
                name: "delete_context".to_string(),
                description: Some("Delete one context and its file rows.".to_string()),
                input_schema: tools::contexts::delete_schema(),
            },
            ToolDescription {
                name: "update_context".to_string(),
                description: Some(
                    "Partially update a context (content, tags, type, quality, metadata). \
                     The stored embedding is left untouched."
                        .to_string(),
                ),
                input_schema: tools::contexts::update_schema(),
            },
            ToolDescription {
                name: "export_memory_graph".to_string(),
                description: Some(
                    "Export contexts and their relationships as JSON nodes and edges."
                        .to_string(),
                ),
                input_schema: tools::status::graph_schema(),
            },
            ToolDescription {
                name: "get_memory_status".to_string(),
                description: Some(
                    "Database and embedding-provider statistics.".to_string(),
                ),
                input_schema: tools::status::status_schema(),
            },
            ToolDescription {
                name: "cleanup_empty_projects".to_string(),
                description: Some(
                    "Remove projects with no recorded contexts. Defaults to dry_run=true."
                        .to_string(),
                ),
                input_schema: tools::projects::cleanup_schema(),
            },
            ToolDescription {
                name: "codebase".to_string(),
                description: Some(
                    "Index a project's source files for retrieval (action='index'), or \
                     report the index size (action='status'). Indexed files participate in \
                     semantic_search as code pseudo-contexts."
                        .to_string(),
                ),
                input_schema: tools::codebase::schema(),
            },
            ToolDescription {
                name: "delete_codebase_index".to_string(),
                description: Some("Drop a project's indexed files.".to_string()),
                input_schema: tools::codebase::delete_schema(),
            },
        ];

        serde_json::to_value(ListToolsResult { tools })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let service = &self.service;
        let args = request.arguments;
        let result = match request.name.as_str() {
            "create_session" => tools::session::execute_create(service, args).await,
            "record_context" => tools::record::execute(service, args).await,
            "manage_session" => tools::session::execute_manage(service, args).await,
            "get_current_session" => tools::session::execute_current(service, args).await,
            "list_projects" => tools::projects::execute_list(service, args).await,
            "get_context" => tools::contexts::execute_get(service, args).await,
            "semantic_search" => tools::search::execute(service, args).await,
            "list_contexts" => tools::contexts::execute_list(service, args).await,
            "delete_context" => tools::contexts::execute_delete(service, args).await,
            "update_context" => tools::contexts::execute_update(service, args).await,
            "export_memory_graph" => tools::status::execute_graph(service, args).await,
            "get_memory_status" => tools::status::execute_status(service, args).await,
            "cleanup_empty_projects" => tools::projects::execute_cleanup(service, args).await,
            "codebase" => tools::codebase::execute(service, args).await,
            "delete_codebase_index" => tools::codebase::execute_delete(service, args).await,
            unknown => {
                warn!("unknown tool: {}", unknown);
                Err(format!("Unknown tool: {unknown}"))
            }
        };

        // Argument-shape problems become isError results, keeping the
        // JSON-RPC layer for transport faults only
        let call_result = match result {
            Ok(r) => r,
            Err(message) => CallToolResult::error(message),
        };
        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
