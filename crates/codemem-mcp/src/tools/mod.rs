//! Tool implementations.
//!
//! Each module exposes `schema()` JSON-Schema builders plus
//! `execute*` entry points taking the shared service. Argument-shape
//! problems surface as `Err(String)`; engine failures become
//! `isError=true` results with the error kind in `_meta`.

pub mod codebase;
pub mod contexts;
pub mod projects;
pub mod record;
pub mod search;
pub mod session;
pub mod status;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::protocol::messages::CallToolResult;
use codemem_core::MemoryError;

/// Deserialize tool arguments, rejecting absent or malformed input.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, String> {
    match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}")),
        None => Err("Missing arguments".to_string()),
    }
}

/// Map an engine error into a user-visible failure result.
pub(crate) fn engine_error(error: &MemoryError) -> CallToolResult {
    CallToolResult::error(error.to_string()).with_meta(json!({"errorKind": error.kind()}))
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use codemem_core::{MemoryConfig, MemoryService};
    use tempfile::TempDir;

    /// A service over a throwaway database with vector search off, so
    /// tests run without downloading any model.
    pub fn test_service() -> (Arc<MemoryService>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = MemoryConfig::default();
        config.database_path = Some(dir.path().join("test.db"));
        config.vector_search.enabled = false;
        (Arc::new(MemoryService::new(config).unwrap()), dir)
    }

    /// A project directory inside the temp dir.
    pub fn project_dir(dir: &TempDir) -> String {
        let path = dir.path().join("demoproj");
        std::fs::create_dir_all(&path).unwrap();
        path.to_string_lossy().to_string()
    }
}
