//! Project manifest detection.
//!
//! Resolves `{name, version, description, project_type}` for a
//! project directory by probing well-known manifests. Results are
//! cached permanently per canonical path: project identity does not
//! change within a process lifetime. Detection never errors outward.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Detected project identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    /// `node`, `python`, `rust`, or `unknown`
    pub project_type: String,
}

/// Detector with a permanent per-path cache
pub struct ProjectDetector {
    cache: Mutex<HashMap<String, ProjectInfo>>,
}

impl Default for ProjectDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectDetector {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Detect project info for the directory at `path`.
    pub async fn detect(&self, path: &Path) -> ProjectInfo {
        let key = path.to_string_lossy().to_string();

        if let Ok(cache) = self.cache.lock() {
            if let Some(info) = cache.get(&key) {
                return info.clone();
            }
        }

        let info = probe(path).await;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, info.clone());
        }

        info
    }
}

async fn probe(path: &Path) -> ProjectInfo {
    if let Some(info) = probe_package_json(path).await {
        return info;
    }
    if let Some(info) = probe_pyproject(path).await {
        return info;
    }
    if let Some(info) = probe_cargo(path).await {
        return info;
    }

    ProjectInfo {
        name: basename(path),
        version: None,
        description: None,
        project_type: "unknown".to_string(),
    }
}

async fn probe_package_json(path: &Path) -> Option<ProjectInfo> {
    let raw = tokio::fs::read_to_string(path.join("package.json")).await.ok()?;
    let parsed: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("unparseable package.json in {:?}: {}", path, e);
            return None;
        }
    };
    Some(ProjectInfo {
        name: parsed
            .get("name")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| basename(path)),
        version: parsed.get("version").and_then(|v| v.as_str()).map(String::from),
        description: parsed
            .get("description")
            .and_then(|v| v.as_str())
            .map(String::from),
        project_type: "node".to_string(),
    })
}

async fn probe_pyproject(path: &Path) -> Option<ProjectInfo> {
    let raw = tokio::fs::read_to_string(path.join("pyproject.toml")).await.ok()?;
    Some(ProjectInfo {
        name: toml_field(&raw, "name").unwrap_or_else(|| basename(path)),
        version: toml_field(&raw, "version"),
        description: toml_field(&raw, "description"),
        project_type: "python".to_string(),
    })
}

async fn probe_cargo(path: &Path) -> Option<ProjectInfo> {
    let raw = tokio::fs::read_to_string(path.join("Cargo.toml")).await.ok()?;
    Some(ProjectInfo {
        name: toml_field(&raw, "name").unwrap_or_else(|| basename(path)),
        version: toml_field(&raw, "version"),
        description: toml_field(&raw, "description"),
        project_type: "rust".to_string(),
    })
}

/// Regex extraction of a top-level `key = "value"` TOML field.
fn toml_field(raw: &str, key: &str) -> Option<String> {
    let pattern = format!(r#"(?m)^\s*{key}\s*=\s*"([^"]*)""#);
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// ============================================================================
// TESTS
// ============================================================================
