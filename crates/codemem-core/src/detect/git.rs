//! Git workspace detection.
//!
//! Shells out to `git` with captured output and a hard 2-second
//! timeout per call. Results are cached per project path for one
//! 30-second window; non-repositories cache a `None` so repeated
//! ingests don't pay the subprocess cost. Detection never errors
//! outward: every failure degrades to `"unknown"` fields or an empty
//! change list.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Subprocess upper bound; a timeout counts as an empty result.
const GIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache window width in milliseconds.
const CACHE_WINDOW_MS: i64 = 30_000;

/// Snapshot of a project's git state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    pub changed_files: Vec<String>,
    pub branch: String,
    pub author: String,
    pub has_uncommitted: bool,
}

/// Detector with a per-path, 30-second-window cache
pub struct GitDetector {
    cache: Mutex<HashMap<String, (i64, Option<GitInfo>)>>,
}

impl Default for GitDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GitDetector {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn current_window() -> i64 {
        chrono::Utc::now().timestamp_millis() / CACHE_WINDOW_MS
    }

    /// Detect git state for `project_path`. Returns `None` for
    /// non-repositories.
    pub async fn detect(&self, project_path: &Path) -> Option<GitInfo> {
        let key = project_path.to_string_lossy().to_string();
        let window = Self::current_window();

        if let Ok(cache) = self.cache.lock() {
            if let Some((cached_window, info)) = cache.get(&key) {
                if *cached_window == window {
                    return info.clone();
                }
            }
        }

        let info = self.probe(project_path).await;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, (window, info.clone()));
        }

        info
    }

    async fn probe(&self, path: &Path) -> Option<GitInfo> {
        // Non-repositories are a cached miss, not an error
        run_git(path, &["rev-parse", "--git-dir"]).await?;

        let branch = match run_git(path, &["branch", "--show-current"]).await {
            Some(name) if !name.is_empty() => name,
            Some(_) => {
                // Detached HEAD: name the commit instead
                match run_git(path, &["rev-parse", "--short", "HEAD"]).await {
                    Some(sha) if !sha.is_empty() => format!("detached@{sha}"),
                    _ => "unknown".to_string(),
                }
            }
            None => "unknown".to_string(),
        };

        let author = run_git(path, &["config", "user.name"])
            .await
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let mut changed_files: Vec<String> = Vec::new();
        for args in [
            &["diff", "--name-only", "HEAD"][..],
            &["diff", "--cached", "--name-only"][..],
        ] {
            if let Some(output) = run_git(path, args).await {
                for line in output.lines() {
                    let line = line.trim();
                    if !line.is_empty() && !changed_files.iter().any(|f| f == line) {
                        changed_files.push(line.to_string());
                    }
                }
            }
        }

        let has_uncommitted = !changed_files.is_empty();

        Some(GitInfo {
            changed_files,
            branch,
            author,
            has_uncommitted,
        })
    }
}

/// Run one git subcommand with captured output. Any failure (missing
/// binary, non-zero exit, timeout, bad UTF-8) yields `None`.
async fn run_git(cwd: &Path, args: &[&str]) -> Option<String> {
    let future = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(GIT_TIMEOUT, future).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::debug!("git {:?} failed to spawn: {}", args, e);
            return None;
        }
        Err(_) => {
            tracing::debug!("git {:?} timed out after {:?}", args, GIT_TIMEOUT);
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_non_repository_detects_as_none() {
        let dir = TempDir::new().unwrap();
        let detector = GitDetector::new();
        assert!(detector.detect(dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn test_non_repository_result_is_cached() {
        let dir = TempDir::new().unwrap();
        let detector = GitDetector::new();
        detector.detect(dir.path()).await;

        let cache = detector.cache.lock().unwrap();
        let key = dir.path().to_string_lossy().to_string();
        let entry = cache.get(&key).expect("miss should be cached");
        assert!(entry.1.is_none());
    }

    #[tokio::test]
    async fn test_missing_directory_is_harmless() {
        let detector = GitDetector::new();
        assert!(
            detector
                .detect(Path::new("/definitely/not/a/real/path"))
                .await
                .is_none()
        );
    }

    #[test]
    fn test_window_quantization() {
        let a = GitDetector::current_window();
        let b = GitDetector::current_window();
        // Two immediate reads land in the same 30s window
        assert!(b - a <= 1);
    }
}
