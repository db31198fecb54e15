//! The memory service.
//!
//! `MemoryService` owns every engine resource: the database, the
//! embedding provider, both detector caches, and the in-flight
//! background task list. The MCP layer holds it behind an `Arc` and
//! treats every public method as suspending.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::MemoryConfig;
use crate::dedup::{self, DuplicateAdvisory};
use crate::detect::{GitDetector, ProjectDetector};
use crate::embeddings::{EMBEDDING_VERSION, EmbeddingCacheStats, EmbeddingProvider, dot_product};
use crate::error::{MemoryError, Result};
use crate::extract;
use crate::model::{MemoryStats, NewFileIndexEntry, Project, Session};
use crate::resolver;
use crate::search::{
    Candidate, SearchRequest, SearchResponse, SearchResultRow, enhance,
    hybrid::{RankParams, rank},
};
use crate::storage::Database;

/// How many recent contexts a background quality refresh touches.
const QUALITY_REFRESH_BATCH: i64 = 200;
/// Minimum interval between two quality refreshes.
const QUALITY_REFRESH_INTERVAL_HOURS: i64 = 24;

/// Bulk embedding regeneration report. Per-row failures are counted
/// and carried, never thrown.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateReport {
    pub generated: i64,
    pub failed: i64,
    pub skipped: i64,
    pub errors: Vec<String>,
}

/// Codebase indexing report
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub session_id: String,
    pub project_id: String,
}

/// Observability snapshot for `get_memory_status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatus {
    pub stats: MemoryStats,
    pub database_path: String,
    pub database_connected: bool,
    pub embedding_enabled: bool,
    pub embedding_ready: bool,
    pub embedding_version: String,
    pub embedding_cache: EmbeddingCacheStats,
    pub pending_embeddings: usize,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Top-level engine facade
pub struct MemoryService {
    db: Arc<Database>,
    embeddings: Arc<EmbeddingProvider>,
    git: GitDetector,
    project_info: ProjectDetector,
    config: MemoryConfig,
    last_quality_refresh: Mutex<Option<DateTime<Utc>>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryService {
    /// Open the database and construct the engine. The embedding model
    /// stays unloaded until first use.
    pub fn new(config: MemoryConfig) -> Result<Self> {
        let db = Database::open(config.resolve_database_path())?;
        let embeddings = EmbeddingProvider::new(&config.vector_search);
        Ok(Self {
            db: Arc::new(db),
            embeddings: Arc::new(embeddings),
            git: GitDetector::new(),
            project_info: ProjectDetector::new(),
            config,
            last_quality_refresh: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn embeddings(&self) -> &EmbeddingProvider {
        &self.embeddings
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub(crate) fn git_detector(&self) -> &GitDetector {
        &self.git
    }

    pub(crate) fn project_detector(&self) -> &ProjectDetector {
        &self.project_info
    }

    // ========================================================================
    // PROJECT / SESSION RESOLUTION
    // ========================================================================

    /// Canonicalize a caller path, resolve its project root, and
    /// return (or create) the project.
    pub async fn resolve_project(&self, project_path: &str) -> Result<Project> {
        if project_path.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "project_path is required".to_string(),
            ));
        }
        let root = resolver::find_project_root(Path::new(project_path));
        let canonical = resolver::canonicalize_path(&root);

        if let Some(existing) = self.db.get_project_by_path(&canonical)? {
            return Ok(existing);
        }

        let name = resolver::name_from_path(&canonical);
        let language = resolver::infer_primary_language(&root);
        self.db
            .get_or_create_project(&name, &canonical, language.as_deref(), None)
    }

    /// Resolve the working session: an explicit id, else the active
    /// session, else the main session (reactivated), else a fresh
    /// `"<name> - Main Session"`.
    pub async fn resolve_session(
        &self,
        project: &Project,
        session_id: Option<&str>,
        tool_used: &str,
    ) -> Result<Session> {
        if let Some(id) = session_id {
            return self
                .db
                .get_session(id)?
                .ok_or_else(|| MemoryError::NotFound(format!("session {id}")));
        }

        if let Some(active) = self.db.get_active_session(&project.id)? {
            return Ok(active);
        }

        if let Some(main) = self.db.get_main_session(&project.id)? {
            // Reactivation keeps the original id
            if !main.is_active() {
                self.db.reactivate_session(&main.id)?;
            }
            return self
                .db
                .get_session(&main.id)?
                .ok_or_else(|| MemoryError::NotFound(format!("session {}", main.id)));
        }

        self.db.create_session(
            &project.id,
            &format!("{} - Main Session", project.name),
            tool_used,
            json!({}),
        )
    }

    /// Most recent active session for the project at `path`, if any.
    pub async fn current_session(&self, project_path: &str) -> Result<Option<(Project, Session)>> {
        let root = resolver::find_project_root(Path::new(project_path));
        let canonical = resolver::canonicalize_path(&root);
        let Some(project) = self.db.get_project_by_path(&canonical)? else {
            return Ok(None);
        };
        let session = self.db.get_active_session(&project.id)?;
        Ok(session.map(|s| (project, s)))
    }

    // ========================================================================
    // EMBEDDING PLUMBING
    // ========================================================================

    /// Embed text on the blocking pool. Fatal for callers that need
    /// the vector (the search query path).
    pub(crate) async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if !self.embeddings.is_enabled() {
            return Err(MemoryError::EmbeddingUnavailable(
                "vector search is disabled".to_string(),
            ));
        }
        let provider = Arc::clone(&self.embeddings);
        let owned = text.to_string();
        tokio::task::spawn_blocking(move || provider.embed(&owned))
            .await
            .map_err(|e| MemoryError::Init(format!("embedding task panicked: {e}")))?
            .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))
    }

    /// Fire-and-forget embedding persist for a freshly written row.
    /// Failures log and never affect the ingest result; the task is
    /// tracked so shutdown can drain it.
    pub(crate) fn spawn_embedding_task(&self, context_id: String, content: String) {
        if !self.embeddings.is_enabled() || !self.db.is_connected() {
            return;
        }
        let db = Arc::clone(&self.db);
        let provider = Arc::clone(&self.embeddings);
        let model = provider.model_name().to_string();

        let handle = tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || provider.embed(&content)).await;
            let vector = match result {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => {
                    tracing::warn!("embedding for context {} failed: {}", context_id, e);
                    return;
                }
                Err(e) => {
                    tracing::warn!("embedding task for {} panicked: {}", context_id, e);
                    return;
                }
            };
            if !db.is_connected() {
                return; // database closed mid-task; vector is droppable
            }
            if let Err(e) =
                db.update_context_embedding(&context_id, &vector, EMBEDDING_VERSION, &model)
            {
                tracing::warn!("persisting embedding for {} failed: {}", context_id, e);
            }
        });

        self.track_task(handle);
    }

    fn track_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.background_tasks.lock() {
            tasks.retain(|t| !t.is_finished());
            tasks.push(handle);
        }
    }

    /// Bulk regeneration over rows missing vectors. Per-row failures
    /// are collected, not thrown.
    pub async fn regenerate_embeddings(&self, limit: i64) -> Result<RegenerateReport> {
        if !self.embeddings.is_enabled() {
            return Err(MemoryError::EmbeddingUnavailable(
                "vector search is disabled".to_string(),
            ));
        }

        let mut report = RegenerateReport::default();
        let contexts = self.db.contexts_without_embedding(limit)?;
        let files = self.db.file_index_without_embedding(limit)?;
        let model = self.embeddings.model_name().to_string();

        for (id, content, is_file) in contexts
            .into_iter()
            .map(|(id, c)| (id, c, false))
            .chain(files.into_iter().map(|(id, c)| (id, c, true)))
        {
            if content.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            match self.embed_text(&content).await {
                Ok(vector) => {
                    let persisted = if is_file {
                        self.db
                            .update_file_index_embedding(&id, &vector, EMBEDDING_VERSION, &model)
                    } else {
                        self.db
                            .update_context_embedding(&id, &vector, EMBEDDING_VERSION, &model)
                    };
                    match persisted {
                        Ok(()) => report.generated += 1,
                        Err(e) => {
                            report.failed += 1;
                            report.errors.push(format!("{id}: {e}"));
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("{id}: {e}"));
                }
            }
        }

        Ok(report)
    }

    // ========================================================================
    // DUPLICATE ADVISORY
    // ========================================================================

    /// Best-effort constrained search for near-duplicates of `content`
    /// within the project. Every failure path returns `None`.
    pub(crate) async fn check_duplicate(
        &self,
        project_id: &str,
        content: &str,
    ) -> Option<DuplicateAdvisory> {
        if !self.embeddings.is_enabled() {
            return None;
        }
        let query_vector = match self.embed_text(content).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("duplicate check skipped: {}", e);
                return None;
            }
        };
        let candidates = match self.db.contexts_for_vector_search(Some(project_id), None) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("duplicate check skipped: {}", e);
                return None;
            }
        };

        let mut matches: Vec<(f64, &Candidate)> = candidates
            .iter()
            .filter_map(|c| {
                let v = c.vector.as_deref()?;
                let similarity = dot_product(&query_vector, v) as f64;
                (similarity >= dedup::SEARCH_THRESHOLD).then_some((similarity, c))
            })
            .collect();
        matches.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(dedup::SEARCH_LIMIT);

        dedup::evaluate(&matches, Utc::now())
    }

    // ========================================================================
    // SEMANTIC SEARCH
    // ========================================================================

    /// The `semantic_search` pipeline.
    pub async fn semantic_search(&self, request: SearchRequest) -> Result<SearchResponse> {
        if request.query.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("query is required".to_string()));
        }

        // Lazy quality refresh never blocks the query path
        self.maybe_refresh_quality();

        // Scope resolution
        let (project_id, scope_path) = match request.project_path.as_deref() {
            Some(path) => {
                let root = resolver::find_project_root(Path::new(path));
                let canonical = resolver::canonicalize_path(&root);
                match self.db.get_project_by_path(&canonical)? {
                    Some(project) => (Some(project.id), Some(canonical)),
                    None => {
                        return Ok(SearchResponse {
                            query: request.query.clone(),
                            original_query: request.query,
                            message: Some(format!("no project recorded at {canonical}")),
                            ..Default::default()
                        });
                    }
                }
            }
            None => (None, None),
        };

        // Additive query enhancement; a file_path filter joins the
        // query so keyword and file-match scoring both see it
        let mut enhanced = enhance::enhance(&request.query);
        if let Some(ref file_path) = request.file_path {
            enhanced.text.push(' ');
            enhanced.text.push_str(file_path);
        }

        // Candidate set: contexts with embeddings ∪ projected file index
        let mut candidates = self
            .db
            .contexts_for_vector_search(project_id.as_deref(), request.session_id.as_deref())?;
        candidates.extend(self.db.file_index_for_vector_search(
            project_id.as_deref(),
            request.session_id.as_deref(),
        )?);

        if candidates.is_empty() {
            return Ok(SearchResponse {
                query: enhanced.text,
                original_query: enhanced.original,
                message: Some(
                    "no contexts with embeddings in scope yet; record some work first".to_string(),
                ),
                ..Default::default()
            });
        }
        let total_candidates = candidates.len();

        // Query embedding must succeed
        let query_vector = self.embed_text(&enhanced.text).await?;

        // Keyword baseline degrades to empty on failure
        let keyword_ids: HashSet<String> = match self.db.search_keyword(
            &enhanced.text,
            project_id.as_deref(),
            request.limit as i64,
        ) {
            Ok(rows) => rows.into_iter().map(|c| c.id).collect(),
            Err(e) => {
                tracing::warn!("keyword baseline failed, continuing vector-only: {}", e);
                HashSet::new()
            }
        };

        let hybrid_weight = request
            .hybrid_weight
            .unwrap_or(self.config.vector_search.hybrid_weight)
            .clamp(0.0, 1.0);
        let similarity_threshold = request
            .similarity_threshold
            .unwrap_or(self.config.vector_search.similarity_threshold)
            .clamp(0.0, 1.0);

        let ranked = rank(
            candidates,
            &RankParams {
                query: &enhanced.text,
                query_vector: Some(&query_vector),
                keyword_ids: &keyword_ids,
                scope_project_path: scope_path.as_deref(),
                hybrid_weight,
                similarity_threshold,
                type_filter: request.context_type.as_deref(),
                limit: request.limit,
                now: Utc::now(),
            },
        );

        // Hit counters are best-effort and unordered
        for row in &ranked {
            if !row.candidate.from_file_index {
                if let Err(e) = self.db.record_search_hit(&row.candidate.id) {
                    tracing::debug!("search-hit bump failed for {}: {}", row.candidate.id, e);
                }
            }
        }

        let results = ranked
            .into_iter()
            .map(|row| SearchResultRow {
                context_id: row.candidate.id,
                session_id: row.candidate.session_id,
                context_type: row.candidate.context_type,
                content: row.candidate.content,
                file_path: row.candidate.file_path,
                tags: row.candidate.tags,
                quality_score: row.candidate.quality_score,
                created_at: row.candidate.created_at,
                from_file_index: row.candidate.from_file_index,
                vector_score: row.vector_score,
                keyword_score: row.keyword_score,
                hybrid_score: row.hybrid_score,
                metadata_score: row.metadata,
                final_score: row.final_score,
            })
            .collect();

        Ok(SearchResponse {
            query: enhanced.text,
            original_query: enhanced.original,
            total_candidates,
            results,
            message: None,
        })
    }

    /// Spawn a quality-metric recomputation if the last one is stale.
    fn maybe_refresh_quality(&self) {
        let due = {
            let Ok(mut last) = self.last_quality_refresh.lock() else {
                return;
            };
            let now = Utc::now();
            let stale = last.is_none_or(|t| {
                now - t > Duration::hours(QUALITY_REFRESH_INTERVAL_HOURS)
            });
            if stale {
                *last = Some(now);
            }
            stale
        };
        if !due {
            return;
        }

        let db = Arc::clone(&self.db);
        let handle = tokio::spawn(async move {
            let contexts = match db.recent_contexts(QUALITY_REFRESH_BATCH) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!("quality refresh skipped: {}", e);
                    return;
                }
            };
            let mut updated = 0_usize;
            for context in contexts {
                let derived = extract::extract(
                    &context.content,
                    context.file_path.as_deref(),
                    context.line_start,
                    context.line_end,
                );
                // Retrieval usage nudges quality upward
                let hit_boost = (context.search_hits as f64 * 0.02).min(0.2);
                let score = (derived.quality_score + hit_boost).clamp(0.0, 1.0);
                if (score - context.quality_score).abs() > 0.01 {
                    if db.update_quality(&context.id, score).is_ok() {
                        updated += 1;
                    }
                }
            }
            tracing::debug!("quality refresh updated {} contexts", updated);
        });
        self.track_task(handle);
    }

    // ========================================================================
    // CODEBASE INDEX
    // ========================================================================

    /// Walk the project tree and upsert file-index rows for source
    /// files matching the configured extensions and ignore globs.
    pub async fn index_codebase(
        &self,
        project_path: &str,
        max_files: usize,
    ) -> Result<IndexReport> {
        let project = self.resolve_project(project_path).await?;
        let root = resolver::find_project_root(Path::new(project_path));

        // The index is owned by one synthetic session per project
        let index_session_name = format!("{} - Codebase Index", project.name);
        let session = match self
            .db
            .sessions_by_project(&project.id)?
            .into_iter()
            .find(|s| s.name == index_session_name)
        {
            Some(s) => s,
            None => self.db.create_session(
                &project.id,
                &index_session_name,
                "codebase-indexer",
                json!({"synthetic": true}),
            )?,
        };

        let mut ignore = globset::GlobSetBuilder::new();
        for pattern in &self.config.ignored_patterns {
            if let Ok(glob) = globset::Glob::new(pattern) {
                ignore.add(glob);
            }
        }
        let ignore = ignore
            .build()
            .map_err(|e| MemoryError::Init(format!("bad ignore globs: {e}")))?;

        let mut report = IndexReport {
            session_id: session.id.clone(),
            project_id: project.id.clone(),
            ..Default::default()
        };

        let canonical_root = resolver::canonicalize_path(&root);
        for entry in walkdir::WalkDir::new(&root)
            .max_depth(12)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if report.indexed_files >= max_files {
                break;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if ignore.is_match(&rel) {
                report.skipped_files += 1;
                continue;
            }
            let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !self
                .config
                .included_extensions
                .iter()
                .any(|allowed| allowed == &ext.to_lowercase())
            {
                report.skipped_files += 1;
                continue;
            }
            // Oversized files are skipped rather than truncated
            if entry.metadata().map(|m| m.len()).unwrap_or(0) > 256 * 1024 {
                report.skipped_files += 1;
                continue;
            }

            let content = match tokio::fs::read_to_string(entry.path()).await {
                Ok(c) => c,
                Err(_) => {
                    report.skipped_files += 1;
                    continue; // binary or unreadable
                }
            };

            let derived = extract::extract(&content, Some(&rel), None, None);
            let modified_time = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            self.db.upsert_file_index(&NewFileIndexEntry {
                session_id: session.id.clone(),
                project_id: project.id.clone(),
                file_path: rel,
                content,
                tags: derived.tags,
                modified_time,
                metadata: json!({"project_path": canonical_root}),
            })?;
            report.indexed_files += 1;
        }

        // Vector generation trails the index write as a background pass
        if self.embeddings.is_enabled() && report.indexed_files > 0 {
            self.spawn_file_index_embeddings(report.indexed_files as i64);
        }

        Ok(report)
    }

    fn spawn_file_index_embeddings(&self, limit: i64) {
        let db = Arc::clone(&self.db);
        let provider = Arc::clone(&self.embeddings);
        let handle = tokio::spawn(async move {
            let rows = match db.file_index_without_embedding(limit) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("file-index embedding pass skipped: {}", e);
                    return;
                }
            };
            let model = provider.model_name().to_string();
            for (id, content) in rows {
                if !db.is_connected() {
                    return;
                }
                let p = Arc::clone(&provider);
                let text = content;
                let embedded =
                    tokio::task::spawn_blocking(move || p.embed(&text)).await;
                match embedded {
                    Ok(Ok(vector)) => {
                        if let Err(e) =
                            db.update_file_index_embedding(&id, &vector, EMBEDDING_VERSION, &model)
                        {
                            tracing::debug!("file-index embedding persist failed: {}", e);
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::debug!("file-index embedding failed for {}: {}", id, e);
                    }
                    Err(e) => {
                        tracing::warn!("file-index embedding task panicked: {}", e);
                        return;
                    }
                }
            }
        });
        self.track_task(handle);
    }

    // ========================================================================
    // STATUS / SHUTDOWN
    // ========================================================================

    pub async fn status(&self) -> Result<MemoryStatus> {
        let stats = self.db.stats()?;
        let pending_embeddings = self.db.contexts_without_embedding(1000)?.len();
        Ok(MemoryStatus {
            stats,
            database_path: self.db.path().to_string_lossy().to_string(),
            database_connected: self.db.is_connected(),
            embedding_enabled: self.embeddings.is_enabled(),
            embedding_ready: self.embeddings.is_ready(),
            embedding_version: EMBEDDING_VERSION.to_string(),
            embedding_cache: self.embeddings.cache_stats(),
            pending_embeddings,
        })
    }

    /// Export the memory graph as plain JSON nodes and edges. Cycles
    /// are ordinary edges; nothing is traversed transitively.
    pub async fn export_graph(&self, project_path: Option<&str>) -> Result<serde_json::Value> {
        let contexts = match project_path {
            Some(path) => {
                let root = resolver::find_project_root(Path::new(path));
                let canonical = resolver::canonicalize_path(&root);
                let project = self.db.get_project_by_path(&canonical)?.ok_or_else(|| {
                    MemoryError::NotFound(format!("project at {canonical}"))
                })?;
                self.db.contexts_by_project(&project.id, 1000)?
            }
            None => self.db.all_contexts(1000)?,
        };

        let ids: HashSet<&str> = contexts.iter().map(|c| c.id.as_str()).collect();
        let nodes: Vec<serde_json::Value> = contexts
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": c.context_type,
                    "label": extract::preview(&c.content, 60),
                    "sessionId": c.session_id,
                    "qualityScore": c.quality_score,
                    "createdAt": c.created_at.to_rfc3339(),
                })
            })
            .collect();

        let edges: Vec<serde_json::Value> = self
            .db
            .all_relationships(5000)?
            .into_iter()
            .filter(|r| {
                ids.contains(r.from_context_id.as_str()) && ids.contains(r.to_context_id.as_str())
            })
            .map(|r| {
                json!({
                    "from": r.from_context_id,
                    "to": r.to_context_id,
                    "type": r.relation_type.as_str(),
                    "strength": r.strength,
                })
            })
            .collect();

        Ok(json!({"nodes": nodes, "edges": edges}))
    }

    /// Await outstanding background tasks and close the store. Safe to
    /// call once at process teardown.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = match self.background_tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::debug!("background task ended abnormally: {}", e);
                }
            }
        }
        self.db.close();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service_without_vectors() -> (MemoryService, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = MemoryConfig::default();
        config.database_path = Some(dir.path().join("test.db"));
        config.vector_search.enabled = false;
        (MemoryService::new(config).unwrap(), dir)
    }

    #[tokio::test]
    async fn test_resolve_project_is_idempotent() {
        let (service, dir) = service_without_vectors();
        let project_dir = dir.path().join("demoproj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let path = project_dir.to_string_lossy().to_string();
        let a = service.resolve_project(&path).await.unwrap();
        let b = service.resolve_project(&path).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "demoproj");
    }

    #[tokio::test]
    async fn test_case_variant_paths_resolve_to_one_project() {
        let (service, dir) = service_without_vectors();
        let project_dir = dir.path().join("CasedProj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let exact = service
            .resolve_project(&project_dir.to_string_lossy())
            .await
            .unwrap();
        if cfg!(any(target_os = "windows", target_os = "macos")) {
            let variant = project_dir.to_string_lossy().to_uppercase();
            let other = service.resolve_project(&variant).await.unwrap();
            assert_eq!(exact.id, other.id);
        } else {
            // Case-sensitive filesystems keep the exact casing
            assert!(exact.path.contains("CasedProj"));
        }
    }

    #[tokio::test]
    async fn test_session_reuse_is_stable() {
        let (service, dir) = service_without_vectors();
        let project_dir = dir.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let project = service
            .resolve_project(&project_dir.to_string_lossy())
            .await
            .unwrap();
        let first = service.resolve_session(&project, None, "test").await.unwrap();
        let second = service.resolve_session(&project, None, "test").await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.name.ends_with("- Main Session"));

        // Ended main session is reactivated under its original id
        service.db().end_session(&first.id).unwrap();
        let third = service.resolve_session(&project, None, "test").await.unwrap();
        assert_eq!(third.id, first.id);
        assert!(third.is_active());
    }

    #[tokio::test]
    async fn test_explicit_session_id_must_exist() {
        let (service, dir) = service_without_vectors();
        let project_dir = dir.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        let project = service
            .resolve_project(&project_dir.to_string_lossy())
            .await
            .unwrap();

        let err = service
            .resolve_session(&project, Some("missing"), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_with_vectors_disabled_is_unavailable() {
        let (service, dir) = service_without_vectors();
        let project_dir = dir.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        let project = service
            .resolve_project(&project_dir.to_string_lossy())
            .await
            .unwrap();
        let session = service.resolve_session(&project, None, "test").await.unwrap();
        let context = service
            .db()
            .create_context(&crate::model::NewContext {
                session_id: session.id,
                context_type: crate::model::ContextType::Code,
                content: "seeded".into(),
                metadata: json!({}),
                ..Default::default()
            })
            .unwrap();
        // Seed a vector directly so the candidate set is non-empty and
        // the pipeline reaches the query-embedding step
        service
            .db()
            .update_context_embedding(&context.id, &[1.0, 0.0, 0.0], "v2", "test-model")
            .unwrap();

        let err = service
            .semantic_search(SearchRequest {
                query: "anything".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_search_empty_candidate_set_has_message() {
        let (service, _dir) = service_without_vectors();
        let response = service
            .semantic_search(SearchRequest {
                query: "anything".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert!(response.message.is_some());
    }

    #[tokio::test]
    async fn test_search_empty_scope_returns_message() {
        let (service, _dir) = service_without_vectors();
        // No project recorded at this path → explanatory empty result
        let response = service
            .semantic_search(SearchRequest {
                query: "auth bug".into(),
                project_path: Some("/definitely/not/recorded".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert!(response.message.is_some());
    }

    #[tokio::test]
    async fn test_status_reports_disabled_embeddings() {
        let (service, _dir) = service_without_vectors();
        let status = service.status().await.unwrap();
        assert!(!status.embedding_enabled);
        assert!(!status.embedding_ready);
        assert!(status.database_connected);
        assert_eq!(status.stats.total_contexts, 0);
    }

    #[tokio::test]
    async fn test_regenerate_without_provider_is_unavailable() {
        let (service, _dir) = service_without_vectors();
        let err = service.regenerate_embeddings(10).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_shutdown_closes_database() {
        let (service, _dir) = service_without_vectors();
        service.shutdown().await;
        assert!(!service.db().is_connected());
    }
}
