//! SQLite storage implementation.
//!
//! Typed DAO over the relational store. All mutating operations go
//! through a single writer connection behind a mutex; readers share a
//! second connection so listings and searches proceed concurrently
//! with writes (WAL snapshot semantics). No raw SQL escapes this
//! module.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::embeddings::{normalize_l2, vector_from_bytes, vector_to_bytes};
use crate::error::{MemoryError, Result};
use crate::model::{
    ChangeType, Context, ContextFile, ContextFileEntry, ContextPatch, ContextType, DiffStats,
    FileIndexEntry, MemoryStats, NewContext, NewFileIndexEntry, Project, ProjectSummary,
    RelationType, Relationship, Session, SessionStatus, metadata,
};
use crate::search::{Candidate, FILE_INDEX_PRIOR_QUALITY};

/// Column list for context selects (requires the `c` table alias).
const CONTEXT_COLUMNS: &str = "c.id, c.session_id, c.context_type, c.content, c.file_path, \
     c.line_start, c.line_end, c.language, c.tags, c.quality_score, c.metadata, c.created_at, \
     (c.embedding IS NOT NULL) AS has_embedding, c.embedding_model, c.embedding_version, \
     c.search_hits";

/// Scope filter for chronological context listings.
#[derive(Debug, Clone, Default)]
pub struct ContextFilter {
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub context_type: Option<ContextType>,
    pub limit: Option<i64>,
}

impl ContextFilter {
    /// A listing needs at least one scoping dimension.
    pub fn has_scope(&self) -> bool {
        self.session_id.is_some()
            || self.project_id.is_some()
            || self.since.is_some()
            || self.context_type.is_some()
    }
}

// ============================================================================
// DATABASE
// ============================================================================

/// The relational store behind every engine operation.
pub struct Database {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    connected: AtomicBool,
    path: PathBuf,
}

impl Database {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -32000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating if necessary) the database at `db_path`, or the
    /// default per-user location `<home>/.devmind/memory.db`.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let base = directories::BaseDirs::new().ok_or_else(|| {
                    MemoryError::Init("could not determine home directory".to_string())
                })?;
                let data_dir = base.home_dir().join(".devmind");
                std::fs::create_dir_all(&data_dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(&data_dir, perms);
                }
                data_dir.join("memory.db")
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            connected: AtomicBool::new(true),
            path,
        })
    }

    /// Database file location.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// False once `close` has been called.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark the store closed. Subsequent operations fail fast with a
    /// connection-closed error; in-flight holders of a guard finish.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn write(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        if !self.is_connected() {
            return Err(MemoryError::ConnectionClosed);
        }
        self.writer
            .lock()
            .map_err(|_| MemoryError::Init("writer lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        if !self.is_connected() {
            return Err(MemoryError::ConnectionClosed);
        }
        self.reader
            .lock()
            .map_err(|_| MemoryError::Init("reader lock poisoned".to_string()))
    }

    // ========================================================================
    // ROW CONVERTERS
    // ========================================================================

    fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Invalid {field_name} timestamp '{value}': {e}"),
                    )),
                )
            })
    }

    fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
        let created_at: String = row.get("created_at")?;
        Ok(Project {
            id: row.get("id")?,
            name: row.get("name")?,
            path: row.get("path")?,
            language: row.get("language")?,
            framework: row.get("framework")?,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
        })
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        let started_at: String = row.get("started_at")?;
        let ended_at: Option<String> = row.get("ended_at")?;
        let status: String = row.get("status")?;
        let metadata_json: String = row.get("metadata")?;
        Ok(Session {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            name: row.get("name")?,
            tool_used: row.get("tool_used")?,
            status: SessionStatus::parse_name(&status),
            started_at: Self::parse_timestamp(&started_at, "started_at")?,
            ended_at: ended_at.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            }),
            metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
        })
    }

    fn row_to_context(row: &rusqlite::Row) -> rusqlite::Result<Context> {
        let created_at: String = row.get("created_at")?;
        let tags: String = row.get("tags")?;
        let metadata_json: String = row.get("metadata")?;
        let has_embedding: i64 = row.get("has_embedding")?;
        Ok(Context {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            context_type: row.get("context_type")?,
            content: row.get("content")?,
            file_path: row.get("file_path")?,
            line_start: row.get("line_start")?,
            line_end: row.get("line_end")?,
            language: row.get("language")?,
            tags: tags_from_text(&tags),
            quality_score: row.get("quality_score")?,
            metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            has_embedding: has_embedding != 0,
            embedding_model: row.get("embedding_model")?,
            embedding_version: row.get("embedding_version")?,
            search_hits: row.get("search_hits")?,
        })
    }

    fn row_to_context_file(row: &rusqlite::Row) -> rusqlite::Result<ContextFile> {
        let change_type: Option<String> = row.get("change_type")?;
        let line_ranges: Option<String> = row.get("line_ranges")?;
        let additions: Option<i64> = row.get("additions")?;
        let deletions: Option<i64> = row.get("deletions")?;
        let changes: Option<i64> = row.get("changes")?;
        let diff_stats = match (additions, deletions, changes) {
            (None, None, None) => None,
            _ => Some(DiffStats {
                additions: additions.unwrap_or(0),
                deletions: deletions.unwrap_or(0),
                changes: changes.unwrap_or(0),
            }),
        };
        Ok(ContextFile {
            id: row.get("id")?,
            context_id: row.get("context_id")?,
            file_path: row.get("file_path")?,
            change_type: change_type.as_deref().and_then(ChangeType::try_parse),
            line_ranges: line_ranges
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            diff_stats,
        })
    }

    fn row_to_file_index(row: &rusqlite::Row) -> rusqlite::Result<FileIndexEntry> {
        let indexed_at: String = row.get("indexed_at")?;
        let modified_time: Option<String> = row.get("modified_time")?;
        let tags: String = row.get("tags")?;
        let metadata_json: String = row.get("metadata")?;
        let has_embedding: i64 = row.get("has_embedding")?;
        Ok(FileIndexEntry {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            project_id: row.get("project_id")?,
            file_path: row.get("file_path")?,
            content: row.get("content")?,
            tags: tags_from_text(&tags),
            indexed_at: Self::parse_timestamp(&indexed_at, "indexed_at")?,
            modified_time: modified_time.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            }),
            metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
            has_embedding: has_embedding != 0,
        })
    }

    fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<Option<Relationship>> {
        let relation_type: String = row.get("relation_type")?;
        let Some(relation_type) = RelationType::try_parse(&relation_type) else {
            return Ok(None); // unknown edge kinds are skipped, not fatal
        };
        Ok(Some(Relationship {
            id: row.get("id")?,
            from_context_id: row.get("from_context_id")?,
            to_context_id: row.get("to_context_id")?,
            relation_type,
            strength: row.get("strength")?,
        }))
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    /// Look up a project by its canonical path.
    pub fn get_project_by_path(&self, path: &str) -> Result<Option<Project>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare("SELECT * FROM projects WHERE path = ?1")?;
        Ok(stmt
            .query_row(params![path], Self::row_to_project)
            .optional()?)
    }

    /// Look up a project by id.
    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare("SELECT * FROM projects WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::row_to_project)
            .optional()?)
    }

    /// Return the project at `path`, creating it if absent. The path
    /// must already be canonical.
    pub fn get_or_create_project(
        &self,
        name: &str,
        path: &str,
        language: Option<&str>,
        framework: Option<&str>,
    ) -> Result<Project> {
        // Lookup and insert run under the single writer lock, so two
        // concurrent callers cannot both insert the same path.
        let writer = self.write()?;

        let existing = writer
            .prepare("SELECT * FROM projects WHERE path = ?1")?
            .query_row(params![path], Self::row_to_project)
            .optional()?;
        if let Some(project) = existing {
            return Ok(project);
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        writer.execute(
            "INSERT INTO projects (id, name, path, language, framework, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, name, path, language, framework, now.to_rfc3339()],
        )?;

        Ok(Project {
            id,
            name: name.to_string(),
            path: path.to_string(),
            language: language.map(String::from),
            framework: framework.map(String::from),
            created_at: now,
        })
    }

    /// List projects newest-first with aggregated counters.
    pub fn list_projects(&self, limit: i64) -> Result<Vec<ProjectSummary>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT p.*, \
               (SELECT COUNT(*) FROM sessions s WHERE s.project_id = p.id) AS session_count, \
               (SELECT COUNT(*) FROM contexts c JOIN sessions s2 ON c.session_id = s2.id \
                 WHERE s2.project_id = p.id) AS context_count \
             FROM projects p ORDER BY p.created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(ProjectSummary {
                project: Self::row_to_project(row)?,
                session_count: row.get("session_count")?,
                context_count: row.get("context_count")?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete the given projects (cascading to their sessions,
    /// contexts, and context files). Returns the number removed.
    pub fn delete_projects(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let deleted = {
            let sql = format!("DELETE FROM projects WHERE id IN ({placeholders})");
            let mut stmt = tx.prepare(&sql)?;
            stmt.execute(rusqlite::params_from_iter(ids.iter()))?
        };
        tx.commit()?;
        Ok(deleted)
    }

    /// Projects whose aggregated context count is zero.
    pub fn empty_projects(&self) -> Result<Vec<Project>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT p.* FROM projects p WHERE NOT EXISTS ( \
               SELECT 1 FROM contexts c JOIN sessions s ON c.session_id = s.id \
               WHERE s.project_id = p.id) \
             ORDER BY p.created_at ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_project)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Create a new active session for a project.
    pub fn create_session(
        &self,
        project_id: &str,
        name: &str,
        tool_used: &str,
        metadata: serde_json::Value,
    ) -> Result<Session> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".to_string());

        let writer = self.write()?;
        writer.execute(
            "INSERT INTO sessions (id, project_id, name, tool_used, status, started_at, metadata)
             VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6)",
            params![id, project_id, name, tool_used, now.to_rfc3339(), metadata_json],
        )?;

        Ok(Session {
            id,
            project_id: project_id.to_string(),
            name: name.to_string(),
            tool_used: tool_used.to_string(),
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
            metadata,
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare("SELECT * FROM sessions WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::row_to_session)
            .optional()?)
    }

    /// The project's *main* session: the earliest one, regardless of
    /// status. Reactivation is the caller's decision.
    pub fn get_main_session(&self, project_id: &str) -> Result<Option<Session>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM sessions WHERE project_id = ?1 ORDER BY started_at ASC LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![project_id], Self::row_to_session)
            .optional()?)
    }

    /// The most recently started active session, if any.
    pub fn get_active_session(&self, project_id: &str) -> Result<Option<Session>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM sessions WHERE project_id = ?1 AND status = 'active' \
             ORDER BY started_at DESC LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![project_id], Self::row_to_session)
            .optional()?)
    }

    /// Flip an ended session back to active, keeping its id.
    pub fn reactivate_session(&self, id: &str) -> Result<bool> {
        let writer = self.write()?;
        let changed = writer.execute(
            "UPDATE sessions SET status = 'active', ended_at = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    /// End an active session.
    pub fn end_session(&self, id: &str) -> Result<bool> {
        let now = Utc::now();
        let writer = self.write()?;
        let changed = writer.execute(
            "UPDATE sessions SET status = 'ended', ended_at = ?2 WHERE id = ?1 AND status = 'active'",
            params![id, now.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn sessions_by_project(&self, project_id: &str) -> Result<Vec<Session>> {
        let reader = self.read()?;
        let mut stmt = reader
            .prepare("SELECT * FROM sessions WHERE project_id = ?1 ORDER BY started_at ASC")?;
        let rows = stmt.query_map(params![project_id], Self::row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete a session and, through cascades, its contexts and their
    /// context-file rows. Fully commits or fully rolls back.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let deleted = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // CONTEXTS
    // ========================================================================

    /// Insert a context together with its file rows in one
    /// transaction. Quality is clamped to [0, 1] at write time.
    pub fn insert_context_bundle(
        &self,
        new: &NewContext,
        files: &[ContextFileEntry],
    ) -> Result<Context> {
        for entry in files {
            entry
                .validate()
                .map_err(MemoryError::InvalidArgument)?;
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let quality = new.quality_score.clamp(0.0, 1.0);
        let metadata_json =
            serde_json::to_string(&new.metadata).unwrap_or_else(|_| "{}".to_string());
        let tags_text = tags_to_text(&new.tags);

        let mut writer = self.write()?;
        let tx = writer.transaction()?;

        tx.execute(
            "INSERT INTO contexts (id, session_id, context_type, content, file_path, line_start, \
               line_end, language, tags, quality_score, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                new.session_id,
                new.context_type.as_str(),
                new.content,
                new.file_path,
                new.line_start,
                new.line_end,
                new.language,
                tags_text,
                quality,
                metadata_json,
                now.to_rfc3339(),
            ],
        )?;

        for entry in files {
            Self::insert_context_file(&tx, &id, entry)?;
        }

        tx.commit()?;

        Ok(Context {
            id,
            session_id: new.session_id.clone(),
            context_type: new.context_type.as_str().to_string(),
            content: new.content.clone(),
            file_path: new.file_path.clone(),
            line_start: new.line_start,
            line_end: new.line_end,
            language: new.language.clone(),
            tags: new.tags.clone(),
            quality_score: quality,
            metadata: new.metadata.clone(),
            created_at: now,
            has_embedding: false,
            embedding_model: None,
            embedding_version: None,
            search_hits: 0,
        })
    }

    /// Insert a context with no file rows.
    pub fn create_context(&self, new: &NewContext) -> Result<Context> {
        self.insert_context_bundle(new, &[])
    }

    fn insert_context_file(
        conn: &Connection,
        context_id: &str,
        entry: &ContextFileEntry,
    ) -> Result<()> {
        let line_ranges = if entry.line_ranges.is_empty() {
            None
        } else {
            serde_json::to_string(&entry.line_ranges).ok()
        };
        let (additions, deletions, changes) = match entry.diff_stats {
            Some(d) => (Some(d.additions), Some(d.deletions), Some(d.changes)),
            None => (None, None, None),
        };
        conn.execute(
            "INSERT INTO context_files (context_id, file_path, change_type, line_ranges, \
               additions, deletions, changes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                context_id,
                entry.file_path,
                entry.change_type.map(|c| c.as_str()),
                line_ranges,
                additions,
                deletions,
                changes,
            ],
        )?;
        Ok(())
    }

    pub fn get_context(&self, id: &str) -> Result<Option<Context>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {CONTEXT_COLUMNS} FROM contexts c WHERE c.id = ?1"
        ))?;
        Ok(stmt
            .query_row(params![id], Self::row_to_context)
            .optional()?)
    }

    /// Apply a partial update. The embedding columns and `session_id`
    /// are never touched here.
    pub fn update_context(&self, id: &str, patch: &ContextPatch) -> Result<Context> {
        let existing = self
            .get_context(id)?
            .ok_or_else(|| MemoryError::NotFound(format!("context {id}")))?;

        let context_type = patch
            .context_type
            .map(|t| t.as_str().to_string())
            .unwrap_or(existing.context_type);
        let content = patch.content.clone().unwrap_or(existing.content);
        let tags = patch.tags.clone().unwrap_or(existing.tags);
        let quality = patch
            .quality_score
            .unwrap_or(existing.quality_score)
            .clamp(0.0, 1.0);
        let meta = patch.metadata.clone().unwrap_or(existing.metadata);
        let file_path = match &patch.file_path {
            Some(p) => p.clone(),
            None => existing.file_path,
        };
        let metadata_json = serde_json::to_string(&meta).unwrap_or_else(|_| "{}".to_string());

        {
            let writer = self.write()?;
            writer.execute(
                "UPDATE contexts SET context_type = ?2, content = ?3, tags = ?4, \
                   quality_score = ?5, metadata = ?6, file_path = ?7 WHERE id = ?1",
                params![
                    id,
                    context_type,
                    content,
                    tags_to_text(&tags),
                    quality,
                    metadata_json,
                    file_path,
                ],
            )?;
        }

        self.get_context(id)?
            .ok_or_else(|| MemoryError::NotFound(format!("context {id}")))
    }

    pub fn delete_context(&self, id: &str) -> Result<bool> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let deleted = tx.execute("DELETE FROM contexts WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Contexts of a session, newest first.
    pub fn contexts_by_session(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Context>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {CONTEXT_COLUMNS} FROM contexts c WHERE c.session_id = ?1 \
             ORDER BY c.created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![session_id, limit.unwrap_or(-1)], Self::row_to_context)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Contexts of a project (via its sessions), newest first.
    pub fn contexts_by_project(&self, project_id: &str, limit: i64) -> Result<Vec<Context>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {CONTEXT_COLUMNS} FROM contexts c JOIN sessions s ON s.id = c.session_id \
             WHERE s.project_id = ?1 ORDER BY c.created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![project_id, limit], Self::row_to_context)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All contexts, newest first.
    pub fn all_contexts(&self, limit: i64) -> Result<Vec<Context>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {CONTEXT_COLUMNS} FROM contexts c ORDER BY c.created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], Self::row_to_context)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Chronological (oldest-first) listing under a scope filter.
    pub fn list_contexts(&self, filter: &ContextFilter) -> Result<Vec<Context>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {CONTEXT_COLUMNS} FROM contexts c JOIN sessions s ON s.id = c.session_id \
             WHERE (?1 IS NULL OR c.session_id = ?1) \
               AND (?2 IS NULL OR s.project_id = ?2) \
               AND (?3 IS NULL OR c.created_at >= ?3) \
               AND (?4 IS NULL OR c.context_type = ?4) \
             ORDER BY c.created_at ASC LIMIT ?5"
        ))?;
        let rows = stmt.query_map(
            params![
                filter.session_id,
                filter.project_id,
                filter.since.map(|t| t.to_rfc3339()),
                filter.context_type.map(|t| t.as_str()),
                filter.limit.unwrap_or(100),
            ],
            Self::row_to_context,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Most recently created contexts (for quality refresh passes).
    pub fn recent_contexts(&self, limit: i64) -> Result<Vec<Context>> {
        self.all_contexts(limit)
    }

    pub fn update_quality(&self, id: &str, score: f64) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "UPDATE contexts SET quality_score = ?2 WHERE id = ?1",
            params![id, score.clamp(0.0, 1.0)],
        )?;
        Ok(())
    }

    // ========================================================================
    // EMBEDDING COLUMNS
    // ========================================================================

    /// Read (or fix on first write) the database-wide embedding
    /// dimensionality.
    fn ensure_dimensions(conn: &Connection, len: usize) -> Result<()> {
        let configured: Option<String> = conn
            .query_row(
                "SELECT value FROM engine_meta WHERE key = 'embedding_dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match configured.and_then(|v| v.parse::<usize>().ok()) {
            Some(dims) if dims != len => Err(MemoryError::InvalidArgument(format!(
                "embedding dimension mismatch: database is configured for {dims}, got {len}"
            ))),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO engine_meta (key, value) VALUES ('embedding_dimensions', ?1)",
                    params![len.to_string()],
                )?;
                Ok(())
            }
        }
    }

    /// Persist a context's embedding (raw blob + JSON mirror + version
    /// + model). Vectors are re-normalized defensively so stored rows
    /// are always unit length.
    pub fn update_context_embedding(
        &self,
        id: &str,
        vector: &[f32],
        version: &str,
        model: &str,
    ) -> Result<()> {
        let mut unit = vector.to_vec();
        normalize_l2(&mut unit);
        let text = serde_json::to_string(&unit).unwrap_or_else(|_| "[]".to_string());

        let writer = self.write()?;
        Self::ensure_dimensions(&writer, unit.len())?;
        let changed = writer.execute(
            "UPDATE contexts SET embedding = ?2, embedding_text = ?3, embedding_version = ?4, \
               embedding_model = ?5 WHERE id = ?1",
            params![id, vector_to_bytes(&unit), text, version, model],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("context {id}")));
        }
        Ok(())
    }

    /// Context ids and contents still lacking an embedding.
    pub fn contexts_without_embedding(&self, limit: i64) -> Result<Vec<(String, String)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, content FROM contexts WHERE embedding IS NULL \
             ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ========================================================================
    // SEARCH SUPPORT
    // ========================================================================

    /// Every context in scope that has an embedding, as candidates.
    pub fn contexts_for_vector_search(
        &self,
        project_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT c.id, c.session_id, c.context_type, c.content, c.file_path, c.tags, \
               c.quality_score, c.metadata, c.created_at, c.embedding, c.embedding_version \
             FROM contexts c JOIN sessions s ON s.id = c.session_id \
             WHERE c.embedding IS NOT NULL \
               AND (?1 IS NULL OR s.project_id = ?1) \
               AND (?2 IS NULL OR c.session_id = ?2) \
             ORDER BY c.created_at DESC",
        )?;
        let rows = stmt.query_map(params![project_id, session_id], |row| {
            let tags: String = row.get(5)?;
            let metadata_json: String = row.get(7)?;
            let created_at: String = row.get(8)?;
            let blob: Option<Vec<u8>> = row.get(9)?;
            Ok(Candidate {
                id: row.get(0)?,
                session_id: row.get(1)?,
                context_type: row.get(2)?,
                content: row.get(3)?,
                file_path: row.get(4)?,
                tags: tags_from_text(&tags),
                quality_score: row.get(6)?,
                metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
                created_at: Self::parse_timestamp(&created_at, "created_at")?,
                vector: blob.as_deref().and_then(vector_from_bytes),
                embedding_version: row.get(10)?,
                from_file_index: false,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// File-index rows in scope, projected into the context shape
    /// with `type=code` and the fixed prior quality.
    pub fn file_index_for_vector_search(
        &self,
        project_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, session_id, file_path, content, tags, metadata, indexed_at, \
               embedding, embedding_version \
             FROM file_index \
             WHERE (?1 IS NULL OR project_id = ?1) \
               AND (?2 IS NULL OR session_id = ?2) \
             ORDER BY indexed_at DESC",
        )?;
        let rows = stmt.query_map(params![project_id, session_id], |row| {
            let tags: String = row.get(4)?;
            let metadata_json: String = row.get(5)?;
            let indexed_at: String = row.get(6)?;
            let blob: Option<Vec<u8>> = row.get(7)?;
            Ok(Candidate {
                id: row.get(0)?,
                session_id: row.get(1)?,
                context_type: ContextType::Code.as_str().to_string(),
                content: row.get(3)?,
                file_path: row.get::<_, Option<String>>(2)?,
                tags: tags_from_text(&tags),
                quality_score: FILE_INDEX_PRIOR_QUALITY,
                metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
                created_at: Self::parse_timestamp(&indexed_at, "indexed_at")?,
                vector: blob.as_deref().and_then(vector_from_bytes),
                embedding_version: row.get(8)?,
                from_file_index: true,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Keyword baseline: rows matching any whitespace-split token in
    /// content, tags, file_path, or metadata.
    pub fn search_keyword(
        &self,
        query: &str,
        project_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Context>> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{}%", escape_like(t)))
            .collect();
        if tokens.is_empty() {
            return Ok(vec![]);
        }

        let mut sql = format!(
            "SELECT {CONTEXT_COLUMNS} FROM contexts c JOIN sessions s ON s.id = c.session_id WHERE ("
        );
        for i in 0..tokens.len() {
            if i > 0 {
                sql.push_str(" OR ");
            }
            let p = i + 1;
            sql.push_str(&format!(
                "c.content LIKE ?{p} ESCAPE '\\' OR c.tags LIKE ?{p} ESCAPE '\\' \
                 OR c.file_path LIKE ?{p} ESCAPE '\\' OR c.metadata LIKE ?{p} ESCAPE '\\'"
            ));
        }
        sql.push(')');

        let project_owned = project_id.map(str::to_string);
        let mut bind: Vec<&dyn rusqlite::ToSql> =
            tokens.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
        if let Some(ref pid) = project_owned {
            sql.push_str(&format!(" AND s.project_id = ?{}", bind.len() + 1));
            bind.push(pid as &dyn rusqlite::ToSql);
        }
        sql.push_str(&format!(
            " ORDER BY c.created_at DESC LIMIT ?{}",
            bind.len() + 1
        ));
        bind.push(&limit as &dyn rusqlite::ToSql);

        let reader = self.read()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(bind.as_slice(), Self::row_to_context)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Bump the durable hit counter and stamp
    /// `metadata.quality_metrics.last_accessed`.
    pub fn record_search_hit(&self, context_id: &str) -> Result<()> {
        let writer = self.write()?;
        let metadata_json: Option<String> = writer
            .query_row(
                "SELECT metadata FROM contexts WHERE id = ?1",
                params![context_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(metadata_json) = metadata_json else {
            return Ok(()); // row vanished; hit counters are best-effort
        };

        let mut meta: serde_json::Value =
            serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null);
        metadata::touch_last_accessed(&mut meta, Utc::now());
        let updated = serde_json::to_string(&meta).unwrap_or(metadata_json);

        writer.execute(
            "UPDATE contexts SET search_hits = search_hits + 1, metadata = ?2 WHERE id = ?1",
            params![context_id, updated],
        )?;
        Ok(())
    }

    // ========================================================================
    // CONTEXT FILES
    // ========================================================================

    /// Append file rows to an existing context.
    pub fn add_context_files(
        &self,
        context_id: &str,
        entries: &[ContextFileEntry],
    ) -> Result<usize> {
        for entry in entries {
            entry.validate().map_err(MemoryError::InvalidArgument)?;
        }
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        for entry in entries {
            Self::insert_context_file(&tx, context_id, entry)?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn context_files(&self, context_id: &str) -> Result<Vec<ContextFile>> {
        let reader = self.read()?;
        let mut stmt = reader
            .prepare("SELECT * FROM context_files WHERE context_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![context_id], Self::row_to_context_file)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn delete_context_files(&self, context_id: &str) -> Result<usize> {
        let writer = self.write()?;
        Ok(writer.execute(
            "DELETE FROM context_files WHERE context_id = ?1",
            params![context_id],
        )?)
    }

    // ========================================================================
    // FILE INDEX
    // ========================================================================

    /// Insert or refresh an indexed file. A content refresh clears any
    /// stale embedding so the next pass regenerates it.
    pub fn upsert_file_index(&self, entry: &NewFileIndexEntry) -> Result<FileIndexEntry> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let metadata_json =
            serde_json::to_string(&entry.metadata).unwrap_or_else(|_| "{}".to_string());

        {
            let writer = self.write()?;
            writer.execute(
                "INSERT INTO file_index (id, session_id, project_id, file_path, content, tags, \
                   indexed_at, modified_time, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(project_id, file_path) DO UPDATE SET \
                   content = excluded.content, tags = excluded.tags, \
                   indexed_at = excluded.indexed_at, modified_time = excluded.modified_time, \
                   metadata = excluded.metadata, \
                   embedding = NULL, embedding_text = NULL, \
                   embedding_version = NULL, embedding_model = NULL",
                params![
                    id,
                    entry.session_id,
                    entry.project_id,
                    entry.file_path,
                    entry.content,
                    tags_to_text(&entry.tags),
                    now.to_rfc3339(),
                    entry.modified_time.map(|t| t.to_rfc3339()),
                    metadata_json,
                ],
            )?;
        }

        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, session_id, project_id, file_path, content, tags, indexed_at, \
               modified_time, metadata, (embedding IS NOT NULL) AS has_embedding \
             FROM file_index WHERE project_id = ?1 AND file_path = ?2",
        )?;
        stmt.query_row(params![entry.project_id, entry.file_path], Self::row_to_file_index)
            .map_err(MemoryError::from)
    }

    pub fn update_file_index_embedding(
        &self,
        id: &str,
        vector: &[f32],
        version: &str,
        model: &str,
    ) -> Result<()> {
        let mut unit = vector.to_vec();
        normalize_l2(&mut unit);
        let text = serde_json::to_string(&unit).unwrap_or_else(|_| "[]".to_string());

        let writer = self.write()?;
        Self::ensure_dimensions(&writer, unit.len())?;
        let changed = writer.execute(
            "UPDATE file_index SET embedding = ?2, embedding_text = ?3, embedding_version = ?4, \
               embedding_model = ?5 WHERE id = ?1",
            params![id, vector_to_bytes(&unit), text, version, model],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("file_index {id}")));
        }
        Ok(())
    }

    pub fn file_index_without_embedding(&self, limit: i64) -> Result<Vec<(String, String)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, content FROM file_index WHERE embedding IS NULL \
             ORDER BY indexed_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_file_index(&self, project_id: &str) -> Result<i64> {
        let reader = self.read()?;
        Ok(reader.query_row(
            "SELECT COUNT(*) FROM file_index WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?)
    }

    pub fn delete_file_index(&self, project_id: &str) -> Result<usize> {
        let writer = self.write()?;
        Ok(writer.execute(
            "DELETE FROM file_index WHERE project_id = ?1",
            params![project_id],
        )?)
    }

    // ========================================================================
    // RELATIONSHIPS
    // ========================================================================

    /// Insert a directed edge. Strength is clamped to [0, 1].
    pub fn add_relationship(
        &self,
        from_context_id: &str,
        to_context_id: &str,
        relation_type: RelationType,
        strength: f64,
    ) -> Result<Relationship> {
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO relationships (from_context_id, to_context_id, relation_type, strength) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                from_context_id,
                to_context_id,
                relation_type.as_str(),
                strength.clamp(0.0, 1.0),
            ],
        )?;
        let id = writer.last_insert_rowid();
        Ok(Relationship {
            id,
            from_context_id: from_context_id.to_string(),
            to_context_id: to_context_id.to_string(),
            relation_type,
            strength: strength.clamp(0.0, 1.0),
        })
    }

    /// Direct outgoing edges from a context, optionally filtered by
    /// type. Never traverses transitively.
    pub fn related_contexts(
        &self,
        context_id: &str,
        relation_type: Option<RelationType>,
    ) -> Result<Vec<Relationship>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM relationships WHERE from_context_id = ?1 \
               AND (?2 IS NULL OR relation_type = ?2) ORDER BY strength DESC",
        )?;
        let rows = stmt.query_map(
            params![context_id, relation_type.map(|r| r.as_str())],
            Self::row_to_relationship,
        )?;
        Ok(rows.filter_map(|r| r.ok()).flatten().collect())
    }

    pub fn all_relationships(&self, limit: i64) -> Result<Vec<Relationship>> {
        let reader = self.read()?;
        let mut stmt =
            reader.prepare("SELECT * FROM relationships ORDER BY id ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], Self::row_to_relationship)?;
        Ok(rows.filter_map(|r| r.ok()).flatten().collect())
    }

    // ========================================================================
    // STATS
    // ========================================================================

    pub fn stats(&self) -> Result<MemoryStats> {
        let reader = self.read()?;

        let scalar = |sql: &str| -> Result<i64> {
            Ok(reader.query_row(sql, [], |row| row.get(0))?)
        };

        let total_projects = scalar("SELECT COUNT(*) FROM projects")?;
        let total_sessions = scalar("SELECT COUNT(*) FROM sessions")?;
        let active_sessions =
            scalar("SELECT COUNT(*) FROM sessions WHERE status = 'active'")?;
        let total_contexts = scalar("SELECT COUNT(*) FROM contexts")?;
        let contexts_with_embeddings =
            scalar("SELECT COUNT(*) FROM contexts WHERE embedding IS NOT NULL")?;
        let total_context_files = scalar("SELECT COUNT(*) FROM context_files")?;
        let total_indexed_files = scalar("SELECT COUNT(*) FROM file_index")?;
        let total_relationships = scalar("SELECT COUNT(*) FROM relationships")?;

        let bound = |sql: &str| -> Result<Option<DateTime<Utc>>> {
            // Aggregates over an empty table yield one NULL row
            let value: Option<String> = reader.query_row(sql, [], |row| row.get(0))?;
            Ok(value.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            }))
        };
        let oldest_context = bound("SELECT MIN(created_at) FROM contexts")?;
        let newest_context = bound("SELECT MAX(created_at) FROM contexts")?;

        let database_size_bytes = std::fs::metadata(&self.path)
            .ok()
            .map(|m| m.len() as i64);

        Ok(MemoryStats {
            total_projects,
            total_sessions,
            active_sessions,
            total_contexts,
            contexts_with_embeddings,
            total_context_files,
            total_indexed_files,
            total_relationships,
            oldest_context,
            newest_context,
            database_size_bytes,
        })
    }
}

// ============================================================================
// TEXT HELPERS
// ============================================================================

/// Join tags into the stored comma-joined form.
fn tags_to_text(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.trim().replace(',', " "))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Split the stored comma-joined form back into tags.
pub(crate) fn tags_from_text(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Escape LIKE wildcards in a user-supplied token.
fn escape_like(token: &str) -> String {
    token
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(Some(dir.path().join("test.db"))).unwrap();
        (db, dir)
    }

    fn seed_session(db: &Database, path: &str) -> (Project, Session) {
        let project = db
            .get_or_create_project("demo", path, Some("rust"), None)
            .unwrap();
        let session = db
            .create_session(&project.id, "demo - Main Session", "test", json!({}))
            .unwrap();
        (project, session)
    }

    fn seed_context(db: &Database, session_id: &str, content: &str) -> Context {
        db.create_context(&NewContext {
            session_id: session_id.to_string(),
            context_type: ContextType::Code,
            content: content.to_string(),
            quality_score: 0.6,
            metadata: json!({}),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_project_path_is_unique() {
        let (db, _dir) = test_db();
        let a = db.get_or_create_project("p", "/tmp/p", None, None).unwrap();
        let b = db.get_or_create_project("p2", "/tmp/p", None, None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(db.list_projects(10).unwrap().len(), 1);
    }

    #[test]
    fn test_context_roundtrip_and_delete() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/roundtrip");
        let ctx = seed_context(&db, &session.id, "Initial commit");

        let loaded = db.get_context(&ctx.id).unwrap().unwrap();
        assert_eq!(loaded.session_id, session.id);
        assert_eq!(loaded.content, "Initial commit");
        assert!(!loaded.has_embedding);

        assert!(db.delete_context(&ctx.id).unwrap());
        assert!(db.get_context(&ctx.id).unwrap().is_none());
    }

    #[test]
    fn test_session_delete_cascades_to_contexts_and_files() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/cascade");

        let mut context_ids = vec![];
        for i in 0..3 {
            let ctx = db
                .insert_context_bundle(
                    &NewContext {
                        session_id: session.id.clone(),
                        context_type: ContextType::CodeModify,
                        content: format!("change {i}"),
                        metadata: json!({}),
                        ..Default::default()
                    },
                    &[
                        ContextFileEntry {
                            file_path: format!("src/a{i}.rs"),
                            change_type: Some(ChangeType::Modify),
                            line_ranges: vec![],
                            diff_stats: None,
                        },
                    ],
                )
                .unwrap();
            context_ids.push(ctx.id);
        }
        // 3 contexts, 3 file rows, plus 2 more files on the first context
        db.add_context_files(
            &context_ids[0],
            &[
                ContextFileEntry {
                    file_path: "src/x.rs".into(),
                    change_type: None,
                    line_ranges: vec![],
                    diff_stats: None,
                },
                ContextFileEntry {
                    file_path: "src/y.rs".into(),
                    change_type: None,
                    line_ranges: vec![],
                    diff_stats: None,
                },
            ],
        )
        .unwrap();
        assert_eq!(db.stats().unwrap().total_context_files, 5);

        assert!(db.delete_session(&session.id).unwrap());

        for id in &context_ids {
            assert!(db.get_context(id).unwrap().is_none());
        }
        let stats = db.stats().unwrap();
        assert_eq!(stats.total_contexts, 0);
        assert_eq!(stats.total_context_files, 0);
    }

    #[test]
    fn test_main_session_is_earliest_and_reactivates() {
        let (db, _dir) = test_db();
        let (project, first) = seed_session(&db, "/tmp/main");
        let _second = db
            .create_session(&project.id, "later", "test", json!({}))
            .unwrap();

        let main = db.get_main_session(&project.id).unwrap().unwrap();
        assert_eq!(main.id, first.id);

        assert!(db.end_session(&first.id).unwrap());
        let ended = db.get_session(&first.id).unwrap().unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(ended.ended_at.is_some());

        // Reactivation keeps the original id
        assert!(db.reactivate_session(&first.id).unwrap());
        let active = db.get_session(&first.id).unwrap().unwrap();
        assert_eq!(active.id, first.id);
        assert!(active.is_active());
        assert!(active.ended_at.is_none());
    }

    #[test]
    fn test_update_context_does_not_touch_session() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/update");
        let ctx = seed_context(&db, &session.id, "before");

        let updated = db
            .update_context(
                &ctx.id,
                &ContextPatch {
                    content: Some("after".into()),
                    tags: Some(vec!["auth".into(), "fix".into()]),
                    quality_score: Some(1.5), // clamped
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.content, "after");
        assert_eq!(updated.tags, vec!["auth", "fix"]);
        assert!((updated.quality_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(updated.session_id, session.id);
    }

    #[test]
    fn test_update_missing_context_is_not_found() {
        let (db, _dir) = test_db();
        let err = db
            .update_context("nope", &ContextPatch::default())
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[test]
    fn test_keyword_search_matches_tokens_across_columns() {
        let (db, _dir) = test_db();
        let (project, session) = seed_session(&db, "/tmp/kw");
        let hit = db
            .insert_context_bundle(
                &NewContext {
                    session_id: session.id.clone(),
                    context_type: ContextType::BugFix,
                    content: "password hash bug fix".into(),
                    tags: vec!["auth".into()],
                    metadata: json!({}),
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        let _miss = seed_context(&db, &session.id, "README update");

        // Token hits content
        let results = db.search_keyword("password", Some(&project.id), 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit.id);

        // Token hits tags; any-token semantics surface both rows
        let results = db.search_keyword("auth README", Some(&project.id), 10).unwrap();
        assert_eq!(results.len(), 2);

        // LIKE wildcards in the query are treated literally
        let results = db.search_keyword("%", Some(&project.id), 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_embedding_write_enforces_dimensions_and_unit_length() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/embed");
        let ctx = seed_context(&db, &session.id, "vector me");

        db.update_context_embedding(&ctx.id, &[3.0, 4.0, 0.0], "v2", "test-model")
            .unwrap();

        let candidates = db.contexts_for_vector_search(None, None).unwrap();
        assert_eq!(candidates.len(), 1);
        let vector = candidates[0].vector.as_ref().unwrap();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);

        // A second write with a different dimensionality is rejected
        let err = db
            .update_context_embedding(&ctx.id, &[1.0, 0.0], "v2", "test-model")
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument(_)));
    }

    #[test]
    fn test_record_search_hit_is_durable() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/hits");
        let ctx = seed_context(&db, &session.id, "popular");

        db.record_search_hit(&ctx.id).unwrap();
        db.record_search_hit(&ctx.id).unwrap();

        let loaded = db.get_context(&ctx.id).unwrap().unwrap();
        assert_eq!(loaded.search_hits, 2);
        assert!(metadata::last_accessed(&loaded.metadata).is_some());
    }

    #[test]
    fn test_empty_projects_and_bulk_delete() {
        let (db, _dir) = test_db();
        let (p1, session) = seed_session(&db, "/tmp/full");
        seed_context(&db, &session.id, "has content");
        let p2 = db.get_or_create_project("empty", "/tmp/empty", None, None).unwrap();

        let empty = db.empty_projects().unwrap();
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].id, p2.id);

        let deleted = db.delete_projects(&[p2.id.clone()]).unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_project(&p2.id).unwrap().is_none());
        assert!(db.get_project(&p1.id).unwrap().is_some());
    }

    #[test]
    fn test_file_index_upsert_and_projection() {
        let (db, _dir) = test_db();
        let (project, session) = seed_session(&db, "/tmp/fidx");

        let entry = NewFileIndexEntry {
            session_id: session.id.clone(),
            project_id: project.id.clone(),
            file_path: "src/auth.ts".into(),
            content: "export function hashPassword() {}".into(),
            tags: vec!["auth".into()],
            modified_time: None,
            metadata: json!({}),
        };
        let first = db.upsert_file_index(&entry).unwrap();
        db.update_file_index_embedding(&first.id, &[1.0, 0.0, 0.0], "v2", "test-model")
            .unwrap();

        // Re-index with changed content keeps the row but clears the vector
        let refreshed = db
            .upsert_file_index(&NewFileIndexEntry {
                content: "export function hashPassword(salt) {}".into(),
                ..entry
            })
            .unwrap();
        assert_eq!(refreshed.id, first.id);
        assert!(!refreshed.has_embedding);

        let candidates = db
            .file_index_for_vector_search(Some(&project.id), None)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].context_type, "code");
        assert!((candidates[0].quality_score - FILE_INDEX_PRIOR_QUALITY).abs() < f64::EPSILON);
        assert!(candidates[0].from_file_index);

        assert_eq!(db.delete_file_index(&project.id).unwrap(), 1);
    }

    #[test]
    fn test_relationships_are_direct_edges_only() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/rel");
        let a = seed_context(&db, &session.id, "bug report");
        let b = seed_context(&db, &session.id, "the fix");
        let c = seed_context(&db, &session.id, "the test");

        db.add_relationship(&b.id, &a.id, RelationType::Fixes, 0.9).unwrap();
        db.add_relationship(&c.id, &b.id, RelationType::Tests, 0.8).unwrap();
        // Cycle: allowed, stored as an ordinary edge
        db.add_relationship(&a.id, &b.id, RelationType::RelatedTo, 0.5).unwrap();

        let related = db.related_contexts(&b.id, None).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].to_context_id, a.id);

        let filtered = db.related_contexts(&b.id, Some(RelationType::Tests)).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_list_contexts_filter_scope() {
        let (db, _dir) = test_db();
        let (project, session) = seed_session(&db, "/tmp/list");
        seed_context(&db, &session.id, "first");
        let second = db
            .create_context(&NewContext {
                session_id: session.id.clone(),
                context_type: ContextType::Design,
                content: "design note".into(),
                metadata: json!({}),
                ..Default::default()
            })
            .unwrap();

        assert!(!ContextFilter::default().has_scope());

        let rows = db
            .list_contexts(&ContextFilter {
                project_id: Some(project.id.clone()),
                context_type: Some(ContextType::Design),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, second.id);

        // Chronological order, oldest first
        let rows = db
            .list_contexts(&ContextFilter {
                session_id: Some(session.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "first");
    }

    #[test]
    fn test_close_fails_fast() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/close");
        db.close();
        assert!(!db.is_connected());
        let err = db
            .create_context(&NewContext {
                session_id: session.id,
                context_type: ContextType::Code,
                content: "too late".into(),
                metadata: json!({}),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, MemoryError::ConnectionClosed));
    }

    #[test]
    fn test_invalid_line_ranges_rejected_atomically() {
        let (db, _dir) = test_db();
        let (_, session) = seed_session(&db, "/tmp/ranges");

        let err = db
            .insert_context_bundle(
                &NewContext {
                    session_id: session.id.clone(),
                    context_type: ContextType::CodeModify,
                    content: "bad ranges".into(),
                    metadata: json!({}),
                    ..Default::default()
                },
                &[ContextFileEntry {
                    file_path: "a.rs".into(),
                    change_type: None,
                    line_ranges: vec![(9, 3)],
                    diff_stats: None,
                }],
            )
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument(_)));
        // Nothing was written
        assert_eq!(db.stats().unwrap().total_contexts, 0);
    }
}
