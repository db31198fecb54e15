//! Database migrations.
//!
//! Schema migration definitions for the storage layer. Applied in
//! order on the writer connection at open time; each migration runs
//! inside its own transaction.

use rusqlite::Connection;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: projects, sessions, contexts, context_files, file_index, relationships",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Durable search-hit counters and type index",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    language TEXT,
    framework TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    tool_used TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'active',
    started_at TEXT NOT NULL,
    ended_at TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_sessions_project_status ON sessions(project_id, status);

CREATE TABLE IF NOT EXISTS contexts (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    context_type TEXT NOT NULL DEFAULT 'conversation',
    content TEXT NOT NULL,

    -- Legacy single-file association (multi-file rows live in context_files)
    file_path TEXT,
    line_start INTEGER,
    line_end INTEGER,

    language TEXT,
    tags TEXT NOT NULL DEFAULT '',
    quality_score REAL NOT NULL DEFAULT 0.5,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,

    -- Embedding columns: all four set together or none
    embedding BLOB,
    embedding_text TEXT,
    embedding_version TEXT,
    embedding_model TEXT
);

CREATE INDEX IF NOT EXISTS idx_contexts_session_created ON contexts(session_id, created_at);

CREATE TABLE IF NOT EXISTS context_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    context_id TEXT NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    change_type TEXT,
    line_ranges TEXT,
    additions INTEGER,
    deletions INTEGER,
    changes INTEGER
);

CREATE INDEX IF NOT EXISTS idx_context_files_context ON context_files(context_id);

CREATE TABLE IF NOT EXISTS file_index (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '',
    indexed_at TEXT NOT NULL,
    modified_time TEXT,
    embedding BLOB,
    embedding_text TEXT,
    embedding_version TEXT,
    embedding_model TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(project_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_file_index_project ON file_index(project_id);

CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_context_id TEXT NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
    to_context_id TEXT NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.5
);

CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_context_id);
CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_context_id);

-- Engine metadata (embedding dimensionality is fixed once per database)
CREATE TABLE IF NOT EXISTS engine_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: durable hit counters + type index
const MIGRATION_V2_UP: &str = r#"
ALTER TABLE contexts ADD COLUMN search_hits INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_contexts_type ON contexts(context_type);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Apply any outstanding migrations to the given connection.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            tracing::info!(
                version = migration.version,
                "Applying migration: {}",
                migration.description
            );
            conn.execute_batch(&format!(
                "BEGIN;\n{}\nCOMMIT;",
                migration.up
            ))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let mut versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let sorted = versions.clone();
        versions.dedup();
        assert_eq!(versions, sorted);
        assert_eq!(versions.first(), Some(&1));
    }

    #[test]
    fn test_apply_migrations_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }
}
