//! End-to-end retrieval over a real database file.
//!
//! Vectors are written directly through the DAO so the suite runs
//! without downloading the embedding model; the ranking layer on top
//! is exactly the one `semantic_search` uses.

use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use codemem_core::search::hybrid::{RankParams, rank};
use codemem_core::{ContextType, Database, NewContext, Project, Session};

fn open_db() -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(Some(dir.path().join("memory.db"))).unwrap();
    (db, dir)
}

fn seed_project(db: &Database, path: &str) -> (Project, Session) {
    let project = db
        .get_or_create_project("demo", path, Some("typescript"), None)
        .unwrap();
    let session = db
        .create_session(&project.id, "demo - Main Session", "test", json!({}))
        .unwrap();
    (project, session)
}

fn seed_embedded_context(
    db: &Database,
    session_id: &str,
    content: &str,
    tags: &[&str],
    metadata: serde_json::Value,
    vector: &[f32],
) -> String {
    let context = db
        .create_context(&NewContext {
            session_id: session_id.to_string(),
            context_type: ContextType::BugFix,
            content: content.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            quality_score: 0.6,
            metadata,
            ..Default::default()
        })
        .unwrap();
    db.update_context_embedding(&context.id, vector, "v2", "test-model")
        .unwrap();
    context.id
}

#[test]
fn hybrid_ranking_prefers_relevant_context() {
    let (db, _dir) = open_db();
    let (project, session) = seed_project(&db, "/p");

    let x = seed_embedded_context(
        &db,
        &session.id,
        "password hash bug fix",
        &["auth"],
        json!({
            "project_path": "/p",
            "files_changed": [{"file_path": "auth.ts", "change_type": "modify"}]
        }),
        &[1.0, 0.0, 0.0],
    );
    let y = seed_embedded_context(
        &db,
        &session.id,
        "README update",
        &[],
        json!({"project_path": "/p"}),
        &[0.6, 0.8, 0.0],
    );

    let candidates = db
        .contexts_for_vector_search(Some(&project.id), None)
        .unwrap();
    assert_eq!(candidates.len(), 2);

    let keyword_ids: HashSet<String> = db
        .search_keyword("auth bug", Some(&project.id), 10)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert!(keyword_ids.contains(&x));
    assert!(!keyword_ids.contains(&y));

    let ranked = rank(
        candidates,
        &RankParams {
            query: "auth bug",
            query_vector: Some(&[1.0, 0.0, 0.0]),
            keyword_ids: &keyword_ids,
            scope_project_path: Some("/p"),
            hybrid_weight: 0.7,
            similarity_threshold: 0.5,
            type_filter: None,
            limit: 5,
            now: Utc::now(),
        },
    );

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].candidate.id, x);
    assert_eq!(ranked[1].candidate.id, y);

    // X: no file token in the query, same project, one overlapping tag,
    // created just now
    let meta = &ranked[0].metadata;
    assert_eq!(meta.file_match, 0.0);
    assert_eq!(meta.project_match, 3.0);
    assert_eq!(meta.tag_match, 2.0);
    assert_eq!(meta.time_weight, 10.0);

    // The final score is exactly the published formula
    for row in &ranked {
        let expected = 0.7 * row.hybrid_score + 0.3 * (row.metadata.total / 20.0).min(1.0);
        assert!((row.final_score - expected).abs() < 1e-12);
    }
}

#[test]
fn literal_content_match_stays_in_top_results() {
    let (db, _dir) = open_db();
    let (project, session) = seed_project(&db, "/lit");

    let target = seed_embedded_context(
        &db,
        &session.id,
        "retry backoff uses exponential jitter",
        &[],
        json!({"project_path": "/lit"}),
        &[0.0, 1.0, 0.0],
    );
    for i in 0..5 {
        seed_embedded_context(
            &db,
            &session.id,
            &format!("unrelated note {i}"),
            &[],
            json!({"project_path": "/lit"}),
            &[1.0, 0.0, 0.0],
        );
    }

    // Query text literally contained in the target's content: the
    // keyword baseline rescues it even with an orthogonal vector
    let keyword_ids: HashSet<String> = db
        .search_keyword("exponential jitter", Some(&project.id), 10)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert!(keyword_ids.contains(&target));

    let ranked = rank(
        db.contexts_for_vector_search(Some(&project.id), None).unwrap(),
        &RankParams {
            query: "exponential jitter",
            query_vector: Some(&[1.0, 0.0, 0.0]),
            keyword_ids: &keyword_ids,
            scope_project_path: Some("/lit"),
            hybrid_weight: 0.7,
            similarity_threshold: 0.5,
            type_filter: None,
            limit: 10,
            now: Utc::now(),
        },
    );

    let row = ranked
        .iter()
        .find(|r| r.candidate.id == target)
        .expect("literal match must appear");
    assert!(row.final_score >= 0.3 * (row.metadata.total / 20.0).min(1.0));
}

#[test]
fn file_index_rows_join_the_candidate_set() {
    let (db, _dir) = open_db();
    let (project, session) = seed_project(&db, "/fi");

    db.upsert_file_index(&codemem_core::NewFileIndexEntry {
        session_id: session.id.clone(),
        project_id: project.id.clone(),
        file_path: "src/limiter.rs".into(),
        content: "pub fn acquire_permit() {}".into(),
        tags: vec!["api".into()],
        modified_time: None,
        metadata: json!({"project_path": "/fi"}),
    })
    .unwrap();

    let candidates = db
        .file_index_for_vector_search(Some(&project.id), None)
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].context_type, "code");
    assert!((candidates[0].quality_score - 0.95).abs() < f64::EPSILON);

    // Without a vector it can still surface through a keyword hit
    let keyword_ids: HashSet<String> =
        candidates.iter().map(|c| c.id.clone()).collect();
    let ranked = rank(
        candidates,
        &RankParams {
            query: "acquire_permit",
            query_vector: None,
            keyword_ids: &keyword_ids,
            scope_project_path: Some("/fi"),
            hybrid_weight: 0.7,
            similarity_threshold: 0.5,
            type_filter: Some("code"),
            limit: 10,
            now: Utc::now(),
        },
    );
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].vector_score, 0.0);
    assert!(ranked[0].final_score > 0.0);
}

#[test]
fn search_hits_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.db");

    let context_id = {
        let db = Database::open(Some(path.clone())).unwrap();
        let (_, session) = seed_project(&db, "/durable");
        let id = seed_embedded_context(
            &db,
            &session.id,
            "durable hit counter",
            &[],
            json!({}),
            &[1.0, 0.0],
        );
        db.record_search_hit(&id).unwrap();
        db.record_search_hit(&id).unwrap();
        db.close();
        id
    };

    let db = Database::open(Some(path)).unwrap();
    let context = db.get_context(&context_id).unwrap().unwrap();
    assert_eq!(context.search_hits, 2);
}
