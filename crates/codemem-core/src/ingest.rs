//! The `record_context` ingestion pipeline.
//!
//! Ordered steps: validate → duplicate advisory → session resolution →
//! auto-enrichment (git + project info) → file-path inference →
//! line-range coalescing → auto-classification → tiering → atomic
//! write → fire-and-forget embedding → response composition. A step's
//! failure aborts the pipeline except where noted; the advisory and
//! enrichment stages are best-effort by design.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::classify;
use crate::dedup;
use crate::error::{MemoryError, Result};
use crate::extract;
use crate::filepath;
use crate::model::{
    ChangeType, ContextFileEntry, ContextType, DiffStats, ImpactLevel, NewContext,
    metadata::{self, keys},
};
use crate::service::MemoryService;

/// Silent/notify/skip decision applied after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestTier {
    /// Auto-record without notifying the user
    Silent,
    /// Record and surface the new id
    Notify,
    /// Do not store (unless `force_remember`)
    Skip,
}

impl IngestTier {
    /// Tier for a (possibly auto-classified) context type.
    pub fn for_type(context_type: ContextType) -> Self {
        match context_type {
            ContextType::Code
            | ContextType::CodeCreate
            | ContextType::CodeModify
            | ContextType::CodeDelete
            | ContextType::CodeRefactor
            | ContextType::CodeOptimize
            | ContextType::BugFix
            | ContextType::BugReport
            | ContextType::FeatureAdd
            | ContextType::FeatureUpdate
            | ContextType::FeatureRemove
            | ContextType::Test
            | ContextType::Commit
            | ContextType::Configuration => IngestTier::Silent,
            ContextType::Solution
            | ContextType::Design
            | ContextType::Documentation
            | ContextType::Learning => IngestTier::Notify,
            ContextType::Conversation | ContextType::Error => IngestTier::Skip,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestTier::Silent => "silent",
            IngestTier::Notify => "notify",
            IngestTier::Skip => "skip",
        }
    }
}

/// `record_context` arguments as sent by the host
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordContextInput {
    pub content: String,
    pub project_path: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default, rename = "type")]
    pub context_type: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub files_changed: Option<Vec<ContextFileEntry>>,
    #[serde(default)]
    pub line_ranges: Option<Vec<(i64, i64)>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub change_type: Option<String>,
    #[serde(default)]
    pub impact_level: Option<String>,
    #[serde(default)]
    pub related_files: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub diff_stats: Option<DiffStats>,
    #[serde(default)]
    pub force_remember: bool,
}

/// Per-file line in the ingest response
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file_path: String,
    pub change_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_stats: Option<DiffStats>,
}

/// The ingest result handed back to the transport layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub stored: bool,
    pub tier: String,
    pub context_id: Option<String>,
    pub session_id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub context_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_warning: Option<String>,
    pub files: Vec<FileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

impl MemoryService {
    /// Run the full ingestion pipeline.
    pub async fn record_context(&self, input: RecordContextInput) -> Result<RecordOutcome> {
        // 1. Validate and resolve the project
        if input.content.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("content is required".to_string()));
        }
        if input.project_path.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "project_path is required".to_string(),
            ));
        }
        let project = self.resolve_project(&input.project_path).await?;
        let chinese = is_mostly_chinese(&input.content);

        // 2. Advisory duplicate check; warns, never aborts, never merges
        let advisory = self.check_duplicate(&project.id, &input.content).await;
        let duplicate_warning = advisory
            .as_ref()
            .map(|a| dedup::advisory_text(a, chinese));

        // 3. Session resolution
        let session = self
            .resolve_session(&project, input.session_id.as_deref(), "record_context")
            .await?;

        // 4. Auto-enrichment
        let mut meta = input.metadata.clone().unwrap_or_else(|| json!({}));
        metadata::set_if_absent(&mut meta, keys::PROJECT_PATH, json!(project.path.clone()));

        let mut files: Vec<ContextFileEntry> = input.files_changed.clone().unwrap_or_default();

        if let Some(git) = self
            .git_detector()
            .detect(Path::new(&input.project_path))
            .await
        {
            metadata::set_if_absent(&mut meta, keys::GIT_BRANCH, json!(git.branch));
            metadata::set_if_absent(&mut meta, keys::GIT_AUTHOR, json!(git.author));
            if files.is_empty() && git.has_uncommitted {
                files = git
                    .changed_files
                    .iter()
                    .take(20)
                    .map(|path| ContextFileEntry {
                        file_path: path.clone(),
                        change_type: Some(ChangeType::Modify),
                        line_ranges: vec![],
                        diff_stats: None,
                    })
                    .collect();
            }
        }

        let info = self
            .project_detector()
            .detect(Path::new(&input.project_path))
            .await;
        metadata::set_if_absent(&mut meta, keys::PROJECT_NAME, json!(info.name));
        metadata::set_if_absent(&mut meta, keys::PROJECT_TYPE, json!(info.project_type));
        if let Some(version) = info.version {
            metadata::set_if_absent(&mut meta, keys::PROJECT_VERSION, json!(version));
        }

        // 5. File-path inference (single-file fallback)
        if input.file_path.is_none() && files.is_empty() {
            let recent = self.db().contexts_by_session(&session.id, Some(10))?;
            let suggestions = filepath::suggest(&input.content, &recent);
            if let Some(promoted) = filepath::promotable(&suggestions) {
                files = promoted
                    .into_iter()
                    .map(|s| ContextFileEntry {
                        file_path: s.file_path,
                        change_type: Some(ChangeType::Modify),
                        line_ranges: vec![],
                        diff_stats: None,
                    })
                    .collect();
            }
        }

        // 6. Line-range coalescing: outermost span feeds the legacy columns
        let mut line_start = None;
        let mut line_end = None;
        if let Some(ref ranges) = input.line_ranges {
            if !ranges.is_empty() {
                metadata::set(&mut meta, keys::LINE_RANGES, json!(ranges));
                line_start = ranges.iter().map(|r| r.0).min();
                line_end = ranges.iter().map(|r| r.1).max();
            }
        }

        // 7. Auto-classification
        let caller_type = input
            .context_type
            .as_deref()
            .and_then(ContextType::try_parse);
        let mut context_type = caller_type.unwrap_or(ContextType::Conversation);
        let mut change_type = input.change_type.as_deref().and_then(ChangeType::try_parse);
        let mut impact_level = input
            .impact_level
            .as_deref()
            .and_then(ImpactLevel::try_parse);

        if caller_type.is_none()
            || matches!(context_type, ContextType::Code | ContextType::Conversation)
        {
            let verdict = classify::classify(&input.content, files.len());
            if verdict.confidence > 0.5 {
                context_type = verdict.context_type;
                change_type = change_type.or(verdict.change_type);
                impact_level = impact_level.or(verdict.impact_level);
                metadata::set(
                    &mut meta,
                    keys::AUTO_CLASSIFICATION,
                    json!({
                        "type": verdict.context_type.as_str(),
                        "confidence": verdict.confidence,
                    }),
                );
            }
        }
        if let Some(ct) = change_type {
            metadata::set_if_absent(&mut meta, keys::CHANGE_TYPE, json!(ct.as_str()));
        }
        if let Some(level) = impact_level {
            metadata::set_if_absent(&mut meta, keys::IMPACT_LEVEL, json!(level.as_str()));
        }
        if let Some(ref related) = input.related_files {
            metadata::set_if_absent(&mut meta, "related_files", json!(related));
        }
        if let Some(ref priority) = input.priority {
            metadata::set_if_absent(&mut meta, "priority", json!(priority));
        }

        // 8. Tiering: lossy work filter
        let tier = IngestTier::for_type(context_type);
        if tier == IngestTier::Skip && !input.force_remember {
            return Ok(RecordOutcome {
                stored: false,
                tier: tier.as_str().to_string(),
                context_id: None,
                session_id: session.id,
                project_id: project.id,
                context_type: context_type.as_str().to_string(),
                message: skip_message(context_type, chinese),
                duplicate_warning,
                files: vec![],
                quality_score: None,
            });
        }

        // 9. Atomic write of the context and its file rows
        let file_rows: Vec<ContextFileEntry> = if !files.is_empty() {
            files.clone()
        } else if let Some(ref single) = input.file_path {
            vec![ContextFileEntry {
                file_path: single.clone(),
                change_type,
                line_ranges: input.line_ranges.clone().unwrap_or_default(),
                diff_stats: input.diff_stats,
            }]
        } else {
            vec![]
        };

        // Legacy single-file column only when exactly one file is involved
        let legacy_file_path = match file_rows.len() {
            0 => None,
            1 => Some(file_rows[0].file_path.clone()),
            _ => None,
        };

        if !files.is_empty() {
            metadata::set(&mut meta, keys::FILES_CHANGED, serde_json::to_value(&files)?);
        }
        let mut aggregate = DiffStats::default();
        for entry in &file_rows {
            if let Some(stats) = entry.diff_stats {
                aggregate.merge(&stats);
            }
        }
        if aggregate.is_zero() {
            if let Some(stats) = input.diff_stats {
                aggregate = stats;
            }
        }
        if !aggregate.is_zero() {
            metadata::set(&mut meta, keys::DIFF_STATS, serde_json::to_value(aggregate)?);
        }

        let extraction_path = legacy_file_path
            .as_deref()
            .or_else(|| file_rows.first().map(|f| f.file_path.as_str()));
        let extracted = extract::extract(&input.content, extraction_path, line_start, line_end);
        if !extracted.symbols.is_empty() || !extracted.classes.is_empty() {
            metadata::set_if_absent(
                &mut meta,
                keys::AI_ENRICHMENT,
                json!({
                    "symbols": extracted.symbols,
                    "classes": extracted.classes,
                }),
            );
        }

        let mut tags = input.tags.clone().unwrap_or_default();
        for tag in extracted.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let context = self.db().insert_context_bundle(
            &NewContext {
                session_id: session.id.clone(),
                context_type,
                content: input.content.clone(),
                file_path: legacy_file_path,
                line_start,
                line_end,
                language: extracted.language,
                tags,
                quality_score: extracted.quality_score,
                metadata: meta,
            },
            &file_rows,
        )?;

        // 10. Fire-and-forget embedding
        self.spawn_embedding_task(context.id.clone(), input.content.clone());

        // 11. Response composition
        let file_summaries: Vec<FileSummary> = file_rows
            .iter()
            .map(|entry| FileSummary {
                file_path: entry.file_path.clone(),
                change_type: entry.change_type.map(|c| c.as_str().to_string()),
                diff_stats: entry.diff_stats,
            })
            .collect();

        let mut message = stored_message(tier, context_type, &context.id, chinese);
        if file_summaries.len() > 1 {
            let listing = file_summaries
                .iter()
                .map(|f| match (&f.change_type, &f.diff_stats) {
                    (Some(ct), Some(d)) => {
                        format!("{} ({ct}, +{}/-{})", f.file_path, d.additions, d.deletions)
                    }
                    (Some(ct), None) => format!("{} ({ct})", f.file_path),
                    _ => f.file_path.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            if chinese {
                message.push_str(&format!("\n涉及文件: {listing}"));
            } else {
                message.push_str(&format!("\nFiles: {listing}"));
            }
        }
        if let Some(ref warning) = duplicate_warning {
            message.push('\n');
            message.push_str(warning);
        }

        Ok(RecordOutcome {
            stored: true,
            tier: tier.as_str().to_string(),
            context_id: Some(context.id),
            session_id: session.id,
            project_id: project.id,
            context_type: context_type.as_str().to_string(),
            message,
            duplicate_warning,
            files: file_summaries,
            quality_score: Some(context.quality_score),
        })
    }
}

// ============================================================================
// RESPONSE TEXT
// ============================================================================

/// Contents that are mostly CJK get Chinese response text.
fn is_mostly_chinese(content: &str) -> bool {
    let mut total = 0usize;
    let mut cjk = 0usize;
    for c in content.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        let cp = c as u32;
        if (0x4E00..=0x9FFF).contains(&cp) || (0x3400..=0x4DBF).contains(&cp) {
            cjk += 1;
        }
    }
    total > 0 && (cjk as f64 / total as f64) > 0.3
}

fn stored_message(
    tier: IngestTier,
    context_type: ContextType,
    context_id: &str,
    chinese: bool,
) -> String {
    match (tier, chinese) {
        (IngestTier::Notify, true) => {
            format!("已保存{}记录 {context_id}，可通过 get_context 引用。", context_type)
        }
        (IngestTier::Notify, false) => format!(
            "Saved {context_type} context {context_id}. Reference it later with get_context."
        ),
        (_, true) => format!("已记录{}上下文 {context_id}。", context_type),
        (_, false) => format!("Recorded {context_type} context {context_id}."),
    }
}

fn skip_message(context_type: ContextType, chinese: bool) -> String {
    if chinese {
        format!("已跳过 {} 类型的内容；如需强制保存请传入 force_remember=true。", context_type)
    } else {
        format!(
            "Skipped recording ({context_type}); pass force_remember=true to store it anyway."
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
