//! Content extractor.
//!
//! Pure, synchronous derivation of language, tags, quality score, and
//! affected symbols from recorded content. No file I/O: the path is
//! only inspected as a string. Used by the ingest pipeline and by
//! listing previews.

use std::collections::BTreeSet;
use std::path::Path;

/// Everything the extractor can derive from one piece of content
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub language: Option<String>,
    pub tags: Vec<String>,
    /// Auto-derived quality score in [0, 1]
    pub quality_score: f64,
    /// Function-like symbols mentioned or defined in the content
    pub symbols: Vec<String>,
    /// Class/struct/type names defined in the content
    pub classes: Vec<String>,
}

/// Run the extractor over `(content, path?, line span?)`.
pub fn extract(
    content: &str,
    file_path: Option<&str>,
    line_start: Option<i64>,
    line_end: Option<i64>,
) -> ExtractedContent {
    let language = file_path
        .and_then(language_from_path)
        .or_else(|| language_from_content(content));

    let mut tags = keyword_tags(content);
    if let Some(path) = file_path {
        tags.extend(path_hint_tags(path));
    }
    if let Some(ref lang) = language {
        tags.insert(lang.clone());
    }

    let symbols = collect_symbols(content);
    let classes = collect_classes(content);

    let quality_score = score_quality(content, &symbols, file_path, line_start, line_end);

    ExtractedContent {
        language,
        tags: tags.into_iter().collect(),
        quality_score,
        symbols,
        classes,
    }
}

/// Short preview of a context for chronological listings.
pub fn preview(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{cut}…")
}

// ============================================================================
// LANGUAGE DETECTION
// ============================================================================

/// Map a file extension to a language name.
pub fn language_from_path(path: &str) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
    let language = match ext.as_str() {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "php" => "php",
        "sh" | "bash" | "zsh" => "shell",
        "sql" => "sql",
        "md" | "markdown" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "html" | "htm" => "html",
        "css" | "scss" | "less" => "css",
        _ => return None,
    };
    Some(language.to_string())
}

/// Fallback heuristics when no usable path is available.
fn language_from_content(content: &str) -> Option<String> {
    let head = content.trim_start();
    if head.starts_with("#!") {
        let first_line = head.lines().next().unwrap_or("");
        if first_line.contains("python") {
            return Some("python".to_string());
        }
        if first_line.contains("bash") || first_line.contains("/sh") {
            return Some("shell".to_string());
        }
    }
    if content.contains("fn ") && (content.contains("let ") || content.contains("impl ")) {
        return Some("rust".to_string());
    }
    if content.contains("def ") && content.contains(':') && !content.contains('{') {
        return Some("python".to_string());
    }
    if content.contains("function ") || content.contains("=> {") || content.contains("const ") {
        return Some("javascript".to_string());
    }
    if content.contains("interface ") && content.contains(": ") {
        return Some("typescript".to_string());
    }
    None
}

// ============================================================================
// TAGS
// ============================================================================

const KEYWORD_TAGS: &[(&str, &str)] = &[
    ("fix", "fix"),
    ("bug", "bug"),
    ("error", "error"),
    ("refactor", "refactor"),
    ("test", "test"),
    ("auth", "auth"),
    ("login", "auth"),
    ("password", "auth"),
    ("database", "database"),
    ("sql", "database"),
    ("migration", "database"),
    ("api", "api"),
    ("endpoint", "api"),
    ("performance", "performance"),
    ("optimize", "performance"),
    ("cache", "cache"),
    ("config", "configuration"),
    ("deploy", "deployment"),
    ("security", "security"),
    ("doc", "documentation"),
];

fn keyword_tags(content: &str) -> BTreeSet<String> {
    let lower = content.to_lowercase();
    KEYWORD_TAGS
        .iter()
        .filter(|(needle, _)| lower.contains(needle))
        .map(|(_, tag)| tag.to_string())
        .collect()
}

/// Tags derived from well-known path segments.
fn path_hint_tags(path: &str) -> BTreeSet<String> {
    const HINTS: &[&str] = &[
        "api",
        "component",
        "service",
        "controller",
        "model",
        "util",
        "test",
        "config",
        "middleware",
        "migration",
        "hook",
    ];
    let lower = path.to_lowercase();
    let segments: Vec<&str> = lower
        .split(['/', '\\', '.', '_', '-'])
        .filter(|s| !s.is_empty())
        .collect();
    HINTS
        .iter()
        .filter(|hint| segments.iter().any(|seg| seg.contains(*hint)))
        .map(|hint| hint.to_string())
        .collect()
}

// ============================================================================
// SYMBOLS
// ============================================================================

/// Function-like definitions across the supported languages.
fn collect_symbols(content: &str) -> Vec<String> {
    let mut symbols = BTreeSet::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        for prefix in ["fn ", "def ", "function ", "func ", "async fn ", "pub fn ", "pub async fn "] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                if let Some(name) = leading_identifier(rest) {
                    symbols.insert(name);
                }
            }
        }
    }
    symbols.into_iter().collect()
}

/// Class/struct/type definitions.
fn collect_classes(content: &str) -> Vec<String> {
    let mut classes = BTreeSet::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        for prefix in [
            "class ",
            "struct ",
            "pub struct ",
            "enum ",
            "pub enum ",
            "interface ",
            "trait ",
            "pub trait ",
        ] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                if let Some(name) = leading_identifier(rest) {
                    classes.insert(name);
                }
            }
        }
    }
    classes.into_iter().collect()
}

fn leading_identifier(text: &str) -> Option<String> {
    let name: String = text
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty() && !name.chars().next().is_some_and(|c| c.is_numeric())).then_some(name)
}

// ============================================================================
// QUALITY SCORE
// ============================================================================

fn score_quality(
    content: &str,
    symbols: &[String],
    file_path: Option<&str>,
    line_start: Option<i64>,
    line_end: Option<i64>,
) -> f64 {
    let mut score = 0.5_f64;
    let len = content.chars().count();

    // Too short to be useful; too long to be focused
    if len < 20 {
        score -= 0.2;
    } else if (80..4000).contains(&len) {
        score += 0.1;
    } else if len >= 20_000 {
        score -= 0.1;
    }

    if !symbols.is_empty() {
        score += 0.15;
    }
    if content.contains("```") {
        score += 0.05;
    }
    if file_path.is_some() {
        score += 0.1;
    }
    if line_start.is_some() && line_end.is_some() {
        score += 0.05;
    }
    // Multi-line structure reads better than one blob
    if content.lines().count() > 3 {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================
