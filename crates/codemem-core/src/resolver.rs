//! Project path resolution.
//!
//! Canonicalization rules: paths are realpath-resolved where possible,
//! lower-cased on case-insensitive filesystems (Windows/macOS), and
//! separators normalized to `/` so stored paths compose with glob
//! patterns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Markers that identify a project root, probed in order.
const ROOT_MARKERS: &[&str] = &[
    ".git",
    "package.json",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    "pyproject.toml",
];

/// Canonicalize a project path into its stored form.
pub fn canonicalize_path(path: &Path) -> String {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    normalize_path_string(&resolved.to_string_lossy())
}

/// Normalize an already-resolved path string: forward slashes, and
/// lower-case on case-insensitive filesystems.
pub fn normalize_path_string(path: &str) -> String {
    let forward = path.replace('\\', "/");
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        forward.to_lowercase()
    } else {
        forward
    }
}

/// Walk upward from `path` looking for a well-known root marker; the
/// input itself is the fallback.
pub fn find_project_root(path: &Path) -> PathBuf {
    let start = if path.is_file() {
        path.parent().unwrap_or(path)
    } else {
        path
    };

    let mut current = Some(start);
    while let Some(dir) = current {
        if ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return dir.to_path_buf();
        }
        current = dir.parent();
    }

    start.to_path_buf()
}

/// Infer the dominant language of a directory by extension histogram.
/// Bounded walk: three levels deep, at most 500 files considered.
pub fn infer_primary_language(path: &Path) -> Option<String> {
    const LANGUAGES: &[(&str, &str)] = &[
        ("rs", "rust"),
        ("ts", "typescript"),
        ("tsx", "typescript"),
        ("js", "javascript"),
        ("jsx", "javascript"),
        ("py", "python"),
        ("go", "go"),
        ("java", "java"),
        ("rb", "ruby"),
        ("cs", "csharp"),
        ("cpp", "cpp"),
        ("cc", "cpp"),
        ("c", "c"),
        ("swift", "swift"),
        ("kt", "kotlin"),
        ("php", "php"),
    ];

    let mut histogram: HashMap<&str, usize> = HashMap::new();
    let walker = WalkDir::new(path)
        .max_depth(3)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(name == "node_modules" || name == "target" || name == ".git" || name == "dist")
        });

    for entry in walker.flatten().take(500) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext = ext.to_lowercase();
        if let Some((_, lang)) = LANGUAGES.iter().find(|(e, _)| *e == ext) {
            *histogram.entry(lang).or_default() += 1;
        }
    }

    histogram
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(lang, _)| lang.to_string())
}

/// Project name inferred from the path's basename.
pub fn name_from_path(canonical: &str) -> String {
    canonical
        .rsplit('/')
        .find(|seg| !seg.is_empty())
        .unwrap_or("project")
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================
