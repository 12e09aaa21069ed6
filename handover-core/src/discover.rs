//! Repository file discovery.
//!
//! Walks the repo with gitignore semantics, applies the always-excluded
//! directory set, then the user's include/exclude globs. Produces normalized
//! repo-relative [`FileEntry`] values; binary and oversized files survive
//! discovery (they count in tree stats) but are content-skipped downstream.

use std::path::Path;

use tracing::{debug, warn};

use crate::config::HandoverConfig;
use crate::error::{DiscoverError, HandoverError};
use crate::types::FileEntry;

/// Directories excluded regardless of ignore files.
pub const ALWAYS_EXCLUDED: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "coverage",
    "target",
    "vendor",
    ".next",
    "__pycache__",
];

/// Walk `repo_root` and return discovered files sorted by path.
pub fn discover_files(
    repo_root: &Path,
    config: &HandoverConfig,
) -> crate::error::Result<Vec<FileEntry>> {
    if !repo_root.is_dir() {
        return Err(HandoverError::Discover(DiscoverError::RootNotFound(
            repo_root.display().to_string(),
        )));
    }

    let include = compile_patterns(&config.include);
    let exclude = compile_patterns(&config.exclude);
    // The tool's own state must never enter the analyzed file set: its
    // presence would change the analysis fingerprint between runs.
    let cache_dir = config.cache.dir.to_string_lossy().to_string();
    let output_dir = config
        .output
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let walker = ignore::WalkBuilder::new(repo_root)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            !ALWAYS_EXCLUDED.contains(&name.as_ref())
                && name != cache_dir
                && name != output_dir
                && !is_vcs_metadata(&name)
        })
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Walk error, skipping entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let abs_path = entry.path().to_path_buf();
        let Some(rel) = normalize_relative(&abs_path, repo_root) else {
            continue;
        };

        if !include.is_empty() && !matches_any(&include, &rel) {
            continue;
        }
        if matches_any(&exclude, &rel) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let extension = abs_path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        files.push(FileEntry {
            path: rel,
            abs_path,
            size,
            extension,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    debug!(count = files.len(), "Discovery complete");
    Ok(files)
}

/// VCS control files are walked for their ignore semantics but excluded from
/// the analyzed file set.
fn is_vcs_metadata(basename: &str) -> bool {
    matches!(basename, ".gitignore" | ".gitattributes" | ".gitmodules")
}

/// Normalize a path to repo-relative form with `/` separators. Returns `None`
/// for paths outside the root.
pub fn normalize_relative(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            std::path::Component::Normal(part) => parts.push(part.to_string_lossy()),
            std::path::Component::CurDir => {}
            // `..`, prefixes and root components would escape the repo
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn compile_patterns(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = %p, error = %e, "Invalid glob pattern");
                None
            }
        })
        .collect()
}

/// Match a repo-relative path against compiled globs. A bare filename pattern
/// (no `/`) matches against the basename as well, so `*.md` works intuitively.
pub fn matches_any(patterns: &[glob::Pattern], rel_path: &str) -> bool {
    patterns.iter().any(|p| {
        if p.matches(rel_path) {
            return true;
        }
        if !p.as_str().contains('/') {
            if let Some(basename) = rel_path.rsplit('/').next() {
                return p.matches(basename);
            }
        }
        false
    })
}
