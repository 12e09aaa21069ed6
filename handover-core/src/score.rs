//! File importance scoring.
//!
//! Produces a total ordering over discovered files from weighted signals:
//! entry-point evidence, import-graph indegree, git churn, TODO density,
//! colocated documentation, user pin/boost patterns, and relevance to the
//! detected primary language. Ties break by path ascending so the ordering
//! is deterministic.

use std::collections::{BTreeMap, HashSet};

use crate::analyze::StaticAnalysisResult;
use crate::config::HandoverConfig;
use crate::discover;
use crate::types::FileEntry;

const WEIGHT_ENTRY_POINT: f64 = 25.0;
const WEIGHT_INDEGREE: f64 = 3.0;
const INDEGREE_CAP: f64 = 30.0;
const WEIGHT_CHURN: f64 = 1.0;
const CHURN_CAP: f64 = 15.0;
const WEIGHT_TODO: f64 = 2.0;
const TODO_CAP: f64 = 10.0;
const WEIGHT_DOC_ADJACENT: f64 = 5.0;
const WEIGHT_LANGUAGE: f64 = 10.0;
const WEIGHT_BOOST: f64 = 20.0;
/// Pinned files sort ahead of everything unpinned.
const WEIGHT_PIN: f64 = 1000.0;

/// Entry-point basenames recognized across the supported languages.
const ENTRY_POINT_NAMES: &[&str] = &[
    "main.rs", "lib.rs", "main.go", "main.py", "app.py", "__main__.py", "index.ts", "index.js",
    "index.tsx", "main.ts", "main.js", "app.ts", "app.js", "server.ts", "server.js",
];

/// Whether a basename is a recognized entry point.
pub fn is_entry_point_name(basename: &str) -> bool {
    ENTRY_POINT_NAMES.contains(&basename)
}

#[derive(Debug, Clone)]
pub struct ScoredFile {
    pub entry: FileEntry,
    pub score: f64,
}

/// Rank files by importance, descending. Ties break by path ascending.
pub fn score_files(
    files: &[FileEntry],
    statics: &StaticAnalysisResult,
    config: &HandoverConfig,
) -> Vec<ScoredFile> {
    let indegree = statics.symbols.indegree();
    let manifest_entries = manifest_entry_fields(statics);
    let doc_dirs = documented_dirs(files);
    let primary_exts = primary_language_extensions(statics);

    let pin = compile(&config.context_window.pin);
    let boost = compile(&config.context_window.boost);

    let mut scored: Vec<ScoredFile> = files
        .iter()
        .map(|file| {
            let mut score = 0.0;

            let basename = file.path.rsplit('/').next().unwrap_or(&file.path);
            if is_entry_point_name(basename) || manifest_entries.contains(&file.path) {
                score += WEIGHT_ENTRY_POINT;
            }

            let inbound = f64::from(indegree.get(&file.path).copied().unwrap_or(0));
            score += (inbound * WEIGHT_INDEGREE).min(INDEGREE_CAP);

            let churn = f64::from(statics.git.churn.get(&file.path).copied().unwrap_or(0));
            score += (churn * WEIGHT_CHURN).min(CHURN_CAP);

            let todos = statics.todos.count_for(&file.path) as f64;
            score += (todos * WEIGHT_TODO).min(TODO_CAP);

            let dir = file.path.rsplit_once('/').map_or("", |(d, _)| d);
            if doc_dirs.contains(dir) {
                score += WEIGHT_DOC_ADJACENT;
            }

            if primary_exts.contains(&file.extension.as_str()) {
                score += WEIGHT_LANGUAGE;
            }

            if discover::matches_any(&boost, &file.path) {
                score += WEIGHT_BOOST;
            }
            if discover::matches_any(&pin, &file.path) {
                score += WEIGHT_PIN;
            }

            ScoredFile {
                entry: file.clone(),
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry.path.cmp(&b.entry.path))
    });
    scored
}

fn compile(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect()
}

/// Entry fields declared in manifests (`main` in package.json and friends),
/// captured by the dependency analyzer at parse time.
fn manifest_entry_fields(statics: &StaticAnalysisResult) -> HashSet<String> {
    statics
        .dependencies
        .manifests
        .iter()
        .flat_map(|m| m.entry_points.iter().cloned())
        .collect()
}

/// Directories containing at least one markdown file.
fn documented_dirs(files: &[FileEntry]) -> HashSet<String> {
    files
        .iter()
        .filter(|f| f.extension == "md")
        .map(|f| f.path.rsplit_once('/').map_or("", |(d, _)| d).to_string())
        .collect()
}

fn primary_language_extensions(statics: &StaticAnalysisResult) -> Vec<&'static str> {
    match statics.symbols.primary_language.as_deref() {
        Some("rust") => vec!["rs"],
        Some("python") => vec!["py"],
        Some("typescript") => vec!["ts", "tsx"],
        Some("javascript") => vec!["js", "jsx", "mjs", "cjs"],
        Some("go") => vec!["go"],
        _ => Vec::new(),
    }
}

/// Per-file score index for the packer's section competition.
pub fn score_index(scored: &[ScoredFile]) -> BTreeMap<String, f64> {
    scored
        .iter()
        .map(|s| (s.entry.path.clone(), s.score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::symbols::ImportEdge;

    fn entry(path: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            abs_path: std::path::PathBuf::from("/nonexistent").join(path),
            size: 10,
            extension: path.rsplit('.').next().unwrap_or("").to_string(),
        }
    }

    #[test]
    fn entry_points_outrank_leaves() {
        let files = vec![entry("src/util.rs"), entry("src/main.rs")];
        let statics = StaticAnalysisResult::default();
        let scored = score_files(&files, &statics, &HandoverConfig::default());
        assert_eq!(scored[0].entry.path, "src/main.rs");
        assert!(scored[0].score > scored[1].score);
    }

    #[test]
    fn indegree_raises_score() {
        let files = vec![entry("src/a.rs"), entry("src/core.rs")];
        let mut statics = StaticAnalysisResult::default();
        statics.symbols.import_edges = vec![
            ImportEdge {
                from: "src/a.rs".into(),
                to: "src/core.rs".into(),
            },
            ImportEdge {
                from: "src/b.rs".into(),
                to: "src/core.rs".into(),
            },
        ];
        let scored = score_files(&files, &statics, &HandoverConfig::default());
        assert_eq!(scored[0].entry.path, "src/core.rs");
    }

    #[test]
    fn pins_dominate_everything() {
        let files = vec![entry("src/main.rs"), entry("docs/notes.md")];
        let config = HandoverConfig {
            context_window: crate::config::ContextWindowSection {
                pin: vec!["docs/*.md".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let scored = score_files(&files, &StaticAnalysisResult::default(), &config);
        assert_eq!(scored[0].entry.path, "docs/notes.md");
    }

    #[test]
    fn deterministic_tie_break_by_path() {
        let files = vec![entry("src/b.rs"), entry("src/a.rs")];
        let scored = score_files(&files, &StaticAnalysisResult::default(), &HandoverConfig::default());
        assert_eq!(scored[0].entry.path, "src/a.rs");
        assert_eq!(scored[1].entry.path, "src/b.rs");
    }
}
