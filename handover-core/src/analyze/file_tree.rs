use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::AnalyzerOutput;
use super::traits::{AnalysisContext, Analyzer};

const TOP_LARGEST: usize = 10;
const TREE_DEPTH_CAP: usize = 3;

/// File-tree statistics: totals, extension histogram, largest files, and a
/// directory tree capped to three levels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileTreeData {
    pub total_files: usize,
    pub total_dirs: usize,
    pub total_lines: u64,
    pub total_bytes: u64,
    pub extensions: BTreeMap<String, usize>,
    pub largest: Vec<LargeFile>,
    pub tree: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LargeFile {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct FileTreeAnalyzer;

#[async_trait::async_trait]
impl Analyzer for FileTreeAnalyzer {
    fn name(&self) -> &'static str {
        "file-tree"
    }

    #[instrument(skip_all, name = "file_tree_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        let mut data = FileTreeData {
            total_files: ctx.files.len(),
            ..Default::default()
        };

        let mut dirs: BTreeSet<String> = BTreeSet::new();
        for file in &ctx.files {
            data.total_bytes += file.size;
            let ext_key = if file.extension.is_empty() {
                "(none)".to_string()
            } else {
                file.extension.clone()
            };
            *data.extensions.entry(ext_key).or_insert(0) += 1;

            let mut current = file.path.as_str();
            while let Some((dir, _)) = current.rsplit_once('/') {
                dirs.insert(dir.to_string());
                current = dir;
            }
        }
        data.total_dirs = dirs.len();

        // Line counts only for content-eligible files; binary and oversized
        // files still count in bytes and the histogram.
        for file in ctx.content_files() {
            if let Ok(text) = std::fs::read_to_string(&file.abs_path) {
                data.total_lines += text.lines().count() as u64;
            }
        }

        let mut by_size: Vec<&crate::types::FileEntry> = ctx.files.iter().collect();
        by_size.sort_by(|a, b| b.size.cmp(&a.size).then(a.path.cmp(&b.path)));
        data.largest = by_size
            .into_iter()
            .take(TOP_LARGEST)
            .map(|f| LargeFile {
                path: f.path.clone(),
                size: f.size,
            })
            .collect();

        data.tree = render_tree(&ctx.files);

        Ok(AnalyzerOutput::FileTree(data))
    }
}

/// Render a directory tree capped to [`TREE_DEPTH_CAP`] levels. Directories
/// deeper than the cap are summarized with a file count.
fn render_tree(files: &[crate::types::FileEntry]) -> String {
    let mut top_level: BTreeMap<String, usize> = BTreeMap::new();
    let mut nested: BTreeMap<String, usize> = BTreeMap::new();

    for file in files {
        let parts: Vec<&str> = file.path.split('/').collect();
        if parts.len() == 1 {
            top_level.entry(parts[0].to_string()).or_insert(0);
        } else {
            let depth = parts.len().min(TREE_DEPTH_CAP);
            let prefix = parts[..depth - 1].join("/");
            *nested.entry(prefix).or_insert(0) += 1;
        }
    }

    let mut out = String::new();
    for (dir, count) in &nested {
        let depth = dir.matches('/').count();
        let indent = "  ".repeat(depth);
        let name = dir.rsplit('/').next().unwrap_or(dir);
        out.push_str(&format!("{indent}{name}/ ({count} files)\n"));
    }
    for name in top_level.keys() {
        out.push_str(&format!("{name}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandoverConfig;
    use crate::types::FileEntry;

    fn entry(path: &str, size: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            abs_path: std::path::PathBuf::from("/nonexistent").join(path),
            size,
            extension: path.rsplit('.').next().unwrap_or("").to_string(),
        }
    }

    fn ctx(files: Vec<FileEntry>) -> AnalysisContext {
        AnalysisContext {
            repo_root: std::path::PathBuf::from("/nonexistent"),
            files,
            config: HandoverConfig::default(),
        }
    }

    #[tokio::test]
    async fn histogram_and_largest() {
        let ctx = ctx(vec![
            entry("src/main.rs", 100),
            entry("src/lib.rs", 500),
            entry("docs/guide.md", 50),
        ]);
        let AnalyzerOutput::FileTree(data) = FileTreeAnalyzer.run(&ctx).await.unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(data.total_files, 3);
        assert_eq!(data.extensions.get("rs"), Some(&2));
        assert_eq!(data.extensions.get("md"), Some(&1));
        assert_eq!(data.largest[0].path, "src/lib.rs");
        assert_eq!(data.total_bytes, 650);
    }

    #[tokio::test]
    async fn tree_depth_capped() {
        let ctx = ctx(vec![
            entry("a/b/c/d/e/deep.rs", 1),
            entry("a/top.rs", 1),
            entry("README.md", 1),
        ]);
        let AnalyzerOutput::FileTree(data) = FileTreeAnalyzer.run(&ctx).await.unwrap() else {
            panic!("wrong variant");
        };
        // Paths deeper than three levels collapse into their level-2 prefix.
        assert!(data.tree.contains("b/"));
        assert!(!data.tree.contains("c/"));
        assert!(data.tree.contains("README.md"));
    }

    #[tokio::test]
    async fn empty_repo_yields_zeroes() {
        let ctx = ctx(vec![]);
        let AnalyzerOutput::FileTree(data) = FileTreeAnalyzer.run(&ctx).await.unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(data.total_files, 0);
        assert_eq!(data.total_dirs, 0);
        assert!(data.largest.is_empty());
    }
}
