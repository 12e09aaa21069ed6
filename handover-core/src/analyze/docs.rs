use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::types::is_source_extension;

use super::AnalyzerOutput;
use super::traits::{AnalysisContext, Analyzer};

/// Inline documentation coverage is sampled from at most this many files.
const COVERAGE_SAMPLE_CAP: usize = 100;

/// Documentation presence and coverage facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocData {
    pub readme: Option<String>,
    /// First heading or paragraph of the README.
    pub readme_summary: Option<String>,
    pub docs_folders: Vec<String>,
    pub markdown_files: Vec<String>,
    /// Fraction of sampled source files with any doc comment, 0.0–1.0.
    pub inline_doc_coverage: f64,
    pub sampled_files: usize,
}

#[derive(Debug, Default)]
pub struct DocAnalyzer;

#[async_trait::async_trait]
impl Analyzer for DocAnalyzer {
    fn name(&self) -> &'static str {
        "docs"
    }

    #[instrument(skip_all, name = "doc_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        let mut data = DocData::default();

        for file in &ctx.files {
            let basename = file.path.rsplit('/').next().unwrap_or(&file.path);
            if basename.eq_ignore_ascii_case("README.md")
                || basename.eq_ignore_ascii_case("README.rst")
                || basename.eq_ignore_ascii_case("README")
            {
                // Prefer the shortest path (repo root README).
                if data
                    .readme
                    .as_ref()
                    .is_none_or(|existing| file.path.len() < existing.len())
                {
                    data.readme = Some(file.path.clone());
                }
            }
            if file.extension == "md" {
                data.markdown_files.push(file.path.clone());
            }
            if let Some((dir, _)) = file.path.split_once('/') {
                if (dir == "docs" || dir == "doc") && !data.docs_folders.contains(&dir.to_string())
                {
                    data.docs_folders.push(dir.to_string());
                }
            }
        }
        data.markdown_files.sort();

        if let Some(readme) = &data.readme {
            if let Some(entry) = ctx.files.iter().find(|f| &f.path == readme) {
                if let Ok(text) = std::fs::read_to_string(&entry.abs_path) {
                    data.readme_summary = summarize_readme(&text);
                }
            }
        }

        let mut sampled = 0usize;
        let mut documented = 0usize;
        for file in ctx
            .content_files()
            .filter(|f| is_source_extension(&f.extension))
            .take(COVERAGE_SAMPLE_CAP)
        {
            let Ok(text) = std::fs::read_to_string(&file.abs_path) else {
                continue;
            };
            sampled += 1;
            if has_doc_comment(&text, &file.extension) {
                documented += 1;
            }
        }
        data.sampled_files = sampled;
        data.inline_doc_coverage = if sampled == 0 {
            0.0
        } else {
            documented as f64 / sampled as f64
        };

        Ok(AnalyzerOutput::Docs(data))
    }
}


fn has_doc_comment(text: &str, ext: &str) -> bool {
    match ext {
        "rs" => text.contains("///") || text.contains("//!"),
        "py" => text.contains("\"\"\""),
        "go" => text
            .lines()
            .zip(text.lines().skip(1))
            .any(|(a, b)| a.trim_start().starts_with("//") && b.trim_start().starts_with("func ")),
        _ => text.contains("/**"),
    }
}

/// First non-heading paragraph of a README, trimmed to one line.
fn summarize_readme(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("!["))
        .map(|l| l.to_string())
}
