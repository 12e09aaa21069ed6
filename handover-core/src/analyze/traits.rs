use std::path::PathBuf;

use crate::config::HandoverConfig;
use crate::types::FileEntry;

use super::AnalyzerOutput;

/// Frozen, read-only input shared by all analyzers in a run.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub repo_root: PathBuf,
    pub files: Vec<FileEntry>,
    pub config: HandoverConfig,
}

impl AnalysisContext {
    /// Files eligible for content reads (size and binary policy applied).
    pub fn content_files(&self) -> impl Iterator<Item = &FileEntry> {
        let max = self.config.analysis.max_file_size;
        self.files.iter().filter(move |f| f.content_eligible(max))
    }
}

/// Common interface for the eight static analyzers.
///
/// Implementations never panic on malformed repository content; they log and
/// return partial data. A returned error only marks this analyzer's slot as
/// failed — the coordinator substitutes an empty typed default.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    /// Stable name used in metadata flags and progress events.
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput>;
}
