//! The eight static analyzers and their coordinator.
//!
//! Each analyzer is an independent, I/O-bound producer of typed facts. The
//! coordinator fans them out with bounded concurrency and aggregates partial
//! results: a failed analyzer contributes an empty typed default for its
//! slot, and the combined [`StaticAnalysisResult`] always has all eight slots
//! populated.

pub mod dependencies;
pub mod docs;
pub mod env_refs;
pub mod file_tree;
pub mod git_history;
pub mod symbols;
pub mod test_frameworks;
pub mod todos;
pub mod traits;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub use dependencies::{DependencyAnalyzer, DependencyData};
pub use docs::{DocAnalyzer, DocData};
pub use env_refs::{EnvAnalyzer, EnvData};
pub use file_tree::{FileTreeAnalyzer, FileTreeData};
pub use git_history::{GitHistoryAnalyzer, GitHistoryData};
pub use symbols::{SymbolAnalyzer, SymbolData};
pub use test_frameworks::{TestFrameworkAnalyzer, TestFrameworkData};
pub use todos::{TodoAnalyzer, TodoData};
pub use traits::{AnalysisContext, Analyzer};

use crate::progress::{ProgressEvent, ProgressSender};

/// Typed output of one analyzer run.
#[derive(Debug, Clone)]
pub enum AnalyzerOutput {
    FileTree(FileTreeData),
    Dependencies(DependencyData),
    Git(GitHistoryData),
    Todos(TodoData),
    Env(EnvData),
    Symbols(SymbolData),
    Tests(TestFrameworkData),
    Docs(DocData),
}

/// The union of the eight analyzer outputs plus run metadata. Built once per
/// run; shared immutably by every downstream consumer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticAnalysisResult {
    pub file_tree: FileTreeData,
    pub dependencies: DependencyData,
    pub git: GitHistoryData,
    pub todos: TodoData,
    pub env: EnvData,
    pub symbols: SymbolData,
    pub tests: TestFrameworkData,
    pub docs: DocData,
    /// Every discovered repo-relative path, kept as validator ground truth
    /// independent of analyzer success.
    pub known_paths: PathSet,
    pub meta: AnalysisMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisMeta {
    pub file_count: usize,
    pub elapsed_ms: u64,
    /// Analyzer name → whether it completed successfully.
    pub success: BTreeMap<String, bool>,
}

impl StaticAnalysisResult {
    /// Whether a repo-relative path was discovered in this run.
    pub fn knows_path(&self, path: &str) -> bool {
        self.known_paths.contains(path)
    }

    pub fn analyzer_succeeded(&self, name: &str) -> bool {
        self.meta.success.get(name).copied().unwrap_or(false)
    }
}

// The discovered path set is carried alongside the analyzer slots so the
// claim validator has ground truth even when every analyzer failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSet {
    paths: std::collections::BTreeSet<String>,
}

impl PathSet {
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        let with_slash = format!("{}/", prefix.trim_end_matches('/'));
        self.paths
            .iter()
            .any(|p| p.starts_with(&with_slash) || p == prefix)
    }
}

impl FromIterator<String> for PathSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// Run the eight analyzers concurrently over a frozen context.
///
/// Never returns an error: failed analyzers are logged, flagged in metadata,
/// and contribute empty defaults.
pub async fn run_analyzers(
    ctx: Arc<AnalysisContext>,
    events: &ProgressSender,
) -> StaticAnalysisResult {
    let start = Instant::now();
    let analyzers: Vec<Arc<dyn Analyzer>> = vec![
        Arc::new(FileTreeAnalyzer),
        Arc::new(DependencyAnalyzer),
        Arc::new(GitHistoryAnalyzer),
        Arc::new(TodoAnalyzer),
        Arc::new(EnvAnalyzer),
        Arc::new(SymbolAnalyzer),
        Arc::new(TestFrameworkAnalyzer),
        Arc::new(DocAnalyzer),
    ];

    let semaphore = Arc::new(Semaphore::new(ctx.config.analysis.concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for analyzer in analyzers {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        let events = events.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let name = analyzer.name();
            events.emit(ProgressEvent::AnalyzerStarted { name: name.into() });
            let task_start = Instant::now();
            let outcome = analyzer.run(&ctx).await;
            let elapsed = task_start.elapsed();
            (name, outcome, elapsed)
        });
    }

    let mut result = StaticAnalysisResult {
        meta: AnalysisMeta {
            file_count: ctx.files.len(),
            ..Default::default()
        },
        ..Default::default()
    };
    result.known_paths = ctx.files.iter().map(|f| f.path.clone()).collect();

    while let Some(joined) = join_set.join_next().await {
        let (name, outcome, elapsed) = match joined {
            Ok(tuple) => tuple,
            Err(e) => {
                warn!(error = %e, "Analyzer task panicked");
                continue;
            }
        };
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(output) => {
                result.meta.success.insert(name.to_string(), true);
                events.emit(ProgressEvent::AnalyzerFinished {
                    name: name.into(),
                    success: true,
                    elapsed_ms,
                });
                result.fill(output);
            }
            Err(e) => {
                warn!(analyzer = name, error = %e, "Analyzer failed; slot left empty");
                result.meta.success.insert(name.to_string(), false);
                events.emit(ProgressEvent::AnalyzerFinished {
                    name: name.into(),
                    success: false,
                    elapsed_ms,
                });
            }
        }
    }

    result.meta.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        files = result.meta.file_count,
        elapsed_ms = result.meta.elapsed_ms,
        failed = result.meta.success.values().filter(|ok| !**ok).count(),
        "Static analysis complete"
    );
    result
}

impl StaticAnalysisResult {
    fn fill(&mut self, output: AnalyzerOutput) {
        match output {
            AnalyzerOutput::FileTree(data) => self.file_tree = data,
            AnalyzerOutput::Dependencies(data) => self.dependencies = data,
            AnalyzerOutput::Git(data) => self.git = data,
            AnalyzerOutput::Todos(data) => self.todos = data,
            AnalyzerOutput::Env(data) => self.env = data,
            AnalyzerOutput::Symbols(data) => self.symbols = data,
            AnalyzerOutput::Tests(data) => self.tests = data,
            AnalyzerOutput::Docs(data) => self.docs = data,
        }
    }
}
