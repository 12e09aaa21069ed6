//! Pipeline assembly and execution.
//!
//! Builds the job graph for a run: one static-analysis step, one step per
//! round required by the requested documents, and one render step depending
//! on the terminal rounds. Each round step is wrapped in a cache shim that
//! computes the cascade hash from the analysis fingerprint and every
//! upstream round hash, returning the cached result when present and
//! writing the fresh result otherwise.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use tracing::{info, warn};

use crate::analyze::{AnalysisContext, StaticAnalysisResult, run_analyzers};
use crate::cache::{RoundCache, analysis_fingerprint, output_hash, round_hash};
use crate::config::HandoverConfig;
use crate::context::budget::TokenBudget;
use crate::context::pack_context;
use crate::discover::discover_files;
use crate::error::{HandoverError, PipelineError};
use crate::llm::ProviderFacade;
use crate::llm::usage::UsageTracker;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::render::{RenderContext, write_documents};
use crate::rounds::compress::{DEFAULT_COMPRESSOR_BUDGET, compress};
use crate::rounds::runner::run_round;
use crate::rounds::{RoundExecutionResult, RoundInput, spec_for};
use crate::schedule::{CancelFlag, Scheduler, Step, StepFn};
use crate::types::{
    DocumentReport, FileEntry, PackedContext, QualityMetrics, Round, RoundContext, RoundSource,
    ValidationResult,
};

const STATIC_STEP_ID: &str = "static-analysis";
const RENDER_STEP_ID: &str = "render";
/// Pipeline-level concurrency; rounds serialize through their dependency
/// chain regardless.
const PIPELINE_CONCURRENCY: usize = 2;

/// Shared run state. Each slot is written exactly once by the step that
/// produces it and read thereafter by its dependents.
#[derive(Debug)]
pub struct RunState {
    pub repo_root: PathBuf,
    pub config: HandoverConfig,
    pub files: Vec<FileEntry>,
    pub facade: Option<ProviderFacade>,
    pub cache: RoundCache,
    pub events: ProgressSender,
    pub user_context: Option<String>,

    statics: OnceLock<Arc<StaticAnalysisResult>>,
    packed: OnceLock<Arc<PackedContext>>,
    fingerprint: OnceLock<String>,
    rounds: Mutex<BTreeMap<Round, RoundExecutionResult>>,
    hashes: Mutex<BTreeMap<Round, String>>,
    reports: Mutex<Vec<DocumentReport>>,
    tracker: Mutex<UsageTracker>,
    cache_hits: AtomicU32,
    cost_warned: AtomicBool,
}

/// Outcome of a full pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub documents: Vec<DocumentReport>,
    pub total_cost_usd: f64,
    pub cache_hits: u32,
    pub rounds_run: usize,
    pub file_count: usize,
    pub duration_ms: u64,
}

/// Run the full pipeline against a repository.
///
/// `facade` is injectable for tests; when `None` and LLM rounds are needed,
/// a provider is constructed from the config. Config and credential errors
/// abort before any I/O on the repository.
pub async fn run_pipeline(
    repo_root: &Path,
    config: HandoverConfig,
    facade: Option<ProviderFacade>,
    events: ProgressSender,
    cancel: CancelFlag,
) -> crate::error::Result<RunSummary> {
    let start = Instant::now();
    config.validate()?;

    let static_only = config.analysis.static_only;
    events.emit(ProgressEvent::RunStarted {
        repo: repo_root.display().to_string(),
        static_only,
    });

    let facade = if static_only {
        None
    } else {
        match facade {
            Some(facade) => Some(facade),
            None => {
                let provider = crate::llm::providers::create_provider(&config)?;
                let timeout = config
                    .timeout
                    .map(std::time::Duration::from_millis)
                    .unwrap_or_else(|| crate::llm::providers::default_timeout(config.provider));
                Some(ProviderFacade::new(
                    Arc::from(provider),
                    timeout,
                    config.auth_method,
                ))
            }
        }
    };

    let files = discover_files(repo_root, &config)?;
    events.emit(ProgressEvent::DiscoveryCompleted {
        file_count: files.len(),
    });

    let cache = RoundCache::open(repo_root, &config);
    if let Some((from, to)) = cache.migration {
        events.emit(ProgressEvent::CacheMigrated {
            from_version: from,
            to_version: to,
        });
    }

    let user_context = match &config.context {
        Some(path) => std::fs::read_to_string(repo_root.join(path)).ok(),
        None => None,
    };

    // Repositories with no source files skip the LLM rounds entirely.
    let has_sources = files
        .iter()
        .any(|f| crate::types::is_source_extension(&f.extension));
    let run_rounds = facade.is_some() && has_sources;
    let rounds_needed = if run_rounds { required_rounds() } else { Vec::new() };

    let model = facade.as_ref().map_or_else(String::new, |f| f.model_id().to_string());
    let output_dir = if config.output.dir.is_absolute() {
        config.output.dir.clone()
    } else {
        repo_root.join(&config.output.dir)
    };

    let state = Arc::new(RunState {
        repo_root: repo_root.to_path_buf(),
        config,
        files,
        facade,
        cache,
        events: events.clone(),
        user_context,
        statics: OnceLock::new(),
        packed: OnceLock::new(),
        fingerprint: OnceLock::new(),
        rounds: Mutex::new(BTreeMap::new()),
        hashes: Mutex::new(BTreeMap::new()),
        reports: Mutex::new(Vec::new()),
        tracker: Mutex::new(UsageTracker::new(model)),
        cache_hits: AtomicU32::new(0),
        cost_warned: AtomicBool::new(false),
    });

    let mut scheduler = Scheduler::new();
    scheduler.add_steps(assemble_steps(&rounds_needed, &output_dir))?;
    if let Some(error) = scheduler.validate().into_iter().next() {
        return Err(error.into());
    }

    let results = scheduler
        .execute(Arc::clone(&state), PIPELINE_CONCURRENCY, &events, &cancel)
        .await?;

    // An unwritable output directory is the one render failure that aborts.
    if let Some(render_result) = results.get(RENDER_STEP_ID) {
        if render_result.status == crate::schedule::StepStatus::Failed {
            return Err(HandoverError::Render(crate::error::RenderError::Document {
                document: "knowledge base".to_string(),
                message: render_result
                    .error
                    .clone()
                    .unwrap_or_else(|| "render failed".to_string()),
            }));
        }
    }

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let total_cost_usd = state.tracker.lock().expect("tracker lock").total_cost_usd();
    events.emit(ProgressEvent::RunCompleted {
        duration_ms,
        total_cost_usd,
    });

    let documents = state.reports.lock().expect("reports lock").clone();
    let rounds_run = state.rounds.lock().expect("rounds lock").len();
    Ok(RunSummary {
        documents,
        total_cost_usd,
        cache_hits: state.cache_hits.load(Ordering::Relaxed),
        rounds_run,
        file_count: state.files.len(),
        duration_ms,
    })
}

/// Rounds required by at least one of the fourteen documents.
fn required_rounds() -> Vec<Round> {
    let mut rounds: Vec<Round> = crate::render::documents::DOCUMENTS
        .iter()
        .flat_map(|def| def.required_rounds.iter().copied())
        .collect();
    rounds.sort();
    rounds.dedup();
    // A required round drags in its own dependencies.
    let mut closure: Vec<Round> = rounds
        .iter()
        .flat_map(|r| r.deps().iter().copied().chain(std::iter::once(*r)))
        .collect();
    closure.sort();
    closure.dedup();
    closure
}

/// Build the step graph: static analysis, the requested round steps, and a
/// render step depending on the terminal rounds (or on static analysis when
/// no rounds are requested).
fn assemble_steps(rounds: &[Round], output_dir: &Path) -> Vec<Step<RunState>> {
    let mut steps = Vec::new();
    steps.push(Step {
        id: STATIC_STEP_ID.to_string(),
        name: "Static analysis".to_string(),
        deps: Vec::new(),
        run: static_step(),
    });

    for &round in rounds {
        let mut deps = vec![STATIC_STEP_ID.to_string()];
        deps.extend(round.deps().iter().map(|d| d.step_id()));
        steps.push(Step {
            id: round.step_id(),
            name: round.title().to_string(),
            deps,
            run: round_step(round),
        });
    }

    let render_deps = if rounds.is_empty() {
        vec![STATIC_STEP_ID.to_string()]
    } else {
        // Terminal rounds: rounds no other requested round depends on.
        let mut terminal: Vec<Round> = rounds
            .iter()
            .copied()
            .filter(|r| !rounds.iter().any(|other| other.deps().contains(r)))
            .collect();
        if terminal.is_empty() {
            terminal = rounds.to_vec();
        }
        terminal.iter().map(|r| r.step_id()).collect()
    };
    steps.push(Step {
        id: RENDER_STEP_ID.to_string(),
        name: "Render documents".to_string(),
        deps: render_deps,
        run: render_step(output_dir.to_path_buf()),
    });

    steps
}

/// Static analysis, scoring, packing, and fingerprinting in one step: the
/// scorer and packer consume the frozen analyzer output directly.
fn static_step() -> StepFn<RunState> {
    Arc::new(|state: Arc<RunState>| {
        Box::pin(async move {
            let ctx = Arc::new(AnalysisContext {
                repo_root: state.repo_root.clone(),
                files: state.files.clone(),
                config: state.config.clone(),
            });
            let statics = run_analyzers(ctx, &state.events).await;

            let scored = crate::score::score_files(&state.files, &statics, &state.config);
            let max_context = state.config.context_window.max_tokens.unwrap_or_else(|| {
                state
                    .facade
                    .as_ref()
                    .map_or(200_000, ProviderFacade::max_context_tokens)
            });
            let budget = TokenBudget::for_provider(max_context).packer_budget();
            let packed = pack_context(&scored, budget, &state.config);
            state.events.emit(ProgressEvent::ContextPacked {
                files: packed.len(),
                used_tokens: packed.used,
                budget: packed.budget,
            });

            let fingerprint = analysis_fingerprint(&state.files);

            state
                .statics
                .set(Arc::new(statics))
                .map_err(|_| HandoverError::Pipeline(PipelineError::NotValidated))?;
            state
                .packed
                .set(Arc::new(packed))
                .map_err(|_| HandoverError::Pipeline(PipelineError::NotValidated))?;
            state
                .fingerprint
                .set(fingerprint)
                .map_err(|_| HandoverError::Pipeline(PipelineError::NotValidated))?;
            Ok(())
        })
    })
}

/// One LLM round wrapped in the cache shim.
fn round_step(round: Round) -> StepFn<RunState> {
    Arc::new(move |state: Arc<RunState>| {
        Box::pin(async move {
            let statics = Arc::clone(
                state
                    .statics
                    .get()
                    .ok_or(HandoverError::Pipeline(PipelineError::NotValidated))?,
            );
            let packed = Arc::clone(
                state
                    .packed
                    .get()
                    .ok_or(HandoverError::Pipeline(PipelineError::NotValidated))?,
            );
            let fingerprint = state
                .fingerprint
                .get()
                .ok_or(HandoverError::Pipeline(PipelineError::NotValidated))?
                .clone();
            let facade = state
                .facade
                .as_ref()
                .ok_or(HandoverError::Pipeline(PipelineError::NotValidated))?;

            // Cascade key: fingerprint plus the output hash of every
            // upstream round in declared order. The scheduler guarantees
            // those steps finished, so their output hashes are present.
            let prior_hashes: Vec<String> = {
                let hashes = state.hashes.lock().expect("hashes lock");
                round
                    .deps()
                    .iter()
                    .filter_map(|dep| hashes.get(dep).cloned())
                    .collect()
            };
            let hash = round_hash(round, facade.model_id(), &fingerprint, &prior_hashes);

            if let Some(entry) = state.cache.load(round, facade.model_id(), &hash) {
                state.events.emit(ProgressEvent::CacheHit { round });
                state.cache_hits.fetch_add(1, Ordering::Relaxed);
                state
                    .hashes
                    .lock()
                    .expect("hashes lock")
                    .insert(round, output_hash(&entry.output));
                let context = compress(&entry.output, DEFAULT_COMPRESSOR_BUDGET);
                let result = RoundExecutionResult {
                    round,
                    data: entry.output,
                    status: entry.status,
                    source: RoundSource::Cached,
                    validation: ValidationResult::default(),
                    quality: QualityMetrics::acceptable(),
                    usage: crate::llm::TokenUsage::default(),
                    cost_usd: 0.0,
                    context,
                    degraded_reasons: Vec::new(),
                };
                state.rounds.lock().expect("rounds lock").insert(round, result);
                return Ok(());
            }

            let prior: BTreeMap<Round, RoundContext> = {
                let rounds = state.rounds.lock().expect("rounds lock");
                round
                    .deps()
                    .iter()
                    .filter_map(|dep| rounds.get(dep).map(|r| (*dep, r.context.clone())))
                    .collect()
            };

            let spec = spec_for(round);
            let input = RoundInput {
                facade,
                statics: &statics,
                packed: &packed,
                prior: &prior,
                project: &state.config.project,
                user_context: state.user_context.as_deref(),
            };
            let result = run_round(spec.as_ref(), &input, &state.events).await;

            {
                let mut tracker = state.tracker.lock().expect("tracker lock");
                tracker.record(round, &result.usage);
                let total = tracker.total_cost_usd();
                if let Some(threshold) = state.config.cost_warning_threshold {
                    if total > threshold && !state.cost_warned.swap(true, Ordering::SeqCst) {
                        state.events.emit(ProgressEvent::CostWarning {
                            estimated_usd: total,
                            threshold_usd: threshold,
                        });
                    }
                }
            }

            state
                .cache
                .store(round, facade.model_id(), &hash, result.status, &result.data);
            state
                .hashes
                .lock()
                .expect("hashes lock")
                .insert(round, output_hash(&result.data));
            state.rounds.lock().expect("rounds lock").insert(round, result);
            Ok(())
        })
    })
}

fn render_step(output_dir: PathBuf) -> StepFn<RunState> {
    Arc::new(move |state: Arc<RunState>| {
        let output_dir = output_dir.clone();
        Box::pin(async move {
            let statics = state
                .statics
                .get()
                .ok_or(HandoverError::Pipeline(PipelineError::NotValidated))?;
            let rounds = state.rounds.lock().expect("rounds lock").clone();

            let ctx = RenderContext {
                statics,
                rounds: &rounds,
                config: &state.config,
                generated_at: chrono::Utc::now(),
            };
            let reports = write_documents(&ctx, &output_dir, &state.events)?;
            let not_generated = reports
                .iter()
                .filter(|r| r.status == crate::types::DocumentStatus::NotGenerated)
                .count();
            if not_generated > 0 {
                warn!(count = not_generated, "Some documents were not generated");
            }
            info!(dir = %output_dir.display(), "Knowledge base written");
            *state.reports.lock().expect("reports lock") = reports;
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_six_rounds_required_by_documents() {
        assert_eq!(required_rounds(), Round::ALL.to_vec());
    }

    #[test]
    fn step_graph_shape_with_rounds() {
        let steps = assemble_steps(&Round::ALL, Path::new("/tmp/out"));
        // static + 6 rounds + render
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0].id, STATIC_STEP_ID);

        let render = steps.last().unwrap();
        assert_eq!(render.id, RENDER_STEP_ID);
        // Only round 6 is terminal.
        assert_eq!(render.deps, vec!["ai-round-6".to_string()]);

        let round2 = steps.iter().find(|s| s.id == "ai-round-2").unwrap();
        assert_eq!(
            round2.deps,
            vec![STATIC_STEP_ID.to_string(), "ai-round-1".to_string()]
        );
    }

    #[test]
    fn step_graph_shape_without_rounds() {
        let steps = assemble_steps(&[], Path::new("/tmp/out"));
        assert_eq!(steps.len(), 2);
        let render = steps.last().unwrap();
        assert_eq!(render.deps, vec![STATIC_STEP_ID.to_string()]);
    }

    #[tokio::test]
    async fn static_only_run_produces_documents() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo.path().join("src")).unwrap();
        std::fs::write(repo.path().join("src/main.rs"), "fn main() {}\n").unwrap();

        let config = HandoverConfig {
            analysis: crate::config::AnalysisSection {
                static_only: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let summary = run_pipeline(
            repo.path(),
            config,
            None,
            ProgressSender::noop(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.documents.len(), 14);
        assert_eq!(summary.rounds_run, 0);
        assert!((summary.total_cost_usd - 0.0).abs() < f64::EPSILON);
        assert!(repo.path().join("handover/00-INDEX.md").exists());
    }
}
