//! Dependency-ordered step scheduler.
//!
//! Steps declare their dependencies by id; execution honors them with
//! deterministic ordering (the ready queue is seeded and drained in
//! registration order), a concurrency cap, and partial-failure semantics: a
//! failed step never aborts the run, but every transitive dependent is
//! marked skipped with a referential reason.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::progress::{ProgressEvent, ProgressSender};

pub type StepId = String;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub type StepFn<C> = Arc<dyn Fn(Arc<C>) -> BoxFuture<crate::error::Result<()>> + Send + Sync>;

/// A schedulable unit of work. Data flows through the shared context `C`,
/// not through step return values.
pub struct Step<C> {
    pub id: StepId,
    pub name: String,
    pub deps: Vec<StepId>,
    pub run: StepFn<C>,
}

impl<C> std::fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("deps", &self.deps)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub status: StepStatus,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Cooperative cancellation: the scheduler stops dispatching new steps and
/// awaits in-flight ones.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Scheduler<C> {
    steps: Vec<Step<C>>,
    ids: HashSet<StepId>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            ids: HashSet::new(),
        }
    }
}

impl<C: Send + Sync + 'static> Scheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register steps; duplicate ids are rejected.
    pub fn add_steps(&mut self, steps: Vec<Step<C>>) -> crate::error::Result<()> {
        for step in steps {
            if !self.ids.insert(step.id.clone()) {
                return Err(PipelineError::DuplicateStep(step.id).into());
            }
            self.steps.push(step);
        }
        Ok(())
    }

    /// Detect references to unknown ids and dependency cycles.
    pub fn validate(&self) -> Vec<PipelineError> {
        let mut errors = Vec::new();

        for step in &self.steps {
            for dep in &step.deps {
                if !self.ids.contains(dep) {
                    errors.push(PipelineError::UnknownDependency {
                        step: step.id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }
        if !errors.is_empty() {
            return errors;
        }

        // Kahn's algorithm: if the in-degree reduction cannot empty the
        // graph, the remainder is cyclic.
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            indegree.entry(&step.id).or_insert(0);
            for dep in &step.deps {
                *indegree.entry(&step.id).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(&step.id);
            }
        }

        let mut queue: VecDeque<&str> = self
            .steps
            .iter()
            .filter(|s| indegree[s.id.as_str()] == 0)
            .map(|s| s.id.as_str())
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in dependents.get(id).into_iter().flatten() {
                let entry = indegree.get_mut(dependent).expect("registered step");
                *entry -= 1;
                if *entry == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if visited < self.steps.len() {
            let mut cyclic: Vec<&str> = indegree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(id, _)| *id)
                .collect();
            cyclic.sort_unstable();
            errors.push(PipelineError::Cycle(cyclic.join(", ")));
        }

        errors
    }

    /// Execute all steps. Returns per-step results; only a validation
    /// failure is an error.
    pub async fn execute(
        &self,
        ctx: Arc<C>,
        concurrency: usize,
        events: &ProgressSender,
        cancel: &CancelFlag,
    ) -> crate::error::Result<BTreeMap<StepId, StepResult>> {
        if let Some(error) = self.validate().into_iter().next() {
            return Err(error.into());
        }

        let index: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        let mut pending_deps: Vec<usize> = vec![0; self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            pending_deps[i] = step.deps.len();
            for dep in &step.deps {
                dependents[index[dep.as_str()]].push(i);
            }
        }

        let mut results: BTreeMap<StepId, StepResult> = BTreeMap::new();
        // Registration order breaks ties deterministically.
        let mut ready: VecDeque<usize> = (0..self.steps.len())
            .filter(|&i| pending_deps[i] == 0)
            .collect();
        let mut running: JoinSet<(usize, crate::error::Result<()>, u64)> = JoinSet::new();

        loop {
            while running.len() < concurrency.max(1) && !cancel.is_cancelled() {
                let Some(i) = ready.pop_front() else { break };
                let step = &self.steps[i];
                events.emit(ProgressEvent::StepStarted {
                    id: step.id.clone(),
                });
                info!(step = %step.id, "Step started");
                let run = Arc::clone(&step.run);
                let ctx = Arc::clone(&ctx);
                running.spawn(async move {
                    let start = Instant::now();
                    let outcome = run(ctx).await;
                    let duration = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                    (i, outcome, duration)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (i, outcome, duration_ms) = match joined {
                Ok(tuple) => tuple,
                Err(e) => {
                    warn!(error = %e, "Step task panicked");
                    continue;
                }
            };
            let step = &self.steps[i];

            match outcome {
                Ok(()) => {
                    events.emit(ProgressEvent::StepCompleted {
                        id: step.id.clone(),
                        duration_ms,
                    });
                    results.insert(
                        step.id.clone(),
                        StepResult {
                            status: StepStatus::Completed,
                            error: None,
                            duration_ms,
                        },
                    );
                    for &dependent in &dependents[i] {
                        pending_deps[dependent] -= 1;
                        if pending_deps[dependent] == 0
                            && !results.contains_key(&self.steps[dependent].id)
                        {
                            ready.push_back(dependent);
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(step = %step.id, error = %message, "Step failed");
                    events.emit(ProgressEvent::StepFailed {
                        id: step.id.clone(),
                        error: message.clone(),
                    });
                    results.insert(
                        step.id.clone(),
                        StepResult {
                            status: StepStatus::Failed,
                            error: Some(message),
                            duration_ms,
                        },
                    );
                    self.skip_dependents(i, &dependents, &mut results, events);
                }
            }
        }

        // Steps never dispatched (cancellation) are reported as skipped.
        for step in &self.steps {
            results.entry(step.id.clone()).or_insert_with(|| {
                events.emit(ProgressEvent::StepSkipped {
                    id: step.id.clone(),
                    reason: "run cancelled".to_string(),
                });
                StepResult {
                    status: StepStatus::Skipped,
                    error: Some("run cancelled".to_string()),
                    duration_ms: 0,
                }
            });
        }

        Ok(results)
    }

    /// Transitively mark every dependent of `failed` as skipped, with a
    /// reason referencing the failed step.
    fn skip_dependents(
        &self,
        failed: usize,
        dependents: &[Vec<usize>],
        results: &mut BTreeMap<StepId, StepResult>,
        events: &ProgressSender,
    ) {
        let failed_id = self.steps[failed].id.clone();
        let mut queue: VecDeque<usize> = dependents[failed].iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            let id = &self.steps[i].id;
            if results.contains_key(id) {
                continue;
            }
            let reason = format!("dependency '{failed_id}' failed");
            events.emit(ProgressEvent::StepSkipped {
                id: id.clone(),
                reason: reason.clone(),
            });
            results.insert(
                id.clone(),
                StepResult {
                    status: StepStatus::Skipped,
                    error: Some(reason),
                    duration_ms: 0,
                },
            );
            queue.extend(dependents[i].iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Trace {
        order: Mutex<Vec<String>>,
    }

    fn step(id: &str, deps: &[&str], fail: bool) -> Step<Trace> {
        let id_owned = id.to_string();
        Step {
            id: id.to_string(),
            name: id.to_string(),
            deps: deps.iter().map(|d| (*d).to_string()).collect(),
            run: Arc::new(move |ctx: Arc<Trace>| {
                let id = id_owned.clone();
                Box::pin(async move {
                    ctx.order.lock().unwrap().push(id);
                    if fail {
                        Err(crate::error::PipelineError::NotValidated.into())
                    } else {
                        Ok(())
                    }
                })
            }),
        }
    }

    #[tokio::test]
    async fn dependencies_complete_before_dependents() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add_steps(vec![
                step("render", &["r1", "r2"], false),
                step("r2", &["r1"], false),
                step("r1", &["static"], false),
                step("static", &[], false),
            ])
            .unwrap();

        let ctx = Arc::new(Trace::default());
        let results = scheduler
            .execute(Arc::clone(&ctx), 4, &ProgressSender::noop(), &CancelFlag::new())
            .await
            .unwrap();

        let order = ctx.order.lock().unwrap().clone();
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos("static") < pos("r1"));
        assert!(pos("r1") < pos("r2"));
        assert!(pos("r2") < pos("render"));
        assert!(
            results
                .values()
                .all(|r| r.status == StepStatus::Completed)
        );
    }

    #[tokio::test]
    async fn duplicate_ids_rejected() {
        let mut scheduler = Scheduler::new();
        let err = scheduler
            .add_steps(vec![step("a", &[], false), step("a", &[], false)])
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn validate_detects_unknown_deps() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add_steps(vec![step("a", &["ghost"], false)])
            .unwrap();
        let errors = scheduler.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn validate_detects_cycles_and_blocks_execute() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add_steps(vec![
                step("a", &["c"], false),
                step("b", &["a"], false),
                step("c", &["b"], false),
            ])
            .unwrap();
        let errors = scheduler.validate();
        assert!(matches!(errors[0], PipelineError::Cycle(_)));

        let ctx = Arc::new(Trace::default());
        let err = scheduler
            .execute(Arc::clone(&ctx), 2, &ProgressSender::noop(), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cycle") || err.to_string().contains("Cycle"));
        // Nothing executed.
        assert!(ctx.order.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_skips_transitive_dependents_only() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add_steps(vec![
                step("root", &[], false),
                step("bad", &["root"], true),
                step("child", &["bad"], false),
                step("grandchild", &["child"], false),
                step("sibling", &["root"], false),
            ])
            .unwrap();

        let ctx = Arc::new(Trace::default());
        let results = scheduler
            .execute(Arc::clone(&ctx), 1, &ProgressSender::noop(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(results["root"].status, StepStatus::Completed);
        assert_eq!(results["bad"].status, StepStatus::Failed);
        assert_eq!(results["child"].status, StepStatus::Skipped);
        assert_eq!(results["grandchild"].status, StepStatus::Skipped);
        assert_eq!(results["sibling"].status, StepStatus::Completed);
        assert!(
            results["child"]
                .error
                .as_deref()
                .unwrap()
                .contains("'bad' failed")
        );
        // Skipped steps never ran.
        let order = ctx.order.lock().unwrap().clone();
        assert!(!order.contains(&"child".to_string()));
        assert!(!order.contains(&"grandchild".to_string()));
    }

    #[tokio::test]
    async fn registration_order_breaks_ties() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add_steps(vec![
                step("z", &[], false),
                step("a", &[], false),
                step("m", &[], false),
            ])
            .unwrap();

        let ctx = Arc::new(Trace::default());
        scheduler
            .execute(Arc::clone(&ctx), 1, &ProgressSender::noop(), &CancelFlag::new())
            .await
            .unwrap();

        let order = ctx.order.lock().unwrap().clone();
        assert_eq!(order, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let mut scheduler = Scheduler::new();
        let cancel = CancelFlag::new();
        let cancel_inner = cancel.clone();

        let first: Step<Trace> = Step {
            id: "first".into(),
            name: "first".into(),
            deps: vec![],
            run: Arc::new(move |ctx: Arc<Trace>| {
                let cancel = cancel_inner.clone();
                Box::pin(async move {
                    ctx.order.lock().unwrap().push("first".into());
                    cancel.cancel();
                    Ok(())
                })
            }),
        };
        scheduler.add_steps(vec![first]).unwrap();
        scheduler
            .add_steps(vec![step("second", &["first"], false)])
            .unwrap();

        let ctx = Arc::new(Trace::default());
        let results = scheduler
            .execute(Arc::clone(&ctx), 1, &ProgressSender::noop(), &cancel)
            .await
            .unwrap();

        assert_eq!(results["first"].status, StepStatus::Completed);
        assert_eq!(results["second"].status, StepStatus::Skipped);
        assert_eq!(
            results["second"].error.as_deref(),
            Some("run cancelled")
        );
    }
}
