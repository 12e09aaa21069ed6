//! Indicatif rendering of core progress events.
//!
//! The core emits a typed event stream and draws nothing; this sink consumes
//! it and keeps a single spinner updated with the current stage.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use handover_core::progress::ProgressEvent;

#[derive(Debug)]
pub struct ProgressRenderer {
    handle: JoinHandle<()>,
}

impl ProgressRenderer {
    /// Consume events until the channel closes.
    pub fn spawn(mut rx: mpsc::Receiver<ProgressEvent>, quiet: bool) -> Self {
        let handle = tokio::spawn(async move {
            let bar = if quiet {
                ProgressBar::hidden()
            } else {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.green} {msg}")
                        .expect("valid template"),
                );
                bar.enable_steady_tick(std::time::Duration::from_millis(120));
                bar
            };

            while let Some(event) = rx.recv().await {
                match event {
                    ProgressEvent::RunStarted { repo, static_only } => {
                        let mode = if static_only { " (static only)" } else { "" };
                        bar.set_message(format!("Analyzing {repo}{mode}"));
                    }
                    ProgressEvent::DiscoveryCompleted { file_count } => {
                        bar.set_message(format!("Discovered {file_count} files"));
                    }
                    ProgressEvent::AnalyzerStarted { name } => {
                        bar.set_message(format!("Running analyzer: {name}"));
                    }
                    ProgressEvent::AnalyzerFinished { name, success, .. } => {
                        if !success {
                            bar.println(format!("  analyzer {name} produced no data"));
                        }
                    }
                    ProgressEvent::ContextPacked {
                        files,
                        used_tokens,
                        budget,
                    } => {
                        bar.set_message(format!(
                            "Packed {files} files ({used_tokens}/{budget} tokens)"
                        ));
                    }
                    ProgressEvent::StepStarted { id } => {
                        bar.set_message(format!("Running {id}"));
                    }
                    ProgressEvent::StepRetry { id, .. } => {
                        bar.println(format!("  {id}: retrying with strict prompt"));
                    }
                    ProgressEvent::StepFailed { id, error } => {
                        bar.println(format!("  {id} failed: {error}"));
                    }
                    ProgressEvent::StepSkipped { id, reason } => {
                        bar.println(format!("  {id} skipped: {reason}"));
                    }
                    ProgressEvent::RoundDegraded { round, .. } => {
                        bar.println(format!("  {round} degraded to static data"));
                    }
                    ProgressEvent::CacheHit { round } => {
                        bar.println(format!("  {round} served from cache"));
                    }
                    ProgressEvent::CacheMigrated {
                        from_version,
                        to_version,
                    } => {
                        bar.println(format!(
                            "  cache migrated from v{from_version} to v{to_version}"
                        ));
                    }
                    ProgressEvent::CostWarning {
                        estimated_usd,
                        threshold_usd,
                    } => {
                        bar.println(format!(
                            "  warning: estimated cost ${estimated_usd:.2} exceeds ${threshold_usd:.2}"
                        ));
                    }
                    ProgressEvent::DocumentWritten { filename, status } => {
                        bar.set_message(format!("Wrote {filename} [{status}]"));
                    }
                    ProgressEvent::RunCompleted { .. } | ProgressEvent::StepCompleted { .. } => {}
                }
            }
            bar.finish_and_clear();
        });
        Self { handle }
    }

    /// Wait for the event channel to drain.
    pub async fn finish(self) {
        let _ = self.handle.await;
    }
}
