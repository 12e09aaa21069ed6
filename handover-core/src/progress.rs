//! Typed progress events emitted by the pipeline.
//!
//! The core draws no UI: events flow through a bounded channel injected into
//! the scheduler and round runner. The CLI subscribes with an indicatif
//! renderer; library callers can use [`ProgressSender::noop`] or drain the
//! channel themselves.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{DocumentStatus, Round};

/// Lifecycle events for a pipeline run, in causal order per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    RunStarted {
        repo: String,
        static_only: bool,
    },
    DiscoveryCompleted {
        file_count: usize,
    },
    AnalyzerStarted {
        name: String,
    },
    AnalyzerFinished {
        name: String,
        success: bool,
        elapsed_ms: u64,
    },
    ContextPacked {
        files: usize,
        used_tokens: u32,
        budget: u32,
    },
    StepStarted {
        id: String,
    },
    StepCompleted {
        id: String,
        duration_ms: u64,
    },
    StepFailed {
        id: String,
        error: String,
    },
    StepSkipped {
        id: String,
        reason: String,
    },
    StepRetry {
        id: String,
        reason: String,
    },
    RoundDegraded {
        round: Round,
        reasons: Vec<String>,
    },
    CacheHit {
        round: Round,
    },
    CacheMigrated {
        from_version: u32,
        to_version: u32,
    },
    CostWarning {
        estimated_usd: f64,
        threshold_usd: f64,
    },
    DocumentWritten {
        filename: String,
        status: DocumentStatus,
    },
    RunCompleted {
        duration_ms: u64,
        total_cost_usd: f64,
    },
}

/// Cloneable handle for emitting progress events.
///
/// Sends are best-effort: a full or closed channel drops the event rather
/// than blocking the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// Create a bounded event channel and its sender handle.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that discards every event.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_through_channel() {
        let (sender, mut rx) = ProgressSender::channel(8);
        sender.emit(ProgressEvent::StepStarted {
            id: "static-analysis".into(),
        });
        sender.emit(ProgressEvent::StepCompleted {
            id: "static-analysis".into(),
            duration_ms: 12,
        });
        drop(sender);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::StepStarted { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, ProgressEvent::StepCompleted { .. }));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn noop_sender_discards() {
        let sender = ProgressSender::noop();
        sender.emit(ProgressEvent::DiscoveryCompleted { file_count: 3 });
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (sender, _rx) = ProgressSender::channel(1);
        sender.emit(ProgressEvent::DiscoveryCompleted { file_count: 1 });
        // Second emit exceeds capacity; must not block or panic.
        sender.emit(ProgressEvent::DiscoveryCompleted { file_count: 2 });
    }

    #[test]
    fn event_serialization_is_tagged() {
        let event = ProgressEvent::CacheHit {
            round: Round::Modules,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "cache-hit");
        assert_eq!(json["round"], "modules");
    }
}
