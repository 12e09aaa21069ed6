//! Document rendering.
//!
//! Fourteen Markdown documents, `00-INDEX.md` through `13-DEPLOYMENT.md`,
//! each carrying YAML front matter with a generation timestamp and a status
//! that degrades gracefully: `full` when every required round completed,
//! `partial` when some degraded, `static-only` when the document rests on
//! analyzer data alone, `not-generated` when its renderer failed. A failing
//! document never stops its siblings; only an unwritable output directory is
//! fatal.

pub mod documents;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::analyze::StaticAnalysisResult;
use crate::config::HandoverConfig;
use crate::error::{HandoverError, RenderError};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::rounds::RoundExecutionResult;
use crate::types::{DocumentReport, DocumentStatus, Round, RoundStatus};

/// Everything a document renderer may read.
#[derive(Debug)]
pub struct RenderContext<'a> {
    pub statics: &'a StaticAnalysisResult,
    pub rounds: &'a BTreeMap<Round, RoundExecutionResult>,
    pub config: &'a HandoverConfig,
    pub generated_at: DateTime<Utc>,
}

impl RenderContext<'_> {
    /// Round data if the round ran (ok, degraded, or cached).
    pub fn round(&self, round: Round) -> Option<&RoundExecutionResult> {
        self.rounds.get(&round)
    }
}

/// A document definition: filename, title, the rounds it needs, and its body
/// renderer.
pub struct DocumentDef {
    pub filename: &'static str,
    pub title: &'static str,
    pub required_rounds: &'static [Round],
    pub render: fn(&RenderContext<'_>) -> Result<String, String>,
}

impl std::fmt::Debug for DocumentDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentDef")
            .field("filename", &self.filename)
            .finish()
    }
}

/// Compute a document's status and reason from round availability.
pub fn document_status(
    def: &DocumentDef,
    rounds: &BTreeMap<Round, RoundExecutionResult>,
) -> (DocumentStatus, String) {
    if def.required_rounds.is_empty() {
        return (
            DocumentStatus::StaticOnly,
            "generated from static analysis".to_string(),
        );
    }

    let mut missing = Vec::new();
    let mut degraded = Vec::new();
    for round in def.required_rounds {
        match rounds.get(round) {
            None => missing.push(round.to_string()),
            Some(result) if result.status == RoundStatus::Degraded => {
                degraded.push(round.to_string());
            }
            Some(_) => {}
        }
    }

    if !missing.is_empty() {
        (
            DocumentStatus::StaticOnly,
            format!("{} did not run", missing.join(", ")),
        )
    } else if !degraded.is_empty() {
        (
            DocumentStatus::Partial,
            format!("{} fell back to static data", degraded.join(", ")),
        )
    } else {
        (DocumentStatus::Full, "all rounds completed".to_string())
    }
}

/// YAML front matter carried by every document.
pub fn front_matter(
    title: &str,
    generated_at: DateTime<Utc>,
    status: DocumentStatus,
    reason: &str,
) -> String {
    format!(
        "---\ntitle: {title}\ngenerated: {}\nstatus: {status}\nreason: {reason}\n---\n\n",
        generated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )
}

/// Render and write all fourteen documents. Returns one report per document,
/// INDEX first. Only output-directory creation failures abort.
pub fn write_documents(
    ctx: &RenderContext<'_>,
    output_dir: &Path,
    events: &ProgressSender,
) -> crate::error::Result<Vec<DocumentReport>> {
    std::fs::create_dir_all(output_dir).map_err(|source| {
        HandoverError::Render(RenderError::OutputDir {
            path: output_dir.display().to_string(),
            source,
        })
    })?;

    let mut reports = Vec::new();
    for def in documents::DOCUMENTS {
        let (mut status, mut reason) = document_status(def, ctx.rounds);

        let body = match (def.render)(ctx) {
            Ok(body) => body,
            Err(message) => {
                warn!(document = def.filename, error = %message, "Document renderer failed");
                status = DocumentStatus::NotGenerated;
                reason = message;
                String::from("_This document could not be generated._\n")
            }
        };

        let content = format!(
            "{}# {}\n\n{body}",
            front_matter(def.title, ctx.generated_at, status, &reason),
            def.title
        );
        if let Err(e) = std::fs::write(output_dir.join(def.filename), content) {
            warn!(document = def.filename, error = %e, "Document write failed");
            status = DocumentStatus::NotGenerated;
            reason = e.to_string();
        }

        events.emit(ProgressEvent::DocumentWritten {
            filename: def.filename.to_string(),
            status,
        });
        reports.push(DocumentReport {
            filename: def.filename.to_string(),
            title: def.title.to_string(),
            status,
            reason,
        });
    }

    // INDEX aggregates the sibling statuses, so it renders last.
    let index = documents::render_index(ctx, &reports);
    let index_status = DocumentStatus::StaticOnly;
    let index_reason = "aggregated index".to_string();
    let index_content = format!(
        "{}# Knowledge Base Index\n\n{index}",
        front_matter("Index", ctx.generated_at, index_status, &index_reason)
    );
    if let Err(e) = std::fs::write(output_dir.join(documents::INDEX_FILENAME), index_content) {
        warn!(error = %e, "Index write failed");
    }
    events.emit(ProgressEvent::DocumentWritten {
        filename: documents::INDEX_FILENAME.to_string(),
        status: index_status,
    });
    reports.insert(
        0,
        DocumentReport {
            filename: documents::INDEX_FILENAME.to_string(),
            title: "Index".to_string(),
            status: index_status,
            reason: index_reason,
        },
    );

    info!(documents = reports.len(), "Documents written");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualityMetrics, RoundSource, ValidationResult};

    fn round_result(round: Round, status: RoundStatus) -> RoundExecutionResult {
        RoundExecutionResult {
            round,
            data: serde_json::json!({}),
            status,
            source: RoundSource::Llm,
            validation: ValidationResult::default(),
            quality: QualityMetrics::acceptable(),
            usage: crate::llm::TokenUsage::default(),
            cost_usd: 0.0,
            context: crate::types::RoundContext::default(),
            degraded_reasons: Vec::new(),
        }
    }

    fn overview_def() -> &'static DocumentDef {
        documents::DOCUMENTS
            .iter()
            .find(|d| d.filename == "01-OVERVIEW.md")
            .unwrap()
    }

    #[test]
    fn status_full_when_rounds_ok() {
        let mut rounds = BTreeMap::new();
        rounds.insert(Round::Overview, round_result(Round::Overview, RoundStatus::Ok));
        let (status, _) = document_status(overview_def(), &rounds);
        assert_eq!(status, DocumentStatus::Full);
    }

    #[test]
    fn status_partial_when_degraded() {
        let mut rounds = BTreeMap::new();
        rounds.insert(
            Round::Overview,
            round_result(Round::Overview, RoundStatus::Degraded),
        );
        let (status, reason) = document_status(overview_def(), &rounds);
        assert_eq!(status, DocumentStatus::Partial);
        assert!(reason.contains("round 1"));
    }

    #[test]
    fn status_static_only_when_rounds_missing() {
        let rounds = BTreeMap::new();
        let (status, _) = document_status(overview_def(), &rounds);
        assert_eq!(status, DocumentStatus::StaticOnly);
    }

    #[test]
    fn front_matter_shape() {
        let fm = front_matter(
            "Overview",
            Utc::now(),
            DocumentStatus::Full,
            "all rounds completed",
        );
        assert!(fm.starts_with("---\n"));
        assert!(fm.contains("status: full"));
        assert!(fm.contains("generated: "));
        assert!(fm.ends_with("---\n\n"));
    }

    #[test]
    fn fourteen_documents_written() {
        let dir = tempfile::tempdir().unwrap();
        let statics = StaticAnalysisResult::default();
        let rounds = BTreeMap::new();
        let config = HandoverConfig::default();
        let ctx = RenderContext {
            statics: &statics,
            rounds: &rounds,
            config: &config,
            generated_at: Utc::now(),
        };

        let reports = write_documents(&ctx, dir.path(), &ProgressSender::noop()).unwrap();
        assert_eq!(reports.len(), 14);
        assert_eq!(reports[0].filename, "00-INDEX.md");

        let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(written.len(), 14);

        let index = std::fs::read_to_string(dir.path().join("00-INDEX.md")).unwrap();
        assert!(index.contains("01-OVERVIEW.md"));
        assert!(index.contains("static-only"));
    }

    #[test]
    fn unwritable_output_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "a file, not a directory").unwrap();

        let statics = StaticAnalysisResult::default();
        let rounds = BTreeMap::new();
        let config = HandoverConfig::default();
        let ctx = RenderContext {
            statics: &statics,
            rounds: &rounds,
            config: &config,
            generated_at: Utc::now(),
        };
        assert!(write_documents(&ctx, &blocked, &ProgressSender::noop()).is_err());
    }
}
