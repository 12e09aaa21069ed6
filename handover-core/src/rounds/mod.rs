//! The six LLM analysis rounds.
//!
//! Each round declares a schema, a prompt builder, quality thresholds, a
//! claim extractor, and a static-only fallback. The generic lifecycle lives
//! in [`runner`]; deterministic output compression in [`compress`].

pub mod architecture;
pub mod compress;
pub mod conventions;
pub mod deployment;
pub mod features;
pub mod modules;
pub mod overview;
pub mod quality;
pub mod runner;
pub mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::StaticAnalysisResult;
use crate::config::ProjectSection;
use crate::llm::schema::ResponseSchema;
use crate::llm::{ProviderFacade, TokenUsage};
use crate::types::{
    PackedContext, QualityMetrics, Round, RoundContext, RoundSource, RoundStatus, Tier,
    ValidationResult,
};

use validate::Claim;

/// Typed bundle of everything a round consumes.
#[derive(Debug)]
pub struct RoundInput<'a> {
    pub facade: &'a ProviderFacade,
    pub statics: &'a StaticAnalysisResult,
    pub packed: &'a PackedContext,
    /// Compressed contexts of this round's declared dependencies.
    pub prior: &'a BTreeMap<Round, RoundContext>,
    pub project: &'a ProjectSection,
    pub user_context: Option<&'a str>,
}

/// Result of executing one round. Produced exactly once per executed step;
/// `status == Degraded` implies the data came from the fallback builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundExecutionResult {
    pub round: Round,
    pub data: Value,
    pub status: RoundStatus,
    pub source: RoundSource,
    pub validation: ValidationResult,
    pub quality: QualityMetrics,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub context: RoundContext,
    pub degraded_reasons: Vec<String>,
}

/// Behavior one round contributes to the generic runner.
pub trait RoundSpec: Send + Sync {
    fn round(&self) -> Round;

    fn schema(&self) -> ResponseSchema;

    fn build_prompt(&self, input: &RoundInput<'_>) -> String;

    /// Round-specific acceptability thresholds.
    fn quality(&self, data: &Value) -> QualityMetrics;

    /// Factual claims to check against the static result. Narrative content
    /// carries no claims.
    fn claims(&self, data: &Value) -> Vec<Claim>;

    /// Minimally-valid typed output from static analysis only. Never
    /// fabricates: unavailable sections are explicitly empty or `unknown`.
    fn fallback(&self, statics: &StaticAnalysisResult) -> Value;
}

/// The factory for a round's spec.
pub fn spec_for(round: Round) -> Box<dyn RoundSpec> {
    match round {
        Round::Overview => Box::new(overview::OverviewRound),
        Round::Modules => Box::new(modules::ModulesRound),
        Round::Features => Box::new(features::FeaturesRound),
        Round::Architecture => Box::new(architecture::ArchitectureRound),
        Round::Conventions => Box::new(conventions::ConventionsRound),
        Round::Deployment => Box::new(deployment::DeploymentRound),
    }
}

// ── Shared prompt fragments ────────────────────────────────────────

/// Project metadata block for prompts.
pub(crate) fn project_block(input: &RoundInput<'_>) -> String {
    let mut out = String::from("## Project\n");
    if let Some(name) = &input.project.name {
        out.push_str(&format!("Name: {name}\n"));
    }
    if let Some(description) = &input.project.description {
        out.push_str(&format!("Description: {description}\n"));
    }
    if let Some(domain) = &input.project.domain {
        out.push_str(&format!("Domain: {domain}\n"));
    }
    if let Some(context) = input.user_context {
        out.push_str("\n## Additional context from the team\n");
        out.push_str(context);
        out.push('\n');
    }
    out
}

/// Compressed prior-round contexts, in round order.
pub(crate) fn prior_block(input: &RoundInput<'_>) -> String {
    let mut out = String::new();
    for (round, context) in input.prior {
        out.push_str(&format!("## Findings from {round}\n"));
        if !context.modules.is_empty() {
            out.push_str(&format!("Modules: {}\n", context.modules.join(", ")));
        }
        for finding in &context.findings {
            out.push_str(&format!("- {finding}\n"));
        }
        for relationship in &context.relationships {
            out.push_str(&format!("- {relationship}\n"));
        }
        for question in &context.open_questions {
            out.push_str(&format!("? {question}\n"));
        }
        out.push('\n');
    }
    out
}

/// The packed repository context rendered for the prompt.
pub(crate) fn packed_block(packed: &PackedContext) -> String {
    let mut out = String::from("## Repository files\n");
    for file in packed.files() {
        let header = match (&file.section, file.tier) {
            (Some(section), _) => format!("### {} — {section}\n", file.path),
            (None, Tier::Signatures) => format!("### {} (signatures)\n", file.path),
            (None, _) => format!("### {}\n", file.path),
        };
        out.push_str(&header);
        out.push_str("```\n");
        out.push_str(&file.content);
        if !file.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
    }
    out
}

/// Standard response-format footer.
pub(crate) fn format_block(schema: &ResponseSchema) -> String {
    format!(
        "## Response format\nRespond with a single JSON object, no prose:\n{}\n\
         Only reference file paths that appear in the repository files above.\n",
        schema.prompt_block()
    )
}

// ── Shared JSON readers (tolerant of string/object entries) ────────

/// Read a field as a list of strings, accepting both `"x"` and `{name: "x"}`
/// entries.
pub(crate) fn string_list(data: &Value, field: &str) -> Vec<String> {
    data.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => map
                        .get("name")
                        .or_else(|| map.get("path"))
                        .and_then(Value::as_str)
                        .map(String::from),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Read the first non-empty of several aliased fields.
pub(crate) fn aliased_string_list(data: &Value, fields: &[&str]) -> Vec<String> {
    for field in fields {
        let list = string_list(data, field);
        if !list.is_empty() {
            return list;
        }
    }
    Vec::new()
}

/// Paths referenced by an array field's entries under `path_key`.
pub(crate) fn object_paths(data: &Value, field: &str, path_key: &str) -> Vec<String> {
    data.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(path_key))
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_list_tolerates_mixed_entries() {
        let data = json!({"modules": ["core", {"name": "api"}, {"path": "src/db"}, 42]});
        assert_eq!(
            string_list(&data, "modules"),
            vec!["core".to_string(), "api".to_string(), "src/db".to_string()]
        );
    }

    #[test]
    fn aliases_prefer_first_non_empty() {
        let data = json!({"findings": [], "keyFindings": ["a"]});
        assert_eq!(
            aliased_string_list(&data, &["findings", "keyFindings"]),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn every_round_has_a_spec() {
        for round in Round::ALL {
            let spec = spec_for(round);
            assert_eq!(spec.round(), round);
            assert!(!spec.schema().fields.is_empty());
        }
    }

    #[test]
    fn fallbacks_satisfy_their_own_schema() {
        let statics = StaticAnalysisResult::default();
        for round in Round::ALL {
            let spec = spec_for(round);
            let fallback = spec.fallback(&statics);
            assert!(
                spec.schema().validate(&fallback).is_ok(),
                "fallback for {round} violates its schema"
            );
        }
    }
}
