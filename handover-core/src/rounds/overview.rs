//! Round 1 — project overview: name, purpose, tech stack, entry points.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::StaticAnalysisResult;
use crate::llm::schema::{FieldKind, ResponseSchema, optional, required};
use crate::types::{QualityMetrics, Round};

use super::quality::{check_min_entries, check_non_empty_string, metrics_from};
use super::validate::Claim;
use super::{RoundInput, RoundSpec, format_block, packed_block, project_block, string_list};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverviewOutput {
    pub project_name: String,
    pub purpose: String,
    #[serde(default)]
    pub tech_stack: Vec<TechStackEntry>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechStackEntry {
    pub name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug)]
pub struct OverviewRound;

impl RoundSpec for OverviewRound {
    fn round(&self) -> Round {
        Round::Overview
    }

    fn schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "overview",
            vec![
                required("project_name", FieldKind::String),
                required("purpose", FieldKind::String),
                required("tech_stack", FieldKind::Array),
                required("entry_points", FieldKind::Array),
                optional("summary", FieldKind::String),
                optional("findings", FieldKind::Array),
            ],
        )
    }

    fn build_prompt(&self, input: &RoundInput<'_>) -> String {
        let statics = input.statics;
        let mut prompt = String::from(
            "Analyze this repository and produce a project overview.\n\n",
        );
        prompt.push_str(&project_block(input));

        prompt.push_str("\n## Repository shape\n");
        prompt.push_str(&format!(
            "{} files, {} directories, {} lines\n",
            statics.file_tree.total_files, statics.file_tree.total_dirs, statics.file_tree.total_lines
        ));
        prompt.push_str(&statics.file_tree.tree);

        if !statics.dependencies.manifests.is_empty() {
            prompt.push_str("\n## Declared dependencies\n");
            for manifest in &statics.dependencies.manifests {
                let names: Vec<&str> = manifest
                    .production
                    .iter()
                    .take(20)
                    .map(|d| d.name.as_str())
                    .collect();
                prompt.push_str(&format!("{}: {}\n", manifest.path, names.join(", ")));
            }
        }
        if let Some(summary) = &statics.docs.readme_summary {
            prompt.push_str(&format!("\n## README\n{summary}\n"));
        }

        prompt.push('\n');
        prompt.push_str(&packed_block(input.packed));
        prompt.push('\n');
        prompt.push_str(&format_block(&self.schema()));
        prompt
    }

    fn quality(&self, data: &Value) -> QualityMetrics {
        let mut reasons = Vec::new();
        check_non_empty_string(data, "project_name", &mut reasons);
        check_non_empty_string(data, "purpose", &mut reasons);
        check_min_entries(data, "tech_stack", 1, &mut reasons);
        metrics_from(reasons)
    }

    fn claims(&self, data: &Value) -> Vec<Claim> {
        string_list(data, "entry_points")
            .into_iter()
            .map(Claim::FilePath)
            .collect()
    }

    fn fallback(&self, statics: &StaticAnalysisResult) -> Value {
        let tech_stack: Vec<TechStackEntry> = statics
            .dependencies
            .manifests
            .iter()
            .flat_map(|m| m.production.iter().take(8))
            .map(|d| TechStackEntry {
                name: d.name.clone(),
                role: "dependency".to_string(),
            })
            .collect();

        let entry_points: Vec<String> = statics
            .known_paths
            .iter()
            .filter(|p| {
                let basename = p.rsplit('/').next().unwrap_or(p);
                crate::score::is_entry_point_name(basename)
            })
            .map(String::from)
            .collect();

        let output = OverviewOutput {
            project_name: "unknown".to_string(),
            purpose: statics
                .docs
                .readme_summary
                .clone()
                .unwrap_or_else(|| "unknown (static analysis only)".to_string()),
            tech_stack,
            entry_points,
            summary: String::new(),
            findings: Vec::new(),
        };
        serde_json::to_value(output).expect("overview output serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quality_needs_name_purpose_stack() {
        let good = json!({
            "project_name": "demo",
            "purpose": "does things",
            "tech_stack": [{"name": "rust"}],
            "entry_points": [],
        });
        assert!(OverviewRound.quality(&good).is_acceptable);

        let bad = json!({
            "project_name": "",
            "purpose": "does things",
            "tech_stack": [],
            "entry_points": [],
        });
        let metrics = OverviewRound.quality(&bad);
        assert!(!metrics.is_acceptable);
        assert_eq!(metrics.reasons.len(), 2);
    }

    #[test]
    fn claims_are_entry_point_paths() {
        let data = json!({"entry_points": ["src/main.rs", "src/lib.rs"]});
        let claims = OverviewRound.claims(&data);
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0], Claim::FilePath("src/main.rs".into()));
    }

    #[test]
    fn fallback_uses_static_evidence_only() {
        let mut statics = StaticAnalysisResult::default();
        statics.known_paths = ["src/main.rs".to_string(), "src/util.rs".to_string()]
            .into_iter()
            .collect();
        statics.docs.readme_summary = Some("A sample tool.".to_string());

        let fallback = OverviewRound.fallback(&statics);
        assert_eq!(fallback["purpose"], "A sample tool.");
        assert_eq!(fallback["entry_points"][0], "src/main.rs");
        assert_eq!(fallback["project_name"], "unknown");
    }
}
