//! Round 4 — named architectural patterns, layers, and rationale.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::StaticAnalysisResult;
use crate::llm::schema::{FieldKind, ResponseSchema, optional, required};
use crate::types::{QualityMetrics, Round};

use super::quality::{check_min_entries, metrics_from};
use super::validate::Claim;
use super::{RoundInput, RoundSpec, format_block, packed_block, prior_block, project_block};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchitectureOutput {
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
    #[serde(default)]
    pub relationships: Vec<super::modules::Relationship>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternEntry {
    pub name: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerEntry {
    pub name: String,
    #[serde(default)]
    pub contains: Vec<String>,
}

#[derive(Debug)]
pub struct ArchitectureRound;

impl RoundSpec for ArchitectureRound {
    fn round(&self) -> Round {
        Round::Architecture
    }

    fn schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "architecture",
            vec![
                required("patterns", FieldKind::Array),
                optional("layers", FieldKind::Array),
                optional("relationships", FieldKind::Array),
                optional("findings", FieldKind::Array),
                optional("open_questions", FieldKind::Array),
            ],
        )
    }

    fn build_prompt(&self, input: &RoundInput<'_>) -> String {
        let statics = input.statics;
        let mut prompt = String::from(
            "Name the architectural patterns this repository follows (e.g. \
             layered, pipeline, event-driven, plugin), each with a rationale \
             and file evidence. Draw the layer structure as a list of layers \
             with the directories they contain.\n\n",
        );
        prompt.push_str(&project_block(input));
        prompt.push_str(&prior_block(input));

        prompt.push_str("\n## Directory tree\n");
        prompt.push_str(&statics.file_tree.tree);

        if !statics.symbols.import_edges.is_empty() {
            prompt.push_str("\n## Import edges\n");
            for edge in statics.symbols.import_edges.iter().take(100) {
                prompt.push_str(&format!("{} -> {}\n", edge.from, edge.to));
            }
        }

        prompt.push('\n');
        prompt.push_str(&packed_block(input.packed));
        prompt.push('\n');
        prompt.push_str(&format_block(&self.schema()));
        prompt
    }

    fn quality(&self, data: &Value) -> QualityMetrics {
        let mut reasons = Vec::new();
        check_min_entries(data, "patterns", 1, &mut reasons);
        metrics_from(reasons)
    }

    fn claims(&self, data: &Value) -> Vec<Claim> {
        let mut claims = Vec::new();
        if let Some(patterns) = data.get("patterns").and_then(Value::as_array) {
            for pattern in patterns {
                if let Some(evidence) = pattern.get("evidence").and_then(Value::as_array) {
                    claims.extend(
                        evidence
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|p| Claim::FilePath(p.to_string())),
                    );
                }
            }
        }
        if let Some(relationships) = data.get("relationships").and_then(Value::as_array) {
            for rel in relationships {
                if let (Some(from), Some(to)) = (
                    rel.get("from").and_then(Value::as_str),
                    rel.get("to").and_then(Value::as_str),
                ) {
                    claims.push(Claim::ImportEdge {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
            }
        }
        claims
    }

    /// Patterns require judgment the static layer does not have; layers can
    /// at least mirror the top-level directory grouping.
    fn fallback(&self, statics: &StaticAnalysisResult) -> Value {
        let mut dirs: Vec<String> = statics
            .known_paths
            .iter()
            .filter_map(|p| p.split_once('/').map(|(dir, _)| dir.to_string()))
            .collect();
        dirs.sort();
        dirs.dedup();

        let layers = if dirs.is_empty() {
            Vec::new()
        } else {
            vec![LayerEntry {
                name: "unknown (static analysis only)".to_string(),
                contains: dirs,
            }]
        };

        serde_json::to_value(ArchitectureOutput {
            patterns: Vec::new(),
            layers,
            relationships: Vec::new(),
            findings: Vec::new(),
            open_questions: Vec::new(),
        })
        .expect("architecture output serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quality_requires_one_pattern() {
        assert!(
            ArchitectureRound
                .quality(&json!({"patterns": [{"name": "pipeline"}]}))
                .is_acceptable
        );
        assert!(
            !ArchitectureRound
                .quality(&json!({"patterns": []}))
                .is_acceptable
        );
    }

    #[test]
    fn claims_from_evidence_and_relationships() {
        let data = json!({
            "patterns": [{"name": "layered", "evidence": ["src/api/mod.rs"]}],
            "relationships": [{"from": "src/api", "to": "src/db"}],
        });
        let claims = ArchitectureRound.claims(&data);
        assert_eq!(claims.len(), 2);
        assert!(matches!(claims[1], Claim::ImportEdge { .. }));
    }

    #[test]
    fn fallback_never_invents_patterns() {
        let mut statics = StaticAnalysisResult::default();
        statics.known_paths = ["src/a.rs".to_string(), "tests/b.rs".to_string()]
            .into_iter()
            .collect();
        let fallback = ArchitectureRound.fallback(&statics);
        let output: ArchitectureOutput = serde_json::from_value(fallback).unwrap();
        assert!(output.patterns.is_empty());
        assert_eq!(output.layers.len(), 1);
        assert_eq!(output.layers[0].contains, vec!["src", "tests"]);
    }
}
