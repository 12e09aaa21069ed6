//! Round 5 — coding conventions and edge-case handling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::StaticAnalysisResult;
use crate::llm::schema::{FieldKind, ResponseSchema, optional, required};
use crate::types::{QualityMetrics, Round};

use super::quality::{check_min_entries, metrics_from};
use super::validate::Claim;
use super::{RoundInput, RoundSpec, format_block, packed_block, prior_block, project_block};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConventionsOutput {
    #[serde(default)]
    pub conventions: Vec<ConventionEntry>,
    #[serde(default)]
    pub edge_cases: Vec<String>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConventionEntry {
    pub topic: String,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug)]
pub struct ConventionsRound;

impl RoundSpec for ConventionsRound {
    fn round(&self) -> Round {
        Round::Conventions
    }

    fn schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "conventions",
            vec![
                required("conventions", FieldKind::Array),
                optional("edge_cases", FieldKind::Array),
                optional("findings", FieldKind::Array),
                optional("open_questions", FieldKind::Array),
            ],
        )
    }

    fn build_prompt(&self, input: &RoundInput<'_>) -> String {
        let statics = input.statics;
        let mut prompt = String::from(
            "Document the conventions a new contributor must follow in this \
             repository (naming, error handling, testing, module layout) and \
             the edge cases the code already guards against. Cite example \
             files for each convention.\n\n",
        );
        prompt.push_str(&project_block(input));
        prompt.push_str(&prior_block(input));

        if !statics.tests.frameworks.is_empty() {
            prompt.push_str("\n## Test frameworks\n");
            for framework in &statics.tests.frameworks {
                prompt.push_str(&format!("{}\n", framework.name));
            }
        }
        prompt.push_str(&format!(
            "\n## Documentation coverage\n{:.0}% of sampled files have doc comments\n",
            statics.docs.inline_doc_coverage * 100.0
        ));
        if !statics.todos.items.is_empty() {
            prompt.push_str("\n## Known debt markers (sample)\n");
            for item in statics.todos.items.iter().take(15) {
                prompt.push_str(&format!(
                    "{}:{} {}: {}\n",
                    item.path, item.line, item.marker, item.text
                ));
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
        check_min_entries(data, "conventions", 1, &mut reasons);
        metrics_from(reasons)
    }

    fn claims(&self, data: &Value) -> Vec<Claim> {
        let mut claims = Vec::new();
        if let Some(conventions) = data.get("conventions").and_then(Value::as_array) {
            for convention in conventions {
                if let Some(examples) = convention.get("examples").and_then(Value::as_array) {
                    claims.extend(
                        examples
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|p| Claim::FilePath(p.to_string())),
                    );
                }
            }
        }
        claims
    }

    /// Conventions observable without an LLM: test framework usage and
    /// documentation habits.
    fn fallback(&self, statics: &StaticAnalysisResult) -> Value {
        let mut conventions = Vec::new();
        for framework in &statics.tests.frameworks {
            conventions.push(ConventionEntry {
                topic: "testing".to_string(),
                rule: format!("tests run under {}", framework.name),
                examples: statics.tests.test_files.iter().take(3).cloned().collect(),
            });
        }
        if statics.docs.sampled_files > 0 {
            conventions.push(ConventionEntry {
                topic: "documentation".to_string(),
                rule: format!(
                    "{:.0}% of sampled source files carry doc comments",
                    statics.docs.inline_doc_coverage * 100.0
                ),
                examples: Vec::new(),
            });
        }

        serde_json::to_value(ConventionsOutput {
            conventions,
            edge_cases: Vec::new(),
            findings: Vec::new(),
            open_questions: Vec::new(),
        })
        .expect("conventions output serializes")
    }
}
