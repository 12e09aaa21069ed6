//! Round 3 — capabilities and cross-cutting concerns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::StaticAnalysisResult;
use crate::llm::schema::{FieldKind, ResponseSchema, optional, required};
use crate::types::{QualityMetrics, Round};

use super::quality::{check_min_entries, metrics_from};
use super::validate::Claim;
use super::{RoundInput, RoundSpec, format_block, packed_block, prior_block, project_block};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesOutput {
    #[serde(default)]
    pub features: Vec<FeatureEntry>,
    #[serde(default)]
    pub cross_cutting: Vec<String>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug)]
pub struct FeaturesRound;

impl RoundSpec for FeaturesRound {
    fn round(&self) -> Round {
        Round::Features
    }

    fn schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "features",
            vec![
                required("features", FieldKind::Array),
                optional("cross_cutting", FieldKind::Array),
                optional("findings", FieldKind::Array),
                optional("open_questions", FieldKind::Array),
            ],
        )
    }

    fn build_prompt(&self, input: &RoundInput<'_>) -> String {
        let statics = input.statics;
        let mut prompt = String::from(
            "Describe what this system does for its users: the concrete \
             capabilities (features) it implements and the cross-cutting \
             concerns (logging, auth, caching, configuration) that span them.\n\n",
        );
        prompt.push_str(&project_block(input));
        prompt.push_str(&prior_block(input));

        if !statics.tests.frameworks.is_empty() {
            prompt.push_str("\n## Test frameworks\n");
            for framework in &statics.tests.frameworks {
                prompt.push_str(&format!(
                    "{} (~{} tests)\n",
                    framework.name, framework.approximate_tests
                ));
            }
        }
        if !statics.todos.items.is_empty() {
            prompt.push_str("\n## Work markers (sample)\n");
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
        check_min_entries(data, "features", 1, &mut reasons);
        metrics_from(reasons)
    }

    fn claims(&self, data: &Value) -> Vec<Claim> {
        let mut claims = Vec::new();
        if let Some(features) = data.get("features").and_then(Value::as_array) {
            for feature in features {
                if let Some(files) = feature.get("files").and_then(Value::as_array) {
                    claims.extend(
                        files
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|p| Claim::FilePath(p.to_string())),
                    );
                }
            }
        }
        claims
    }

    /// Features cannot be derived statically without guessing; the fallback
    /// leaves them empty and reports only observable cross-cutting concerns.
    fn fallback(&self, statics: &StaticAnalysisResult) -> Value {
        let mut cross_cutting = Vec::new();
        if !statics.env.references.is_empty() || !statics.env.env_files.is_empty() {
            cross_cutting.push("environment-based configuration".to_string());
        }
        if !statics.tests.frameworks.is_empty() {
            cross_cutting.push("automated testing".to_string());
        }
        if statics.docs.readme.is_some() {
            cross_cutting.push("project documentation".to_string());
        }

        serde_json::to_value(FeaturesOutput {
            features: Vec::new(),
            cross_cutting,
            findings: Vec::new(),
            open_questions: Vec::new(),
        })
        .expect("features output serializes")
    }
}
