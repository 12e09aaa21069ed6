//! Round 6 — deployment targets and infrastructure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::StaticAnalysisResult;
use crate::llm::schema::{FieldKind, ResponseSchema, optional, required};
use crate::types::{QualityMetrics, Round};

use super::quality::metrics_from;
use super::validate::Claim;
use super::{
    RoundInput, RoundSpec, format_block, packed_block, prior_block, project_block, string_list,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentOutput {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub build_steps: Vec<String>,
    #[serde(default)]
    pub infrastructure: Vec<String>,
    #[serde(default)]
    pub environment_variables: Vec<String>,
    #[serde(default)]
    pub ci: Option<String>,
    #[serde(default)]
    pub config_files: Vec<String>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

#[derive(Debug)]
pub struct DeploymentRound;

impl RoundSpec for DeploymentRound {
    fn round(&self) -> Round {
        Round::Deployment
    }

    fn schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "deployment",
            vec![
                required("targets", FieldKind::Array),
                optional("build_steps", FieldKind::Array),
                optional("infrastructure", FieldKind::Array),
                optional("environment_variables", FieldKind::Array),
                optional("ci", FieldKind::String),
                optional("config_files", FieldKind::Array),
                optional("findings", FieldKind::Array),
                optional("open_questions", FieldKind::Array),
            ],
        )
    }

    fn build_prompt(&self, input: &RoundInput<'_>) -> String {
        let statics = input.statics;
        let mut prompt = String::from(
            "Describe how this system is built, deployed, and operated: \
             deployment targets, build steps, infrastructure pieces, CI \
             setup, and the environment variables operations must provide.\n\n",
        );
        prompt.push_str(&project_block(input));
        if let Some(target) = &input.project.deploy_target {
            prompt.push_str(&format!("Declared deploy target: {target}\n"));
        }
        prompt.push_str(&prior_block(input));

        if !statics.env.references.is_empty() {
            prompt.push_str("\n## Environment variables referenced\n");
            for (var, paths) in statics.env.references.iter().take(30) {
                prompt.push_str(&format!("{var} (used in {})\n", paths.join(", ")));
            }
        }
        let ci_files: Vec<&str> = statics
            .known_paths
            .iter()
            .filter(|p| is_ci_path(p))
            .collect();
        if !ci_files.is_empty() {
            prompt.push_str("\n## CI configuration files\n");
            for path in ci_files {
                prompt.push_str(&format!("{path}\n"));
            }
        }

        prompt.push('\n');
        prompt.push_str(&packed_block(input.packed));
        prompt.push('\n');
        prompt.push_str(&format_block(&self.schema()));
        prompt
    }

    /// At least one of targets, build steps, or infrastructure must be
    /// populated.
    fn quality(&self, data: &Value) -> QualityMetrics {
        let populated = ["targets", "build_steps", "infrastructure"]
            .iter()
            .map(|field| {
                data.get(*field)
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len)
            })
            .sum::<usize>();
        let mut reasons = Vec::new();
        if populated == 0 {
            reasons.push(
                "none of targets, build_steps, infrastructure is populated".to_string(),
            );
        }
        metrics_from(reasons)
    }

    fn claims(&self, data: &Value) -> Vec<Claim> {
        string_list(data, "config_files")
            .into_iter()
            .map(Claim::FilePath)
            .collect()
    }

    fn fallback(&self, statics: &StaticAnalysisResult) -> Value {
        let environment_variables: Vec<String> = statics
            .env
            .variable_names()
            .into_iter()
            .map(String::from)
            .collect();

        let ci = detect_ci(statics);
        let config_files: Vec<String> = statics
            .known_paths
            .iter()
            .filter(|p| is_deploy_config(p))
            .map(String::from)
            .collect();

        serde_json::to_value(DeploymentOutput {
            targets: Vec::new(),
            build_steps: Vec::new(),
            infrastructure: Vec::new(),
            environment_variables,
            ci,
            config_files,
            findings: Vec::new(),
            open_questions: Vec::new(),
        })
        .expect("deployment output serializes")
    }
}

fn is_ci_path(path: &str) -> bool {
    path.starts_with(".github/workflows/")
        || path == ".gitlab-ci.yml"
        || path == ".circleci/config.yml"
        || path == "Jenkinsfile"
}

fn is_deploy_config(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    matches!(
        basename,
        "Dockerfile" | "docker-compose.yml" | "docker-compose.yaml" | "Procfile" | "fly.toml"
    ) || is_ci_path(path)
}

fn detect_ci(statics: &StaticAnalysisResult) -> Option<String> {
    let mut paths = statics.known_paths.iter();
    paths.find_map(|p| {
        if p.starts_with(".github/workflows/") {
            Some("github-actions".to_string())
        } else if p == ".gitlab-ci.yml" {
            Some("gitlab-ci".to_string())
        } else if p == ".circleci/config.yml" {
            Some("circleci".to_string())
        } else if p == "Jenkinsfile" {
            Some("jenkins".to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quality_needs_any_populated_section() {
        assert!(
            DeploymentRound
                .quality(&json!({"targets": ["docker"]}))
                .is_acceptable
        );
        assert!(
            DeploymentRound
                .quality(&json!({"targets": [], "infrastructure": ["postgres"]}))
                .is_acceptable
        );
        assert!(
            !DeploymentRound
                .quality(&json!({"targets": [], "build_steps": []}))
                .is_acceptable
        );
    }

    #[test]
    fn claims_from_config_files_only() {
        let data = json!({
            "targets": ["kubernetes"],
            "config_files": ["Dockerfile"],
        });
        assert_eq!(
            DeploymentRound.claims(&data),
            vec![Claim::FilePath("Dockerfile".into())]
        );
    }

    #[test]
    fn fallback_collects_env_and_ci() {
        let mut statics = StaticAnalysisResult::default();
        statics
            .env
            .references
            .insert("DATABASE_URL".to_string(), vec!["src/db.rs".to_string()]);
        statics.known_paths = [
            ".github/workflows/ci.yml".to_string(),
            "Dockerfile".to_string(),
        ]
        .into_iter()
        .collect();

        let fallback = DeploymentRound.fallback(&statics);
        let output: DeploymentOutput = serde_json::from_value(fallback).unwrap();
        assert_eq!(output.environment_variables, vec!["DATABASE_URL"]);
        assert_eq!(output.ci.as_deref(), Some("github-actions"));
        assert!(output.config_files.contains(&"Dockerfile".to_string()));
        assert!(output.targets.is_empty());
    }
}
