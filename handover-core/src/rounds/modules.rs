//! Round 2 — module boundaries inferred from imports and directory layout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::StaticAnalysisResult;
use crate::llm::schema::{FieldKind, ResponseSchema, optional, required};
use crate::types::{QualityMetrics, Round};

use super::quality::{check_min_entries, metrics_from};
use super::validate::Claim;
use super::{
    RoundInput, RoundSpec, format_block, object_paths, packed_block, prior_block, project_block,
};

const FALLBACK_FILES_PER_MODULE: usize = 10;
const FALLBACK_RELATIONSHIP_CAP: usize = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesOutput {
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug)]
pub struct ModulesRound;

impl RoundSpec for ModulesRound {
    fn round(&self) -> Round {
        Round::Modules
    }

    fn schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "modules",
            vec![
                required("modules", FieldKind::Array),
                optional("relationships", FieldKind::Array),
                optional("findings", FieldKind::Array),
                optional("open_questions", FieldKind::Array),
            ],
        )
    }

    fn build_prompt(&self, input: &RoundInput<'_>) -> String {
        let statics = input.statics;
        let mut prompt = String::from(
            "Identify the modules of this repository: coherent units with a \
             name, a purpose, a root directory, and their key files. Infer \
             boundaries from the directory layout and the import edges below.\n\n",
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
        check_min_entries(data, "modules", 1, &mut reasons);
        metrics_from(reasons)
    }

    fn claims(&self, data: &Value) -> Vec<Claim> {
        let mut claims = Vec::new();
        for root in object_paths(data, "modules", "root") {
            if !root.is_empty() {
                claims.push(Claim::ModuleRoot(root));
            }
        }
        if let Some(modules) = data.get("modules").and_then(Value::as_array) {
            for module in modules {
                if let Some(files) = module.get("files").and_then(Value::as_array) {
                    claims.extend(
                        files
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

    /// Modules from top-level directories of discovered source files;
    /// relationships from cross-directory import edges.
    fn fallback(&self, statics: &StaticAnalysisResult) -> Value {
        let mut by_dir: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for path in statics.known_paths.iter() {
            let top = path.split('/').next().unwrap_or(path);
            if top == path {
                // Root-level file.
                by_dir.entry(String::new()).or_default().push(path.to_string());
            } else {
                by_dir.entry(top.to_string()).or_default().push(path.to_string());
            }
        }

        let modules: Vec<ModuleEntry> = by_dir
            .iter()
            .filter(|(dir, _)| !dir.is_empty())
            .map(|(dir, files)| ModuleEntry {
                name: dir.clone(),
                purpose: String::new(),
                root: dir.clone(),
                files: files.iter().take(FALLBACK_FILES_PER_MODULE).cloned().collect(),
            })
            .collect();

        let mut relationships = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for edge in &statics.symbols.import_edges {
            let from_dir = edge.from.split('/').next().unwrap_or("");
            let to_dir = edge.to.split('/').next().unwrap_or("");
            if from_dir != to_dir && seen.insert((from_dir, to_dir)) {
                relationships.push(Relationship {
                    from: from_dir.to_string(),
                    to: to_dir.to_string(),
                    kind: Some("imports".to_string()),
                });
                if relationships.len() >= FALLBACK_RELATIONSHIP_CAP {
                    break;
                }
            }
        }

        serde_json::to_value(ModulesOutput {
            modules,
            relationships,
            findings: Vec::new(),
            open_questions: Vec::new(),
        })
        .expect("modules output serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::symbols::ImportEdge;
    use serde_json::json;

    #[test]
    fn quality_requires_one_module() {
        assert!(
            ModulesRound
                .quality(&json!({"modules": [{"name": "core"}]}))
                .is_acceptable
        );
        assert!(!ModulesRound.quality(&json!({"modules": []})).is_acceptable);
    }

    #[test]
    fn claims_cover_roots_files_and_edges() {
        let data = json!({
            "modules": [
                {"name": "api", "root": "src/api", "files": ["src/api/routes.rs"]},
            ],
            "relationships": [{"from": "src/api", "to": "src/core", "type": "imports"}],
        });
        let claims = ModulesRound.claims(&data);
        assert!(claims.contains(&Claim::ModuleRoot("src/api".into())));
        assert!(claims.contains(&Claim::FilePath("src/api/routes.rs".into())));
        assert!(claims.contains(&Claim::ImportEdge {
            from: "src/api".into(),
            to: "src/core".into()
        }));
    }

    #[test]
    fn fallback_modules_from_directories() {
        let mut statics = StaticAnalysisResult::default();
        statics.known_paths = [
            "src/main.rs".to_string(),
            "docs/guide.md".to_string(),
            "README.md".to_string(),
        ]
        .into_iter()
        .collect();
        statics.symbols.import_edges = vec![ImportEdge {
            from: "src/main.rs".into(),
            to: "docs/guide.md".into(),
        }];

        let fallback = ModulesRound.fallback(&statics);
        let output: ModulesOutput = serde_json::from_value(fallback).unwrap();
        let names: Vec<&str> = output.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "src"]);
        assert_eq!(output.relationships.len(), 1);
        assert_eq!(output.relationships[0].from, "src");
    }
}
