use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::AnalyzerOutput;
use super::traits::{AnalysisContext, Analyzer};

/// Parsed dependency manifests, split into production and development sets.
/// Malformed manifests are skipped with a warning rather than failing the
/// analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyData {
    pub manifests: Vec<ManifestInfo>,
    pub warnings: Vec<String>,
}

impl DependencyData {
    pub fn production_names(&self) -> Vec<&str> {
        self.manifests
            .iter()
            .flat_map(|m| m.production.iter().map(|d| d.name.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub path: String,
    pub kind: ManifestKind,
    pub production: Vec<Dependency>,
    pub development: Vec<Dependency>,
    /// Entry files the manifest declares (`main` and friends in
    /// package.json), repo-relative to the manifest's directory.
    #[serde(default)]
    pub entry_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestKind {
    PackageJson,
    CargoToml,
    GoMod,
    RequirementsTxt,
    PyprojectToml,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Default)]
pub struct DependencyAnalyzer;

#[async_trait::async_trait]
impl Analyzer for DependencyAnalyzer {
    fn name(&self) -> &'static str {
        "dependencies"
    }

    #[instrument(skip_all, name = "dependency_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        let mut data = DependencyData::default();

        for file in &ctx.files {
            let Some(kind) = manifest_kind(&file.path) else {
                continue;
            };
            let text = match std::fs::read_to_string(&file.abs_path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %file.path, error = %e, "Cannot read manifest");
                    data.warnings.push(format!("{}: {e}", file.path));
                    continue;
                }
            };
            match parse_manifest(kind, &text) {
                Ok((production, development)) => {
                    let entry_points = entry_fields(kind, &text, &file.path);
                    data.manifests.push(ManifestInfo {
                        path: file.path.clone(),
                        kind,
                        production,
                        development,
                        entry_points,
                    });
                }
                Err(message) => {
                    warn!(path = %file.path, %message, "Malformed manifest skipped");
                    data.warnings.push(format!("{}: {message}", file.path));
                }
            }
        }

        Ok(AnalyzerOutput::Dependencies(data))
    }
}

fn manifest_kind(path: &str) -> Option<ManifestKind> {
    match path.rsplit('/').next()? {
        "package.json" => Some(ManifestKind::PackageJson),
        "Cargo.toml" => Some(ManifestKind::CargoToml),
        "go.mod" => Some(ManifestKind::GoMod),
        "requirements.txt" => Some(ManifestKind::RequirementsTxt),
        "pyproject.toml" => Some(ManifestKind::PyprojectToml),
        _ => None,
    }
}

type DepSets = (Vec<Dependency>, Vec<Dependency>);

fn parse_manifest(kind: ManifestKind, text: &str) -> Result<DepSets, String> {
    match kind {
        ManifestKind::PackageJson => parse_package_json(text),
        ManifestKind::CargoToml => parse_cargo_toml(text),
        ManifestKind::GoMod => Ok((parse_go_mod(text), Vec::new())),
        ManifestKind::RequirementsTxt => Ok((parse_requirements(text), Vec::new())),
        ManifestKind::PyprojectToml => parse_pyproject(text),
    }
}

/// Entry fields declared by a manifest, resolved relative to its directory.
fn entry_fields(kind: ManifestKind, text: &str, manifest_path: &str) -> Vec<String> {
    if kind != ManifestKind::PackageJson {
        return Vec::new();
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };
    let dir = manifest_path.rsplit_once('/').map_or("", |(d, _)| d);
    ["main", "module", "browser"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .map(|entry| {
            let entry = entry.trim_start_matches("./");
            if dir.is_empty() {
                entry.to_string()
            } else {
                format!("{dir}/{entry}")
            }
        })
        .collect()
}

fn parse_package_json(text: &str) -> Result<DepSets, String> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let collect = |key: &str| -> Vec<Dependency> {
        value
            .get(key)
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(name, v)| Dependency {
                        name: name.clone(),
                        version: v.as_str().unwrap_or("*").to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    Ok((collect("dependencies"), collect("devDependencies")))
}

fn parse_cargo_toml(text: &str) -> Result<DepSets, String> {
    let value: toml::Value = toml::from_str(text).map_err(|e| e.to_string())?;
    let collect = |key: &str| -> Vec<Dependency> {
        value
            .get(key)
            .and_then(toml::Value::as_table)
            .map(|table| {
                table
                    .iter()
                    .map(|(name, v)| Dependency {
                        name: name.clone(),
                        version: match v {
                            toml::Value::String(s) => s.clone(),
                            toml::Value::Table(t) => t
                                .get("version")
                                .and_then(toml::Value::as_str)
                                .unwrap_or("*")
                                .to_string(),
                            _ => "*".to_string(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    Ok((collect("dependencies"), collect("dev-dependencies")))
}

fn parse_go_mod(text: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut in_block = false;
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("require (") {
            in_block = true;
            continue;
        }
        if in_block && line == ")" {
            in_block = false;
            continue;
        }
        let spec = if in_block {
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            rest
        } else {
            continue;
        };
        let mut parts = spec.split_whitespace();
        if let (Some(name), Some(version)) = (parts.next(), parts.next()) {
            deps.push(Dependency {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
    }
    deps
}

fn parse_requirements(text: &str) -> Vec<Dependency> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-'))
        .map(|line| {
            let split = line
                .find(|c| "=<>~!".contains(c))
                .unwrap_or(line.len());
            Dependency {
                name: line[..split].trim().to_string(),
                version: line[split..].trim().to_string(),
            }
        })
        .filter(|d| !d.name.is_empty())
        .collect()
}

fn parse_pyproject(text: &str) -> Result<DepSets, String> {
    let value: toml::Value = toml::from_str(text).map_err(|e| e.to_string())?;
    let production = value
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(toml::Value::as_str)
                .flat_map(parse_requirements)
                .collect()
        })
        .unwrap_or_default();
    let development = value
        .get("project")
        .and_then(|p| p.get("optional-dependencies"))
        .and_then(toml::Value::as_table)
        .map(|groups| {
            groups
                .values()
                .filter_map(toml::Value::as_array)
                .flatten()
                .filter_map(toml::Value::as_str)
                .flat_map(parse_requirements)
                .collect()
        })
        .unwrap_or_default();
    Ok((production, development))
}
