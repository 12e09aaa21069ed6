use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::AnalyzerOutput;
use super::dependencies::DependencyData;
use super::traits::{AnalysisContext, Analyzer};

/// Detected test frameworks with approximate test counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestFrameworkData {
    pub frameworks: Vec<DetectedFramework>,
    pub test_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFramework {
    pub name: String,
    pub evidence: DetectionEvidence,
    pub approximate_tests: u32,
}

/// How a framework was detected, in priority order: a matching test file
/// basename wins over a config file, which wins over a declared dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionEvidence {
    Filename,
    ConfigFile,
    Dependency,
}

#[derive(Debug, Default)]
pub struct TestFrameworkAnalyzer;

#[async_trait::async_trait]
impl Analyzer for TestFrameworkAnalyzer {
    fn name(&self) -> &'static str {
        "tests"
    }

    #[instrument(skip_all, name = "test_framework_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        // Dependency evidence needs manifests; a light re-parse here keeps the
        // analyzers independent of each other's completion order.
        let deps = parse_declared_dependencies(ctx);
        Ok(AnalyzerOutput::Tests(detect(ctx, &deps)))
    }
}

fn parse_declared_dependencies(ctx: &AnalysisContext) -> Vec<String> {
    let mut names = Vec::new();
    for file in &ctx.files {
        let basename = file.path.rsplit('/').next().unwrap_or(&file.path);
        if basename != "package.json" && basename != "Cargo.toml" && basename != "pyproject.toml" {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&file.abs_path) else {
            continue;
        };
        if basename == "package.json" {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                for key in ["dependencies", "devDependencies"] {
                    if let Some(map) = value.get(key).and_then(serde_json::Value::as_object) {
                        names.extend(map.keys().cloned());
                    }
                }
            }
        } else if let Ok(value) = text.parse::<toml::Value>() {
            for key in ["dependencies", "dev-dependencies"] {
                if let Some(table) = value.get(key).and_then(toml::Value::as_table) {
                    names.extend(table.keys().cloned());
                }
            }
        }
    }
    names
}

pub fn detect(ctx: &AnalysisContext, declared: &[String]) -> TestFrameworkData {
    let mut data = TestFrameworkData::default();

    for file in &ctx.files {
        if is_test_file(&file.path) {
            data.test_files.push(file.path.clone());
        }
    }
    data.test_files.sort();

    let mut add = |name: &str, evidence: DetectionEvidence| {
        if let Some(existing) = data.frameworks.iter_mut().find(|f| f.name == name) {
            // Keep the strongest evidence.
            if evidence < existing.evidence {
                existing.evidence = evidence;
            }
        } else {
            data.frameworks.push(DetectedFramework {
                name: name.to_string(),
                evidence,
                approximate_tests: 0,
            });
        }
    };

    // 1. Filename evidence.
    for path in &data.test_files {
        let basename = path.rsplit('/').next().unwrap_or(path);
        if basename.ends_with("_test.go") {
            add("go-test", DetectionEvidence::Filename);
        } else if basename.ends_with(".test.ts")
            || basename.ends_with(".test.tsx")
            || basename.ends_with(".test.js")
            || basename.ends_with(".spec.ts")
            || basename.ends_with(".spec.js")
        {
            add("jest", DetectionEvidence::Filename);
        } else if basename.starts_with("test_") && basename.ends_with(".py") {
            add("pytest", DetectionEvidence::Filename);
        } else if basename.ends_with(".rs") {
            add("cargo-test", DetectionEvidence::Filename);
        }
    }

    // 2. Config file evidence.
    for file in &ctx.files {
        let basename = file.path.rsplit('/').next().unwrap_or(&file.path);
        match basename {
            "jest.config.js" | "jest.config.ts" | "jest.config.json" => {
                add("jest", DetectionEvidence::ConfigFile);
            }
            "vitest.config.ts" | "vitest.config.js" => {
                add("vitest", DetectionEvidence::ConfigFile);
            }
            "pytest.ini" | "conftest.py" | "tox.ini" => {
                add("pytest", DetectionEvidence::ConfigFile);
            }
            ".mocharc.json" | ".mocharc.yml" => add("mocha", DetectionEvidence::ConfigFile),
            _ => {}
        }
    }

    // 3. Declared dependency evidence.
    for name in declared {
        match name.as_str() {
            "jest" => add("jest", DetectionEvidence::Dependency),
            "vitest" => add("vitest", DetectionEvidence::Dependency),
            "mocha" => add("mocha", DetectionEvidence::Dependency),
            "pytest" => add("pytest", DetectionEvidence::Dependency),
            "proptest" | "quickcheck" => add("cargo-test", DetectionEvidence::Dependency),
            _ => {}
        }
    }

    count_tests(ctx, &mut data);
    data.frameworks
        .sort_by(|a, b| a.evidence.cmp(&b.evidence).then(a.name.cmp(&b.name)));
    data
}

fn is_test_file(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    basename.ends_with("_test.go")
        || basename.contains(".test.")
        || basename.contains(".spec.")
        || (basename.starts_with("test_") && basename.ends_with(".py"))
        || path.starts_with("tests/")
        || path.contains("/tests/")
}

/// Approximate test counts by marker occurrences in test files (and, for
/// Rust, in any source file with `#[test]` blocks).
fn count_tests(ctx: &AnalysisContext, data: &mut TestFrameworkData) {
    let mut counts: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    for file in ctx.content_files() {
        let relevant = is_test_file(&file.path) || file.extension == "rs";
        if !relevant {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&file.abs_path) else {
            continue;
        };
        match file.extension.as_str() {
            "rs" => *counts.entry("cargo-test").or_insert(0) += count_occurrences(&text, "#[test]"),
            "go" => *counts.entry("go-test").or_insert(0) += count_occurrences(&text, "func Test"),
            "py" => *counts.entry("pytest").or_insert(0) += count_occurrences(&text, "def test_"),
            "ts" | "tsx" | "js" | "jsx" => {
                let n = count_occurrences(&text, "it(") + count_occurrences(&text, "test(");
                for framework in ["jest", "vitest", "mocha"] {
                    *counts.entry(framework).or_insert(0) += n;
                }
            }
            _ => {}
        }
    }
    for framework in &mut data.frameworks {
        framework.approximate_tests = counts.get(framework.name.as_str()).copied().unwrap_or(0);
    }
}

fn count_occurrences(text: &str, needle: &str) -> u32 {
    u32::try_from(text.matches(needle).count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandoverConfig;
    use crate::types::FileEntry;

    fn fixture(dir: &std::path::Path, files: &[(&str, &str)]) -> AnalysisContext {
        let mut entries = Vec::new();
        for (rel, content) in files {
            let path = dir.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            entries.push(FileEntry {
                path: (*rel).to_string(),
                abs_path: path,
                size: content.len() as u64,
                extension: rel.rsplit('.').next().unwrap_or("").to_string(),
            });
        }
        AnalysisContext {
            repo_root: dir.to_path_buf(),
            files: entries,
            config: HandoverConfig::default(),
        }
    }

    #[test]
    fn filename_beats_dependency_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fixture(
            dir.path(),
            &[("src/app.test.ts", "it('works', () => {});\ntest('more', () => {});\n")],
        );
        let data = detect(&ctx, &["jest".to_string()]);
        let jest = data.frameworks.iter().find(|f| f.name == "jest").unwrap();
        assert_eq!(jest.evidence, DetectionEvidence::Filename);
        assert_eq!(jest.approximate_tests, 2);
    }

    #[test]
    fn config_file_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fixture(dir.path(), &[("pytest.ini", "[pytest]\n")]);
        let data = detect(&ctx, &[]);
        let pytest = data.frameworks.iter().find(|f| f.name == "pytest").unwrap();
        assert_eq!(pytest.evidence, DetectionEvidence::ConfigFile);
    }

    #[test]
    fn rust_test_counting() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fixture(
            dir.path(),
            &[(
                "src/lib.rs",
                "pub fn f() {}\n\n#[cfg(test)]\nmod tests {\n    #[test]\n    fn a() {}\n    #[test]\n    fn b() {}\n}\n",
            )],
        );
        let data = detect(&ctx, &[]);
        let cargo = data
            .frameworks
            .iter()
            .find(|f| f.name == "cargo-test")
            .unwrap();
        assert_eq!(cargo.approximate_tests, 2);
    }

    #[test]
    fn go_test_files_detected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fixture(
            dir.path(),
            &[("pkg/sum_test.go", "func TestSum(t *testing.T) {}\n")],
        );
        let data = detect(&ctx, &[]);
        let go = data.frameworks.iter().find(|f| f.name == "go-test").unwrap();
        assert_eq!(go.evidence, DetectionEvidence::Filename);
        assert_eq!(go.approximate_tests, 1);
        assert_eq!(data.test_files, vec!["pkg/sum_test.go".to_string()]);
    }
}
