use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::AnalyzerOutput;
use super::traits::{AnalysisContext, Analyzer};

/// Environment configuration facts: discovered `.env*` files and lexical
/// scans for env var references across four language families.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvData {
    pub env_files: Vec<String>,
    /// Variable name → referencing paths (deduplicated, sorted).
    pub references: BTreeMap<String, Vec<String>>,
}

impl EnvData {
    pub fn variable_names(&self) -> Vec<&str> {
        self.references.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Default)]
pub struct EnvAnalyzer;

#[async_trait::async_trait]
impl Analyzer for EnvAnalyzer {
    fn name(&self) -> &'static str {
        "env"
    }

    #[instrument(skip_all, name = "env_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        let mut data = EnvData::default();

        for file in &ctx.files {
            let basename = file.path.rsplit('/').next().unwrap_or(&file.path);
            if basename == ".env" || basename.starts_with(".env.") {
                data.env_files.push(file.path.clone());
            }
        }
        data.env_files.sort();

        for file in ctx.content_files() {
            let Some(family) = LanguageFamily::from_extension(&file.extension) else {
                continue;
            };
            let Ok(text) = std::fs::read_to_string(&file.abs_path) else {
                continue;
            };
            for var in family.scan(&text) {
                let paths = data.references.entry(var).or_default();
                if !paths.contains(&file.path) {
                    paths.push(file.path.clone());
                }
            }
        }
        for paths in data.references.values_mut() {
            paths.sort();
        }

        Ok(AnalyzerOutput::Env(data))
    }
}

/// The four language families scanned for env var references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    JavaScript,
    Python,
    Rust,
    Go,
}

impl LanguageFamily {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Lexical scan for env references in this family's idiom.
    pub fn scan(self, text: &str) -> Vec<String> {
        match self {
            Self::JavaScript => scan_after(text, "process.env.", identifier_run),
            Self::Python => {
                let mut vars = scan_quoted_after(text, "os.environ[");
                vars.extend(scan_quoted_after(text, "os.getenv("));
                vars.extend(scan_quoted_after(text, "os.environ.get("));
                vars
            }
            Self::Rust => {
                let mut vars = scan_quoted_after(text, "env::var(");
                vars.extend(scan_quoted_after(text, "env::var_os("));
                vars
            }
            Self::Go => scan_quoted_after(text, "os.Getenv("),
        }
    }
}

fn identifier_run(text: &str) -> Option<String> {
    let ident: String = text
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!ident.is_empty()).then_some(ident)
}

fn scan_after(text: &str, needle: &str, extract: fn(&str) -> Option<String>) -> Vec<String> {
    let mut vars = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(needle) {
        rest = &rest[pos + needle.len()..];
        if let Some(var) = extract(rest) {
            vars.push(var);
        }
    }
    vars
}

/// Extract the quoted string immediately after `needle`, tolerating `'` and `"`.
fn scan_quoted_after(text: &str, needle: &str) -> Vec<String> {
    scan_after(text, needle, |rest| {
        let rest = rest.trim_start();
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let inner = &rest[1..];
        let end = inner.find(quote)?;
        let var = &inner[..end];
        (!var.is_empty()).then(|| var.to_string())
    })
}
