use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── Discovered files ───────────────────────────────────────────────

/// A source file that survived ignore filtering during discovery.
///
/// `path` is repo-relative with `/` separators; `abs_path` is the resolved
/// location on disk. Entries are created once by discovery and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    pub extension: String,
}

impl FileEntry {
    /// Whether content operations (read, pack, hash) apply to this file.
    /// Oversized and binary files are counted in stats but content-skipped.
    pub fn content_eligible(&self, max_size: u64) -> bool {
        self.size <= max_size && !is_binary_extension(&self.extension)
    }
}

/// Extensions excluded from content operations but counted in tree stats.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "ico", "bmp", "svg", "pdf", "zip", "tar", "gz", "bz2",
    "xz", "7z", "jar", "war", "class", "o", "a", "so", "dylib", "dll", "exe", "bin", "wasm",
    "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "avi", "mov", "sqlite", "db", "lock",
];

pub fn is_binary_extension(ext: &str) -> bool {
    BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Extensions treated as source code (as opposed to docs, config, assets).
pub fn is_source_extension(ext: &str) -> bool {
    matches!(
        ext,
        "rs" | "py"
            | "ts"
            | "tsx"
            | "js"
            | "jsx"
            | "mjs"
            | "cjs"
            | "go"
            | "java"
            | "kt"
            | "rb"
            | "c"
            | "cc"
            | "cpp"
            | "h"
            | "hpp"
            | "cs"
            | "swift"
            | "php"
            | "scala"
    )
}

// ── Context packing ────────────────────────────────────────────────

/// Content resolution chosen for a packed file.
///
/// Ordered so that `Full > Signatures > Skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Skip,
    Signatures,
    Full,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Signatures => "signatures",
            Self::Full => "full",
        }
    }
}

/// A file (or file section) selected for prompt inclusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackedFile {
    pub path: String,
    pub tier: Tier,
    /// Resolved content: full text, extracted signatures, or a section body.
    pub content: String,
    pub token_cost: u32,
    pub score: f64,
    /// Set when this entry is a section split out of an oversized file.
    pub section: Option<String>,
}

/// The packed prompt context for a run. Built once, shared immutably.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackedContext {
    files: Vec<PackedFile>,
    index: HashMap<String, usize>,
    pub budget: u32,
    pub used: u32,
}

impl PackedContext {
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    /// Append a packed file. Insertion order is score-descending by
    /// construction in the packer; the index points at the first entry for a
    /// path (sections share their parent's path).
    pub fn push(&mut self, file: PackedFile) {
        self.used += file.token_cost;
        self.index.entry(file.path.clone()).or_insert(self.files.len());
        self.files.push(file);
    }

    pub fn files(&self) -> &[PackedFile] {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&PackedFile> {
        self.index.get(path).map(|&i| &self.files[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.used)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

// ── Rounds ─────────────────────────────────────────────────────────

/// One of the six sequential LLM analysis rounds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Round {
    Overview,
    Modules,
    Features,
    Architecture,
    Conventions,
    Deployment,
}

impl Round {
    pub const ALL: [Round; 6] = [
        Self::Overview,
        Self::Modules,
        Self::Features,
        Self::Architecture,
        Self::Conventions,
        Self::Deployment,
    ];

    pub fn number(self) -> u8 {
        match self {
            Self::Overview => 1,
            Self::Modules => 2,
            Self::Features => 3,
            Self::Architecture => 4,
            Self::Conventions => 5,
            Self::Deployment => 6,
        }
    }

    /// Earlier rounds whose compressed contexts feed this round, in declared
    /// order. Round N depends on rounds 1..N-1.
    pub fn deps(self) -> &'static [Round] {
        match self {
            Self::Overview => &[],
            Self::Modules => &[Self::Overview],
            Self::Features => &[Self::Overview, Self::Modules],
            Self::Architecture => &[Self::Overview, Self::Modules, Self::Features],
            Self::Conventions => &[
                Self::Overview,
                Self::Modules,
                Self::Features,
                Self::Architecture,
            ],
            Self::Deployment => &[
                Self::Overview,
                Self::Modules,
                Self::Features,
                Self::Architecture,
                Self::Conventions,
            ],
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::Modules => "Modules",
            Self::Features => "Features",
            Self::Architecture => "Architecture",
            Self::Conventions => "Conventions & Edge Cases",
            Self::Deployment => "Deployment & Infrastructure",
        }
    }

    pub fn step_id(self) -> String {
        format!("ai-round-{}", self.number())
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(n.checked_sub(1)? as usize).copied()
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "round {} ({})", self.number(), self.title())
    }
}

/// Whether a round's output came from the LLM path or a static fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Ok,
    Degraded,
}

/// Where a round's data was obtained in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundSource {
    Llm,
    Fallback,
    Cached,
}

/// Outcome of cross-checking LLM claims against static facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid_claims: u32,
    pub invalid_claims: u32,
    pub drop_rate: f64,
}

impl ValidationResult {
    pub fn new(valid: u32, invalid: u32) -> Self {
        let total = valid + invalid;
        let drop_rate = if total == 0 {
            0.0
        } else {
            f64::from(invalid) / f64::from(total)
        };
        Self {
            valid_claims: valid,
            invalid_claims: invalid,
            drop_rate,
        }
    }
}

/// Outcome of the per-round quality heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub is_acceptable: bool,
    pub reasons: Vec<String>,
}

impl QualityMetrics {
    pub fn acceptable() -> Self {
        Self {
            is_acceptable: true,
            reasons: Vec::new(),
        }
    }

    pub fn rejected(reasons: Vec<String>) -> Self {
        Self {
            is_acceptable: false,
            reasons,
        }
    }
}

/// Deterministic compression of a round output, fed to downstream rounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundContext {
    pub modules: Vec<String>,
    pub findings: Vec<String>,
    pub relationships: Vec<String>,
    pub open_questions: Vec<String>,
    pub token_count: u32,
}

// ── Documents ──────────────────────────────────────────────────────

/// Per-document generation status, surfaced in YAML front matter and the
/// INDEX document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    Full,
    Partial,
    StaticOnly,
    NotGenerated,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::StaticOnly => "static-only",
            Self::NotGenerated => "not-generated",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of one rendered document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub filename: String,
    pub title: String,
    pub status: DocumentStatus,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering() {
        assert!(Tier::Full > Tier::Signatures);
        assert!(Tier::Signatures > Tier::Skip);
    }

    #[test]
    fn round_dependency_chain() {
        assert!(Round::Overview.deps().is_empty());
        assert_eq!(Round::Modules.deps(), &[Round::Overview]);
        assert_eq!(Round::Deployment.deps().len(), 5);
        // Deps are always strictly earlier rounds, in declared order.
        for round in Round::ALL {
            let mut prev = 0;
            for dep in round.deps() {
                assert!(dep.number() < round.number());
                assert!(dep.number() > prev);
                prev = dep.number();
            }
        }
    }

    #[test]
    fn round_numbering_round_trips() {
        for round in Round::ALL {
            assert_eq!(Round::from_number(round.number()), Some(round));
        }
        assert_eq!(Round::from_number(0), None);
        assert_eq!(Round::from_number(7), None);
    }

    #[test]
    fn drop_rate_semantics() {
        let v = ValidationResult::new(0, 0);
        assert!((v.drop_rate - 0.0).abs() < f64::EPSILON);

        let v = ValidationResult::new(1, 3);
        assert!((v.drop_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn packed_context_accounting() {
        let mut ctx = PackedContext::new(100);
        ctx.push(PackedFile {
            path: "src/main.rs".into(),
            tier: Tier::Full,
            content: "fn main() {}".into(),
            token_cost: 40,
            score: 10.0,
            section: None,
        });
        assert_eq!(ctx.remaining(), 60);
        assert!(ctx.contains("src/main.rs"));
        assert_eq!(ctx.get("src/main.rs").unwrap().tier, Tier::Full);
        assert!(ctx.get("src/lib.rs").is_none());
    }

    #[test]
    fn binary_extension_policy() {
        assert!(is_binary_extension("PNG"));
        assert!(is_binary_extension("so"));
        assert!(!is_binary_extension("rs"));
    }
}
