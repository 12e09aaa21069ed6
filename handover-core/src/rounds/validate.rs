//! Claim validation against the static ground truth.
//!
//! Invalid claims are not rewritten; the validator only yields a drop-rate
//! signal to the runner, and the writer decides at render time whether to
//! omit or annotate.

use crate::analyze::StaticAnalysisResult;
use crate::types::ValidationResult;

/// A factual assertion extracted from a round output. Pure narrative is
/// excluded before this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// A repo-relative file path.
    FilePath(String),
    /// An import edge between files or module roots.
    ImportEdge { from: String, to: String },
    /// A directory claimed to be a module root.
    ModuleRoot(String),
}

/// Check every claim against the static result.
pub fn validate_claims(claims: &[Claim], statics: &StaticAnalysisResult) -> ValidationResult {
    let mut valid = 0u32;
    let mut invalid = 0u32;
    for claim in claims {
        if claim_holds(claim, statics) {
            valid += 1;
        } else {
            invalid += 1;
        }
    }
    ValidationResult::new(valid, invalid)
}

fn claim_holds(claim: &Claim, statics: &StaticAnalysisResult) -> bool {
    match claim {
        Claim::FilePath(path) => statics.knows_path(normalize(path)),
        Claim::ModuleRoot(root) => {
            let root = normalize(root);
            statics.knows_path(root) || statics.known_paths.has_prefix(root)
        }
        Claim::ImportEdge { from, to } => {
            let from = normalize(from);
            let to = normalize(to);
            // Exact file-level edge, or any edge crossing the two prefixes
            // when the claim names module roots.
            statics.symbols.has_edge(from, to)
                || statics.symbols.import_edges.iter().any(|e| {
                    under_prefix(&e.from, from) && under_prefix(&e.to, to)
                })
        }
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_end_matches('/')
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}
