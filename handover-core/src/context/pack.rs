//! Greedy tiered context packing.
//!
//! Files are visited in score order and assigned a tier: `full` when the
//! whole file fits the remaining budget, `signatures` when only the extracted
//! declaration lines fit, `skip` otherwise. Oversized high-score files are
//! split: their signatures are packed and their individual sections then
//! compete for the remaining budget as first-class units.
//!
//! Files are read on demand in batches so peak memory stays bounded.

use tracing::{debug, instrument};

use crate::config::HandoverConfig;
use crate::score::ScoredFile;
use crate::types::{PackedContext, PackedFile, Tier};

use super::budget::estimate_tokens;

/// Batch size for on-demand file reads.
const READ_BATCH_SIZE: usize = 50;
/// Cap on sections split out of one oversized file.
const SECTION_CAP: usize = 40;

/// Pack scored files into a token budget.
#[instrument(skip_all, fields(budget))]
pub fn pack_context(
    scored: &[ScoredFile],
    budget: u32,
    config: &HandoverConfig,
) -> PackedContext {
    let mut packed = PackedContext::new(budget);
    if budget == 0 {
        return packed;
    }

    let max_size = config.analysis.max_file_size;
    let split_threshold = config.context_window.split_token_threshold;
    let split_min_score = config.context_window.split_min_score;

    let eligible: Vec<&ScoredFile> = scored
        .iter()
        .filter(|s| s.entry.content_eligible(max_size))
        .collect();

    for batch in eligible.chunks(READ_BATCH_SIZE) {
        if packed.remaining() == 0 {
            break;
        }
        for scored_file in batch {
            if packed.remaining() == 0 {
                break;
            }
            let Ok(content) = std::fs::read_to_string(&scored_file.entry.abs_path) else {
                continue;
            };
            if content.trim().is_empty() {
                continue;
            }
            place_file(&mut packed, scored_file, &content, split_threshold, split_min_score);
        }
    }

    // A repo with any non-empty source file must produce at least one packed
    // file when the budget is positive: fall back to a truncated slice of the
    // best-scored file.
    if packed.is_empty() {
        for scored_file in &eligible {
            let Ok(content) = std::fs::read_to_string(&scored_file.entry.abs_path) else {
                continue;
            };
            if content.trim().is_empty() {
                continue;
            }
            let truncated = truncate_to_tokens(&content, budget);
            let token_cost = estimate_tokens(&truncated);
            packed.push(PackedFile {
                path: scored_file.entry.path.clone(),
                tier: Tier::Full,
                content: truncated,
                token_cost,
                score: scored_file.score,
                section: None,
            });
            break;
        }
    }

    debug!(
        files = packed.len(),
        used = packed.used,
        budget = packed.budget,
        "Context packed"
    );
    packed
}

fn place_file(
    packed: &mut PackedContext,
    scored_file: &ScoredFile,
    content: &str,
    split_threshold: u32,
    split_min_score: f64,
) {
    let full_cost = estimate_tokens(content);
    if full_cost <= packed.remaining() {
        packed.push(PackedFile {
            path: scored_file.entry.path.clone(),
            tier: Tier::Full,
            content: content.to_string(),
            token_cost: full_cost,
            score: scored_file.score,
            section: None,
        });
        return;
    }

    if full_cost > split_threshold && scored_file.score >= split_min_score {
        split_oversized(packed, scored_file, content);
        return;
    }

    try_signatures(packed, scored_file, content);
}

/// Oversized high-score file: pack signatures, then let its sections compete
/// for whatever budget remains.
fn split_oversized(packed: &mut PackedContext, scored_file: &ScoredFile, content: &str) {
    try_signatures(packed, scored_file, content);

    for (name, body) in extract_sections(content, &scored_file.entry.extension) {
        let cost = estimate_tokens(&body);
        if cost == 0 || cost > packed.remaining() {
            continue;
        }
        packed.push(PackedFile {
            path: scored_file.entry.path.clone(),
            tier: Tier::Full,
            content: body,
            token_cost: cost,
            // Sections inherit a slightly lower score than their parent.
            score: scored_file.score - 1.0,
            section: Some(name),
        });
    }
}

fn try_signatures(packed: &mut PackedContext, scored_file: &ScoredFile, content: &str) {
    let signatures = extract_signatures(content, &scored_file.entry.extension);
    if signatures.is_empty() {
        return;
    }
    let cost = estimate_tokens(&signatures);
    if cost == 0 || cost > packed.remaining() {
        return;
    }
    packed.push(PackedFile {
        path: scored_file.entry.path.clone(),
        tier: Tier::Signatures,
        content: signatures,
        token_cost: cost,
        score: scored_file.score,
        section: None,
    });
}

/// Keep declaration lines only: function/type/import/export heads across the
/// supported language families.
pub fn extract_signatures(content: &str, extension: &str) -> String {
    let mut out = String::new();
    for line in content.lines() {
        if is_declaration_line(line, extension) {
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    out
}

fn is_declaration_line(line: &str, extension: &str) -> bool {
    let trimmed = line.trim_start();
    match extension {
        "rs" => {
            trimmed.starts_with("pub fn ")
                || trimmed.starts_with("fn ")
                || trimmed.starts_with("pub struct ")
                || trimmed.starts_with("struct ")
                || trimmed.starts_with("pub enum ")
                || trimmed.starts_with("enum ")
                || trimmed.starts_with("pub trait ")
                || trimmed.starts_with("trait ")
                || trimmed.starts_with("impl ")
                || trimmed.starts_with("pub mod ")
                || trimmed.starts_with("mod ")
                || trimmed.starts_with("use ")
                || trimmed.starts_with("pub type ")
                || trimmed.starts_with("pub const ")
        }
        "py" => {
            trimmed.starts_with("def ")
                || trimmed.starts_with("async def ")
                || trimmed.starts_with("class ")
                || trimmed.starts_with("import ")
                || trimmed.starts_with("from ")
        }
        "go" => {
            trimmed.starts_with("func ")
                || trimmed.starts_with("type ")
                || trimmed.starts_with("import ")
                || trimmed.starts_with("package ")
        }
        _ => {
            trimmed.starts_with("function ")
                || trimmed.starts_with("export ")
                || trimmed.starts_with("class ")
                || trimmed.starts_with("import ")
                || trimmed.starts_with("interface ")
                || trimmed.starts_with("type ")
                || trimmed.starts_with("const ")
        }
    }
}

/// Split a file into named top-level sections. A new section starts at each
/// unindented declaration line; leading content before the first declaration
/// is dropped.
pub fn extract_sections(content: &str, extension: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in content.lines() {
        let starts_section =
            !line.starts_with(char::is_whitespace) && is_declaration_line(line, extension);
        if starts_section {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            if sections.len() >= SECTION_CAP {
                return sections;
            }
            current = Some((section_name(line), String::new()));
        }
        if let Some((_, body)) = &mut current {
            body.push_str(line);
            body.push('\n');
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }
    sections
}

fn section_name(line: &str) -> String {
    line.trim()
        .split(['(', '{', ':', '<'])
        .next()
        .unwrap_or(line)
        .trim()
        .to_string()
}

#[allow(clippy::cast_possible_truncation)]
fn truncate_to_tokens(content: &str, budget: u32) -> String {
    let char_limit = (budget as usize).saturating_mul(4);
    if content.chars().count() <= char_limit {
        return content.to_string();
    }
    content.chars().take(char_limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileEntry;

    fn scored(dir: &std::path::Path, rel: &str, content: &str, score: f64) -> ScoredFile {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        ScoredFile {
            entry: FileEntry {
                path: rel.to_string(),
                abs_path: path,
                size: content.len() as u64,
                extension: rel.rsplit('.').next().unwrap_or("").to_string(),
            },
            score,
        }
    }

    #[test]
    fn sum_of_costs_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            scored(dir.path(), "a.rs", &"pub fn a() {}\n".repeat(50), 30.0),
            scored(dir.path(), "b.rs", &"pub fn b() {}\n".repeat(50), 20.0),
            scored(dir.path(), "c.rs", &"pub fn c() {}\n".repeat(50), 10.0),
        ];
        let budget = 300;
        let packed = pack_context(&files, budget, &HandoverConfig::default());
        assert!(packed.used <= budget);
        let sum: u32 = packed.files().iter().map(|f| f.token_cost).sum();
        assert_eq!(sum, packed.used);
    }

    #[test]
    fn zero_budget_packs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![scored(dir.path(), "a.rs", "pub fn a() {}\n", 10.0)];
        let packed = pack_context(&files, 0, &HandoverConfig::default());
        assert!(packed.is_empty());
    }

    #[test]
    fn at_least_one_file_when_budget_positive() {
        let dir = tempfile::tempdir().unwrap();
        // File is far larger than the budget, low score: normally skipped.
        let files = vec![scored(dir.path(), "big.rs", &"x();\n".repeat(5000), 1.0)];
        let packed = pack_context(&files, 10, &HandoverConfig::default());
        assert_eq!(packed.len(), 1);
        assert!(packed.used <= 10);
    }

    #[test]
    fn insertion_order_is_score_descending() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            scored(dir.path(), "top.rs", "pub fn t() {}\n", 50.0),
            scored(dir.path(), "mid.rs", "pub fn m() {}\n", 25.0),
            scored(dir.path(), "low.rs", "pub fn l() {}\n", 5.0),
        ];
        let packed = pack_context(&files, 10_000, &HandoverConfig::default());
        let paths: Vec<_> = packed.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["top.rs", "mid.rs", "low.rs"]);
        assert!(packed.files().iter().all(|f| f.tier == Tier::Full));
    }

    #[test]
    fn oversized_high_score_file_splits_into_sections() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::new();
        for i in 0..200 {
            content.push_str(&format!("pub fn f{i}() {{\n    body();\n}}\n\n"));
        }
        let config = HandoverConfig {
            context_window: crate::config::ContextWindowSection {
                split_token_threshold: 100,
                split_min_score: 30.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let files = vec![scored(dir.path(), "huge.rs", &content, 40.0)];
        let packed = pack_context(&files, 800, &config);

        assert!(packed.used <= 800);
        // Signatures plus at least one section.
        assert!(
            packed
                .files()
                .iter()
                .any(|f| f.tier == Tier::Signatures && f.section.is_none())
        );
        assert!(packed.files().iter().any(|f| f.section.is_some()));
    }

    #[test]
    fn low_score_oversized_file_degrades_to_signatures() {
        let dir = tempfile::tempdir().unwrap();
        // Over the default split threshold (8,000 tokens), but the score is
        // below the split gate: signatures only, no sections.
        let mut content = String::new();
        for i in 0..400 {
            content.push_str(&format!(
                "pub fn f{i}() {{\n    let a = {i};\n    let b = a * 2;\n    let c = b + a;\n    println!(\"{{a}} {{b}} {{c}}\");\n}}\n"
            ));
        }
        assert!(estimate_tokens(&content) > 8_000);

        let files = vec![scored(dir.path(), "big.rs", &content, 5.0)];
        let packed = pack_context(&files, 2_000, &HandoverConfig::default());
        assert!(packed.files().iter().all(|f| f.section.is_none()));
        assert!(
            packed
                .files()
                .iter()
                .any(|f| f.path == "big.rs" && f.tier == Tier::Signatures)
        );
        assert!(packed.used <= 2_000);
    }

    #[test]
    fn signature_extraction_keeps_declarations() {
        let sig = extract_signatures(
            "use std::fmt;\n\npub fn visible() {\n    hidden_body();\n}\n\nstruct S;\n",
            "rs",
        );
        assert!(sig.contains("pub fn visible()"));
        assert!(sig.contains("struct S;"));
        assert!(!sig.contains("hidden_body"));
    }

    #[test]
    fn sections_split_on_top_level_decls() {
        let sections = extract_sections(
            "pub fn one() {\n    a();\n}\n\npub fn two() {\n    b();\n}\n",
            "rs",
        );
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, "pub fn one");
        assert!(sections[0].1.contains("a();"));
        assert!(sections[1].1.contains("b();"));
    }
}
