use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::AnalyzerOutput;
use super::traits::{AnalysisContext, Analyzer};

/// The fixed marker set scanned for. Order matters: longer markers first so
/// `TODO` does not shadow nothing, and matching is whole-word.
pub const MARKERS: &[&str] = &[
    "DEPRECATED",
    "OPTIMIZE",
    "REVIEW",
    "FIXME",
    "TODO",
    "HACK",
    "NOTE",
    "WARN",
    "TEMP",
    "XXX",
];

/// Work-marker scan results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoData {
    pub items: Vec<TodoItem>,
}

impl TodoData {
    pub fn count_for(&self, path: &str) -> usize {
        self.items.iter().filter(|i| i.path == path).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub marker: String,
    pub category: TodoCategory,
    pub text: String,
    pub path: String,
    pub line: u32,
    /// Extracted issue references: `#123`, `PROJ-42`.
    pub issue_refs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoCategory {
    Bugs,
    Tasks,
    Notes,
    Debt,
    Optimization,
}

pub fn categorize(marker: &str) -> TodoCategory {
    match marker {
        "FIXME" | "XXX" | "WARN" => TodoCategory::Bugs,
        "TODO" | "REVIEW" => TodoCategory::Tasks,
        "NOTE" => TodoCategory::Notes,
        "HACK" | "TEMP" | "DEPRECATED" => TodoCategory::Debt,
        _ => TodoCategory::Optimization,
    }
}

#[derive(Debug, Default)]
pub struct TodoAnalyzer;

#[async_trait::async_trait]
impl Analyzer for TodoAnalyzer {
    fn name(&self) -> &'static str {
        "todos"
    }

    #[instrument(skip_all, name = "todo_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        let mut data = TodoData::default();
        for file in ctx.content_files() {
            let Ok(text) = std::fs::read_to_string(&file.abs_path) else {
                continue;
            };
            scan_text(&text, &file.path, &mut data.items);
        }
        Ok(AnalyzerOutput::Todos(data))
    }
}

pub fn scan_text(text: &str, path: &str, out: &mut Vec<TodoItem>) {
    for (idx, line) in text.lines().enumerate() {
        let Some((marker, rest)) = find_marker(line) else {
            continue;
        };
        let text = rest
            .trim_start_matches([':', '-', ' ', '(', ')'])
            .trim()
            .to_string();
        out.push(TodoItem {
            marker: marker.to_string(),
            category: categorize(marker),
            text,
            path: path.to_string(),
            line: u32::try_from(idx + 1).unwrap_or(u32::MAX),
            issue_refs: extract_issue_refs(rest),
        });
    }
}

/// Find the first whole-word marker occurrence in a line.
fn find_marker(line: &str) -> Option<(&'static str, &str)> {
    let mut best: Option<(usize, &'static str)> = None;
    for marker in MARKERS {
        if let Some(pos) = line.find(marker) {
            // Whole-word: not preceded or followed by an identifier char.
            let before_ok = pos == 0
                || !line[..pos]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_');
            let after = pos + marker.len();
            let after_ok = !line[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
            if before_ok && after_ok && best.is_none_or(|(bp, _)| pos < bp) {
                best = Some((pos, marker));
            }
        }
    }
    best.map(|(pos, marker)| (marker, &line[pos + marker.len()..]))
}

/// Extract `#123` and `PROJ-42` style references.
pub fn extract_issue_refs(text: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' {
            let digits = ascii_digit_run(&text[i + 1..]);
            if !digits.is_empty() {
                refs.push(format!("#{digits}"));
                i += 1 + digits.len();
                continue;
            }
        } else if bytes[i].is_ascii_uppercase() {
            let word: String = text[i..]
                .chars()
                .take_while(char::is_ascii_uppercase)
                .collect();
            let rest = &text[i + word.len()..];
            if word.len() >= 2 && rest.starts_with('-') {
                let digits = ascii_digit_run(&rest[1..]);
                if !digits.is_empty() {
                    refs.push(format!("{word}-{digits}"));
                    i += word.len() + 1 + digits.len();
                    continue;
                }
            }
            i += word.len();
            continue;
        }
        i += 1;
    }
    refs
}

fn ascii_digit_run(text: &str) -> String {
    text.chars().take_while(char::is_ascii_digit).collect()
}
