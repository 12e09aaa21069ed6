//! Deterministic round-output compression.
//!
//! Pure field extraction, no LLM involvement: the same input always yields
//! byte-identical output. Tolerates string and object entries in the same
//! field and the `findings` / `keyFindings` alias. Over-budget outputs are
//! truncated by dropping open questions first, then findings (keeping at
//! least one if any existed), then relationships, then modules.

use serde_json::Value;

use crate::context::budget::estimate_tokens;
use crate::types::RoundContext;

use super::{aliased_string_list, string_list};

/// Default compressor budget in tokens.
pub const DEFAULT_COMPRESSOR_BUDGET: u32 = 2_000;

pub fn compress(data: &Value, budget: u32) -> RoundContext {
    let mut context = RoundContext {
        modules: string_list(data, "modules"),
        findings: aliased_string_list(data, &["findings", "keyFindings", "key_findings"]),
        relationships: extract_relationships(data),
        open_questions: aliased_string_list(data, &["open_questions", "openQuestions"]),
        token_count: 0,
    };

    let had_findings = !context.findings.is_empty();
    context.token_count = estimate_tokens(&render(&context));

    while context.token_count > budget {
        let dropped = if !context.open_questions.is_empty() {
            context.open_questions.pop().is_some()
        } else if context.findings.len() > usize::from(had_findings) {
            context.findings.pop().is_some()
        } else if !context.relationships.is_empty() {
            context.relationships.pop().is_some()
        } else if !context.modules.is_empty() {
            context.modules.pop().is_some()
        } else {
            false
        };
        if !dropped {
            break;
        }
        context.token_count = estimate_tokens(&render(&context));
    }

    context
}

/// Relationships: `{from, to, type?}` objects render as `"from -> to (type)"`
/// or `"from -> to"`; string entries pass through unchanged.
fn extract_relationships(data: &Value) -> Vec<String> {
    data.get("relationships")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => {
                        let from = map.get("from").and_then(Value::as_str)?;
                        let to = map.get("to").and_then(Value::as_str)?;
                        let kind = map
                            .get("type")
                            .or_else(|| map.get("kind"))
                            .and_then(Value::as_str);
                        Some(match kind {
                            Some(kind) => format!("{from} -> {to} ({kind})"),
                            None => format!("{from} -> {to}"),
                        })
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Compact text rendering used for token accounting.
fn render(context: &RoundContext) -> String {
    let mut out = String::new();
    if !context.modules.is_empty() {
        out.push_str(&format!("Modules: {}\n", context.modules.join(", ")));
    }
    for finding in &context.findings {
        out.push_str(&format!("- {finding}\n"));
    }
    for relationship in &context.relationships {
        out.push_str(&format!("- {relationship}\n"));
    }
    for question in &context.open_questions {
        out.push_str(&format!("? {question}\n"));
    }
    out
}
