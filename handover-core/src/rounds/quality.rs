//! Shared helpers for per-round quality thresholds.

use serde_json::Value;

use crate::types::QualityMetrics;

/// Require an array field to have at least `min` entries.
pub fn check_min_entries(
    data: &Value,
    field: &str,
    min: usize,
    reasons: &mut Vec<String>,
) {
    let count = data
        .get(field)
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    if count < min {
        reasons.push(format!(
            "field '{field}' has {count} entries, needs at least {min}"
        ));
    }
}

/// Require a non-empty string field.
pub fn check_non_empty_string(data: &Value, field: &str, reasons: &mut Vec<String>) {
    let ok = data
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !ok {
        reasons.push(format!("field '{field}' is empty"));
    }
}

pub fn metrics_from(reasons: Vec<String>) -> QualityMetrics {
    if reasons.is_empty() {
        QualityMetrics::acceptable()
    } else {
        QualityMetrics::rejected(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn min_entries_threshold() {
        let mut reasons = Vec::new();
        check_min_entries(&json!({"modules": [1]}), "modules", 1, &mut reasons);
        assert!(reasons.is_empty());

        check_min_entries(&json!({"modules": []}), "modules", 1, &mut reasons);
        assert_eq!(reasons.len(), 1);

        check_min_entries(&json!({}), "modules", 1, &mut reasons);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn non_empty_string_threshold() {
        let mut reasons = Vec::new();
        check_non_empty_string(&json!({"purpose": "real"}), "purpose", &mut reasons);
        assert!(reasons.is_empty());

        check_non_empty_string(&json!({"purpose": "  "}), "purpose", &mut reasons);
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn metrics_conversion() {
        assert!(metrics_from(Vec::new()).is_acceptable);
        let rejected = metrics_from(vec!["bad".into()]);
        assert!(!rejected.is_acceptable);
        assert_eq!(rejected.reasons, vec!["bad"]);
    }
}
