//! Declarative response schemas, validated over the decoded JSON tree
//! independent of transport.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    /// Any array; element shapes are round-specific and tolerated loosely.
    Array,
    Object,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl ResponseSchema {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    /// Structural validation. Extra fields are tolerated; missing required
    /// fields and kind mismatches are not.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let Some(object) = value.as_object() else {
            return Err(format!("{}: response is not a JSON object", self.name));
        };
        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!(
                            "{}: missing required field '{}'",
                            self.name, field.name
                        ));
                    }
                }
                Some(actual) => {
                    if !field.kind.matches(actual) {
                        return Err(format!(
                            "{}: field '{}' should be {}",
                            self.name,
                            field.name,
                            field.kind.describe()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Render the expected JSON shape for inclusion in a prompt.
    pub fn prompt_block(&self) -> String {
        let mut out = String::from("{\n");
        for (i, field) in self.fields.iter().enumerate() {
            let placeholder = match field.kind {
                FieldKind::String => "\"...\"",
                FieldKind::Number => "0",
                FieldKind::Bool => "false",
                FieldKind::Array => "[...]",
                FieldKind::Object => "{...}",
            };
            let comma = if i + 1 == self.fields.len() { "" } else { "," };
            let note = if field.required { "" } else { "  // optional" };
            out.push_str(&format!(
                "  \"{}\": {placeholder}{comma}{note}\n",
                field.name
            ));
        }
        out.push('}');
        out
    }
}

/// Convenience constructors used by the round factories.
pub fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

pub fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

/// Extract a JSON object from raw model output: direct parse first, then
/// fenced blocks, then the outermost brace span.
pub fn extract_json(text: &str) -> Result<Value, String> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(value) = serde_json::from_str::<Value>(after[..end].trim()) {
                return Ok(value);
            }
        }
    }

    let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) else {
        return Err("no JSON object found in response".to_string());
    };
    if close <= open {
        return Err("no JSON object found in response".to_string());
    }
    serde_json::from_str::<Value>(&text[open..=close]).map_err(|e| e.to_string())
}
