use serde_json::Value;

/// How a PATCH body treats one optional text field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPatch {
    Keep,
    Clear,
    Set(String),
}

impl FieldPatch {
    /// Absent keeps the stored value; `null` or a blank string clears it.
    pub fn from_body(body: &Value, field: &str) -> Result<Self, String> {
        match body.get(field) {
            None => Ok(FieldPatch::Keep),
            Some(Value::Null) => Ok(FieldPatch::Clear),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(FieldPatch::Clear)
                } else {
                    Ok(FieldPatch::Set(trimmed.to_string()))
                }
            }
            Some(other) => Err(format!("{field}: expected string or null, got {other}")),
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, FieldPatch::Keep)
    }

    pub fn apply(self, current: Option<String>) -> Option<String> {
        match self {
            FieldPatch::Keep => current,
            FieldPatch::Clear => None,
            FieldPatch::Set(value) => Some(value),
        }
    }
}
