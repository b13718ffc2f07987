use serde::{Deserialize, Serialize};

/// Dynamic value published by a node field or held in a node's configuration
pub type Value = serde_json::Value;

/// A published value together with its declared type name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl TypedValue {
    pub fn new(value: impl Into<Value>, value_type: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            value_type: value_type.into(),
        }
    }

    /// Wrap a value, deriving its type name from the JSON shape
    pub fn inferred(value: impl Into<Value>) -> Self {
        let value = value.into();
        let value_type = type_name_of(&value).to_string();
        Self { value, value_type }
    }
}

/// Type name used by the editor forms for a JSON value
pub fn type_name_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Integer",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}
