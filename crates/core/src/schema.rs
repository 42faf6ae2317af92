//! Tool input schemas.
//!
//! A schema is a flat, ordered list of named fields, each with a type and a
//! required flag. Field order matters: validation reports the first violated
//! constraint in declaration order, and the JSON Schema sent to the model
//! lists properties in the same order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON type a field must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` inhabits this type. `null` never does.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldType,
    pub required: bool,
    pub description: String,
}

/// The declared input of a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    pub fn required(self, name: &str, kind: FieldType, description: &str) -> Self {
        self.field(name, kind, true, description)
    }

    /// Add an optional field.
    pub fn optional(self, name: &str, kind: FieldType, description: &str) -> Self {
        self.field(name, kind, false, description)
    }

    fn field(mut self, name: &str, kind: FieldType, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up the declared type of a field.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    /// Check `input` against the schema.
    ///
    /// Returns a description of the first violated constraint: fields are
    /// checked in declaration order (missing, then wrong type), then any
    /// undeclared key is rejected. An explicit `null` on an optional field
    /// counts as absent.
    pub fn validate(&self, input: &Map<String, Value>) -> std::result::Result<(), String> {
        for field in &self.fields {
            match input.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.matches(value) => {
                    return Err(format!(
                        "field '{}' must be {} but got {}",
                        field.name,
                        field.kind,
                        json_type_name(value)
                    ));
                }
                Some(_) => {}
            }
        }

        if let Some(unknown) = input
            .keys()
            .find(|k| !self.fields.iter().any(|f| &f.name == *k))
        {
            return Err(format!("unexpected field '{unknown}'"));
        }

        Ok(())
    }

    /// Render as a JSON Schema object for the model-facing tool catalogue.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                serde_json::json!({
                    "type": field.kind.as_str(),
                    "description": field.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
