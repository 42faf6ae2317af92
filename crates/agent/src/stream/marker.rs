//! Tool-invocation marker grammar.
//!
//! ```text
//! <tool_call>
//! <invoke name="read_file">
//! <parameter name="path">src/main.rs</parameter>
//! </invoke>
//! </tool_call>
//! ```
//!
//! A block may hold several `<invoke>` elements. Parameter values are raw
//! text; they are converted to JSON using the declared field type of the
//! target tool.

use std::sync::LazyLock;

use loomterm_core::schema::FieldType;
use loomterm_core::tool::{ToolCall, ToolRegistry};
use regex::Regex;
use serde_json::{Map, Number, Value};

pub const TOOL_OPEN: &str = "<tool_call>";
pub const TOOL_CLOSE: &str = "</tool_call>";

static INVOKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<invoke\s+name\s*=\s*["']?([^"'>]+?)["']?\s*>(.*?)</invoke>"#)
        .expect("invoke pattern is valid")
});

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<parameter\s+name\s*=\s*["']?([^"'>]+?)["']?\s*>(.*?)</parameter>"#)
        .expect("parameter pattern is valid")
});

/// One `<invoke>` element before type conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoke {
    pub name: String,
    pub params: Vec<(String, String)>,
}

/// Extract the invokes of a complete block, in textual order.
pub fn parse_block(block: &str) -> Vec<Invoke> {
    INVOKE_RE
        .captures_iter(block)
        .map(|cap| {
            let params = PARAM_RE
                .captures_iter(&cap[2])
                .map(|p| {
                    let value = p[2].trim_matches(|c| c == '\n' || c == '\r');
                    (p[1].trim().to_string(), value.to_string())
                })
                .collect();
            Invoke {
                name: cap[1].trim().to_string(),
                params,
            }
        })
        .collect()
}

/// Convert a raw parameter value using the declared field type.
///
/// Values that do not convert stay strings so schema validation can report
/// them. Undeclared and string fields are kept verbatim; for the other types
/// the exact literal `null` becomes JSON null.
pub fn convert_value(raw: &str, kind: Option<FieldType>) -> Value {
    let trimmed = raw.trim();
    let as_string = || Value::String(raw.to_string());

    match kind {
        None | Some(FieldType::String) => as_string(),
        Some(_) if trimmed == "null" => Value::Null,
        Some(FieldType::Integer) => trimmed
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| as_string()),
        Some(FieldType::Number) => match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Value::from(v as i64)
            }
            Ok(v) => Number::from_f64(v).map(Value::Number).unwrap_or_else(as_string),
            Err(_) => as_string(),
        },
        Some(FieldType::Boolean) => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => as_string(),
        },
        Some(FieldType::Array) | Some(FieldType::Object) => {
            serde_json::from_str(trimmed).unwrap_or_else(|_| as_string())
        }
    }
}

/// Turn a complete block into pending tool calls.
///
/// Ids are `call_<round>_<n>` with `n` continuing from `already_detected`.
pub fn build_calls(
    block: &str,
    round: usize,
    already_detected: usize,
    registry: &ToolRegistry,
) -> Vec<ToolCall> {
    parse_block(block)
        .into_iter()
        .enumerate()
        .map(|(i, invoke)| {
            let schema = registry.lookup(&invoke.name).map(|def| &def.input_schema);
            let mut input = Map::new();
            for (key, raw) in invoke.params {
                let kind = schema.and_then(|s| s.field_type(&key));
                input.insert(key, convert_value(&raw, kind));
            }
            ToolCall::pending(
                format!("call_{round}_{}", already_detected + i + 1),
                invoke.name,
                input,
            )
        })
        .collect()
}

/// Length of the longest suffix of `pending` that is a proper prefix of
/// [`TOOL_OPEN`].
pub fn partial_open_suffix(pending: &str) -> usize {
    (1..TOOL_OPEN.len())
        .rev()
        .find(|&k| pending.ends_with(&TOOL_OPEN[..k]))
        .unwrap_or(0)
}
