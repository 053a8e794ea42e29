//! This module contains all the prompt-related data.

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use super::ChainError;
use crate::tools::dedent::autodedent;

/// Appended to the last turn when a structured response is requested, followed by the schema.
pub static JSON_FORMAT: &str = "You must respond in the following example JSON format. \
Remember to enclose the entire JSON object in curly braces:";

/// Instruction asking the model to answer following the example `schema`.
/// The schema must be a JSON object.
pub fn json_schema_instruction(schema: &Value) -> Result<String, ChainError> {
    if !schema.is_object() {
        return Err(ChainError::InvalidArgument(format!(
            "JSON schema must be an object, not {}",
            value_kind(schema)
        )));
    }

    let mut pretty = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut pretty, PrettyFormatter::with_indent(b"    "));
    schema
        .serialize(&mut serializer)
        .map_err(|e| ChainError::InvalidArgument(format!("cannot serialize JSON schema: {e}")))?;

    let pretty = String::from_utf8_lossy(&pretty).into_owned();
    Ok(autodedent([JSON_FORMAT, pretty.as_str()]))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
