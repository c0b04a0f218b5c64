//! Serialization formats for model-to-action communication.
//!
//! A format tells the model how to express its choice (via `description`
//! and `encode`, used for catalog examples) and turns the model's raw
//! response back into an [`ActionInvocation`].

use serde_json::Value;

use super::ActionInvocation;
use crate::error::ValidationError;

/// How the model expresses the action it wants to run.
pub trait ActionFormat: Send + Sync {
    /// Short identifier, e.g. "json".
    fn name(&self) -> &str;

    /// Instructions shown to the model above the action catalog.
    fn description(&self) -> &str;

    /// Render an invocation the way the model is expected to write it.
    fn encode(&self, action_id: &str, input: &Value) -> String;

    /// Parse a raw response. Only ever fails with `MalformedOutput`.
    fn decode(&self, text: &str) -> Result<ActionInvocation, ValidationError>;
}

fn malformed(reason: impl Into<String>) -> ValidationError {
    ValidationError::MalformedOutput {
        reason: reason.into(),
    }
}

fn envelope(action_id: &str, input: &Value) -> String {
    serde_json::json!({ "action": action_id, "input": input }).to_string()
}

/// Read `{"action": ..., "input": ...}` out of an already-parsed object.
fn invocation_from_object(value: &Value) -> Result<ActionInvocation, ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object"))?;

    let action_id = match object.get("action") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::String(_)) => return Err(malformed("\"action\" must not be empty")),
        Some(_) => return Err(malformed("\"action\" must be a string")),
        None => return Err(malformed("missing \"action\" field")),
    };

    let input = object
        .get("input")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let reasoning = object
        .get("thought")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ActionInvocation {
        action_id,
        input,
        reasoning,
    })
}

/// Strict format: the whole response is one JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonActionFormat;

impl ActionFormat for JsonActionFormat {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Respond with exactly one JSON object and nothing else, of the form \
         {\"action\": \"<action id>\", \"input\": {<input>}}. \
         An optional \"thought\" string may explain your choice."
    }

    fn encode(&self, action_id: &str, input: &Value) -> String {
        envelope(action_id, input)
    }

    fn decode(&self, text: &str) -> Result<ActionInvocation, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty response"));
        }
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| malformed(format!("response is not valid JSON: {e}")))?;
        invocation_from_object(&value)
    }
}

/// Tolerant format: free text with an embedded JSON object.
///
/// The first `{...}` in the response that parses and carries an `"action"`
/// field is used. Text before it becomes the invocation's reasoning.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleJsonActionFormat;

impl FlexibleJsonActionFormat {
    /// Byte offset and value of the first parseable object with an action.
    fn find_action_object(text: &str) -> Option<(usize, Value)> {
        for (start, _) in text.match_indices('{') {
            let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            if let Some(Ok(value)) = stream.next()
                && value.get("action").is_some()
            {
                return Some((start, value));
            }
        }
        None
    }
}

impl ActionFormat for FlexibleJsonActionFormat {
    fn name(&self) -> &str {
        "flexible-json"
    }

    fn description(&self) -> &str {
        "You may reason step by step first. Then write a JSON object of the form \
         {\"action\": \"<action id>\", \"input\": {<input>}} to choose the next action."
    }

    fn encode(&self, action_id: &str, input: &Value) -> String {
        envelope(action_id, input)
    }

    fn decode(&self, text: &str) -> Result<ActionInvocation, ValidationError> {
        let (start, value) = Self::find_action_object(text)
            .ok_or_else(|| malformed("no JSON object with an \"action\" field found"))?;

        let mut invocation = invocation_from_object(&value)?;

        let preamble = text[..start]
            .trim_end()
            .trim_end_matches("```json")
            .trim_end_matches("```")
            .trim();
        if !preamble.is_empty() && invocation.reasoning.is_none() {
            invocation.reasoning = Some(preamble.to_string());
        }
        Ok(invocation)
    }
}
