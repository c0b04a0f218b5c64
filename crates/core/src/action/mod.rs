//! Action trait: the abstraction over agent capabilities.
//!
//! Actions are what give the agent the ability to act in the world:
//! read and write files, run commands, ask the user, or finish the run.
//! The model picks one per step; the [`ActionRegistry`] validates the
//! choice and dispatches it.

mod done;
mod format;
mod registry;
mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;

pub use done::DoneAction;
pub use format::{ActionFormat, FlexibleJsonActionFormat, JsonActionFormat};
pub use registry::ActionRegistry;
pub use schema::CompiledSchema;

/// What an action's execute operation returns on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Short human-readable description of what happened.
    pub summary: String,

    /// Structured output, checked against the action's output schema.
    pub output: serde_json::Value,
}

impl ActionOutput {
    pub fn new(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output,
        }
    }
}

/// A parsed model choice: which action, with which input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub action_id: String,
    pub input: serde_json::Value,

    /// Text the model wrote around the action, if the format keeps it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ActionInvocation {
    pub fn new(action_id: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            action_id: action_id.into(),
            input,
            reasoning: None,
        }
    }
}

/// Result of dispatching an invocation through the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success {
        output: ActionOutput,
        terminates_run: bool,
    },
    Failure {
        message: String,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// The core Action trait.
///
/// Each capability implements this trait and is registered in an
/// [`ActionRegistry`]. Schemas are read once at registration and compiled;
/// implementations must return the same schema on every call.
#[async_trait]
pub trait Action: Send + Sync {
    /// Unique identifier within a registry (e.g. "read-file").
    fn id(&self) -> &str;

    /// What this action does (shown to the model).
    fn description(&self) -> &str;

    /// JSON Schema for the input.
    fn input_schema(&self) -> serde_json::Value;

    /// JSON Schema for the structured output. Defaults to "anything".
    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Example input rendered in the action catalog.
    fn input_example(&self) -> serde_json::Value;

    /// Terminal actions end the run as soon as they succeed.
    fn terminates_run(&self) -> bool {
        false
    }

    /// Perform the action.
    async fn execute(&self, input: serde_json::Value) -> Result<ActionOutput, ActionError>;

    /// Short summary of an outcome for display and for later prompts.
    fn format_result(&self, _input: &serde_json::Value, output: &ActionOutput) -> String {
        output.summary.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_actions {
    use super::*;

    /// Echoes `text` back as output.
    pub struct EchoAction;

    #[async_trait]
    impl Action for EchoAction {
        fn id(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input text."
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        fn output_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        fn input_example(&self) -> serde_json::Value {
            serde_json::json!({ "text": "{text to echo}" })
        }
        async fn execute(&self, input: serde_json::Value) -> Result<ActionOutput, ActionError> {
            let text = input["text"].as_str().unwrap_or_default().to_string();
            Ok(ActionOutput::new(
                format!("Echoed {} chars", text.len()),
                serde_json::json!({ "text": text }),
            ))
        }
        fn format_result(&self, _input: &serde_json::Value, output: &ActionOutput) -> String {
            format!("echo: {}", output.output["text"].as_str().unwrap_or_default())
        }
    }

    /// Always fails, panics, or returns badly-shaped output, per mode.
    pub enum BrokenAction {
        Fails,
        Panics,
        BadOutput,
    }

    #[async_trait]
    impl Action for BrokenAction {
        fn id(&self) -> &str {
            match self {
                Self::Fails => "fails",
                Self::Panics => "panics",
                Self::BadOutput => "bad-output",
            }
        }
        fn description(&self) -> &str {
            "Misbehaves."
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        fn output_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "required": ["value"] })
        }
        fn input_example(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, _input: serde_json::Value) -> Result<ActionOutput, ActionError> {
            match self {
                Self::Fails => Err(ActionError::ExecutionFailed {
                    action_id: "fails".into(),
                    reason: "disk on fire".into(),
                }),
                Self::Panics => panic!("boom"),
                Self::BadOutput => Ok(ActionOutput::new("ok", serde_json::json!({ "other": 1 }))),
            }
        }
    }
}
