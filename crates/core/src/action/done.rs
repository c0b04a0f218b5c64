//! The built-in terminal action.

use async_trait::async_trait;

use super::{Action, ActionOutput};
use crate::error::ActionError;

/// Ends the run as soon as it executes.
///
/// Several may be registered under different identifiers, e.g. `done` for
/// a finished task and `user-action` for "the user needs to do something".
#[derive(Debug, Clone)]
pub struct DoneAction {
    id: String,
    description: String,
}

impl DoneAction {
    pub fn new() -> Self {
        Self::with_id(
            "done",
            "Indicate that you are done with the task. Summarize the result.",
        )
    }

    pub fn with_id(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

impl Default for DoneAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for DoneAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "result": { "type": "string", "description": "What was accomplished" }
            },
            "required": ["result"]
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        self.input_schema()
    }

    fn input_example(&self) -> serde_json::Value {
        serde_json::json!({ "result": "{summary of the result}" })
    }

    fn terminates_run(&self) -> bool {
        true
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ActionOutput, ActionError> {
        let result = input["result"]
            .as_str()
            .ok_or_else(|| ActionError::InvalidArguments("Missing 'result' argument".into()))?
            .to_string();
        Ok(ActionOutput::new(
            format!("{}: {result}", self.id),
            serde_json::json!({ "result": result }),
        ))
    }
}
