//! `write-file`: create or overwrite a file inside the workspace.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use stepwise_core::action::{Action, ActionOutput};
use stepwise_core::error::ActionError;

use crate::workspace::Workspace;

pub struct WriteFileAction {
    workspace: Workspace,
}

impl WriteFileAction {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    fn failed(&self, reason: String) -> ActionError {
        ActionError::ExecutionFailed {
            action_id: self.id().into(),
            reason,
        }
    }
}

#[async_trait]
impl Action for WriteFileAction {
    fn id(&self) -> &str {
        "write-file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and missing directories if needed, \
         overwrites an existing file. Paths are relative to the workspace."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to write to" },
                "content": { "type": "string", "description": "The content to write" }
            },
            "required": ["path", "content"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "bytes": { "type": "integer", "minimum": 0 }
            },
            "required": ["path", "bytes"]
        })
    }

    fn input_example(&self) -> Value {
        json!({ "path": "{file path}", "content": "{file content}" })
    }

    async fn execute(&self, input: Value) -> Result<ActionOutput, ActionError> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ActionError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = input["content"]
            .as_str()
            .ok_or_else(|| ActionError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved = self.workspace.resolve(self.id(), path)?;
        debug!(path = %resolved.display(), bytes = content.len(), "Writing file");

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failed(format!("Failed to create directory for {path}: {e}")))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| self.failed(format!("Failed to write {path}: {e}")))?;

        Ok(ActionOutput::new(
            format!("Wrote {} bytes to {path}", content.len()),
            json!({ "path": path, "bytes": content.len() }),
        ))
    }
}
