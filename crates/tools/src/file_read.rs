//! `read-file`: read a text file inside the workspace.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use stepwise_core::action::{Action, ActionOutput};
use stepwise_core::error::ActionError;

use crate::workspace::Workspace;

/// Characters of file content kept in the step summary.
const SUMMARY_PREVIEW_CHARS: usize = 2_000;

pub struct ReadFileAction {
    workspace: Workspace,
}

impl ReadFileAction {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Action for ReadFileAction {
    fn id(&self) -> &str {
        "read-file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Paths are relative to the workspace."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to read" }
            },
            "required": ["path"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })
    }

    fn input_example(&self) -> Value {
        json!({ "path": "{file path}" })
    }

    async fn execute(&self, input: Value) -> Result<ActionOutput, ActionError> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ActionError::InvalidArguments("Missing 'path' argument".into()))?;
        let resolved = self.workspace.resolve(self.id(), path)?;
        debug!(path = %resolved.display(), "Reading file");

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ActionError::ExecutionFailed {
                action_id: self.id().into(),
                reason: format!("Failed to read {path}: {e}"),
            })?;

        Ok(ActionOutput::new(
            format!("Read {} bytes from {path}", content.len()),
            json!({ "path": path, "content": content }),
        ))
    }

    fn format_result(&self, _input: &Value, output: &ActionOutput) -> String {
        let path = output.output["path"].as_str().unwrap_or_default();
        let content = output.output["content"].as_str().unwrap_or_default();
        let preview: String = content.chars().take(SUMMARY_PREVIEW_CHARS).collect();
        let ellipsis = if preview.len() < content.len() { "\n..." } else { "" };
        format!("File {path}:\n```\n{preview}{ellipsis}\n```")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(dir: &tempfile::TempDir) -> ReadFileAction {
        ReadFileAction::new(Workspace::new(dir.path()))
    }

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "Hello, world!\n").unwrap();

        let output = action(&dir)
            .execute(json!({ "path": "test.txt" }))
            .await
            .unwrap();
        assert_eq!(output.output["content"], "Hello, world!\n");
        assert_eq!(output.summary, "Read 14 bytes from test.txt");
    }

    #[tokio::test]
    async fn missing_file_is_an_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = action(&dir)
            .execute(json!({ "path": "nope.txt" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("nope.txt"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            action(&dir).execute(json!({})).await,
            Err(ActionError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let err = action(&dir)
            .execute(json!({ "path": "../../../etc/passwd" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::PermissionDenied { .. }));
    }

    #[test]
    fn format_result_fences_content() {
        let dir = tempfile::tempdir().unwrap();
        let output = ActionOutput::new("", json!({ "path": "a.txt", "content": "abc" }));
        assert_eq!(
            action(&dir).format_result(&json!({}), &output),
            "File a.txt:\n```\nabc\n```"
        );
    }

    #[test]
    fn format_result_truncates_long_files() {
        let dir = tempfile::tempdir().unwrap();
        let content = "x".repeat(SUMMARY_PREVIEW_CHARS + 10);
        let output = ActionOutput::new("", json!({ "path": "big.txt", "content": content }));
        let summary = action(&dir).format_result(&json!({}), &output);
        assert!(summary.ends_with("\n...\n```"));
    }
}
