//! `run-command`: execute a shell command in the workspace.
//!
//! Supports command allowlisting, workspace scoping, and timeout. With an
//! allowlist, shell chaining and redirection are refused.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use stepwise_core::action::{Action, ActionOutput};
use stepwise_core::error::ActionError;

/// Bytes of stdout/stderr kept per stream.
const MAX_STREAM_BYTES: usize = 16 * 1024;

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '$', '`', '<', '>', '(', ')', '\n', '\r'];

pub struct RunCommandAction {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl RunCommandAction {
    pub fn new(allowed_commands: Vec<String>, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            allowed_commands,
            working_dir: working_dir.into(),
            timeout,
        }
    }

    fn base_command(command: &str) -> &str {
        command.split_whitespace().next().unwrap_or("")
    }

    /// With an allowlist, the command must be a single allowlisted program:
    /// anything `sh` would treat as chaining, substitution or redirection is
    /// refused.
    fn check_command(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(format!("Shell metacharacter {c:?} is not allowed"));
        }
        let base = Self::base_command(command);
        if self.allowed_commands.iter().any(|a| a == base) {
            Ok(())
        } else {
            Err(format!("Command '{base}' not in allowlist"))
        }
    }
}

fn truncate(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_STREAM_BYTES {
        return text.trim_end().to_string();
    }
    let mut end = MAX_STREAM_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[truncated]", &text[..end])
}

#[async_trait]
impl Action for RunCommandAction {
    fn id(&self) -> &str {
        "run-command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return its exit code, stdout and stderr."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" }
            },
            "required": ["command"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "exit_code": { "type": ["integer", "null"] },
                "stdout": { "type": "string" },
                "stderr": { "type": "string" }
            },
            "required": ["exit_code", "stdout", "stderr"]
        })
    }

    fn input_example(&self) -> Value {
        json!({ "command": "{command}" })
    }

    async fn execute(&self, input: Value) -> Result<ActionOutput, ActionError> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| ActionError::InvalidArguments("Missing 'command' argument".into()))?;

        if let Err(reason) = self.check_command(command) {
            warn!(command = %command, reason = %reason, "Command rejected");
            return Err(ActionError::PermissionDenied {
                action_id: self.id().into(),
                reason,
            });
        }

        debug!(command = %command, cwd = %self.working_dir.display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.working_dir).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ActionError::Timeout {
                action_id: self.id().into(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ActionError::ExecutionFailed {
                action_id: self.id().into(),
                reason: e.to_string(),
            })?;

        let code = output.status.code();
        let stdout = truncate(&output.stdout);
        let stderr = truncate(&output.stderr);
        if !output.status.success() {
            warn!(command = %command, exit_code = code.unwrap_or(-1), "Command failed");
        }

        Ok(ActionOutput::new(
            format!("`{command}` exited with {}", code.unwrap_or(-1)),
            json!({ "exit_code": code, "stdout": stdout, "stderr": stderr }),
        ))
    }

    fn format_result(&self, input: &Value, output: &ActionOutput) -> String {
        let command = input["command"].as_str().unwrap_or_default();
        let code = output.output["exit_code"].as_i64().unwrap_or(-1);
        let stdout = output.output["stdout"].as_str().unwrap_or_default();
        let stderr = output.output["stderr"].as_str().unwrap_or_default();

        let mut text = format!("$ {command}\n[exit code: {code}]");
        if !stdout.is_empty() {
            text.push_str(&format!("\n{stdout}"));
        }
        if !stderr.is_empty() {
            text.push_str(&format!("\n[stderr]: {stderr}"));
        }
        text
    }
}
