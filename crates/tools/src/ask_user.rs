//! `ask-user`: ask the human a question and wait for a one-line answer.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;

use stepwise_core::action::{Action, ActionOutput};
use stepwise_core::error::ActionError;

/// Line-oriented prompt over any async reader/writer pair.
pub struct AskUserAction<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> AskUserAction<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    fn failed(&self, reason: impl Into<String>) -> ActionError {
        ActionError::ExecutionFailed {
            action_id: "ask-user".into(),
            reason: reason.into(),
        }
    }
}

impl AskUserAction<BufReader<Stdin>, Stdout> {
    /// Prompt on the process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> Action for AskUserAction<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn id(&self) -> &str {
        "ask-user"
    }

    fn description(&self) -> &str {
        "Ask the user a question when you need information only they have. Wait for their answer."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The question or action to put to the user" }
            },
            "required": ["query"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "response": { "type": "string" } },
            "required": ["response"]
        })
    }

    fn input_example(&self) -> Value {
        json!({ "query": "{question or action description}" })
    }

    async fn execute(&self, input: Value) -> Result<ActionOutput, ActionError> {
        let query = input["query"]
            .as_str()
            .ok_or_else(|| ActionError::InvalidArguments("Missing 'query' argument".into()))?;

        let mut guard = self.io.lock().await;
        let (reader, writer) = &mut *guard;

        writer
            .write_all(format!("{query}\n> ").as_bytes())
            .await
            .map_err(|e| self.failed(e.to_string()))?;
        writer.flush().await.map_err(|e| self.failed(e.to_string()))?;

        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| self.failed(e.to_string()))?;
        if read == 0 {
            return Err(self.failed("input closed before an answer was given"));
        }

        let response = line.trim().to_string();
        Ok(ActionOutput::new(
            format!("User response: {response}"),
            json!({ "response": response }),
        ))
    }

    fn format_result(&self, input: &Value, output: &ActionOutput) -> String {
        format!(
            "{}: {}",
            input["query"].as_str().unwrap_or_default(),
            output.output["response"].as_str().unwrap_or_default()
        )
    }
}
