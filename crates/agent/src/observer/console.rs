//! Human-readable run progress on a terminal.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use stepwise_core::error::ObserverError;
use stepwise_core::observer::RunObserver;
use stepwise_core::run::Run;
use stepwise_core::step::{Step, StepOutcome};

/// Longest input shown per step before it is cut off.
const MAX_INPUT_CHARS: usize = 120;

/// Prints run start, each step and the termination reason.
pub struct ConsoleObserver {
    label: String,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleObserver {
    /// Print to stdout, each line prefixed with `[label]`.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_writer(label, std::io::stdout())
    }

    pub fn with_writer(label: impl Into<String>, out: impl Write + Send + 'static) -> Self {
        Self {
            label: label.into(),
            out: Mutex::new(Box::new(out)),
        }
    }

    fn write_line(&self, line: &str) -> Result<(), ObserverError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "[{}] {line}", self.label)
            .and_then(|_| out.flush())
            .map_err(|e| ObserverError::new("console", e.to_string()))
    }

    fn describe_step(step: &Step) -> String {
        let mut line = format!("Step {} {}", step.index + 1, step.action_label());
        if let Some(input) = &step.input {
            let input = input.to_string();
            if input.chars().count() > MAX_INPUT_CHARS {
                let cut: String = input.chars().take(MAX_INPUT_CHARS).collect();
                line.push_str(&format!(" {cut}..."));
            } else {
                line.push_str(&format!(" {input}"));
            }
        }
        match &step.outcome {
            StepOutcome::Succeeded { .. } => line.push_str(&format!(" -> {}", step.summary)),
            StepOutcome::Failed { kind, message } => {
                line.push_str(&format!(" FAILED ({kind}): {message}"))
            }
        }
        line
    }
}

#[async_trait]
impl RunObserver for ConsoleObserver {
    fn name(&self) -> &str {
        "console"
    }

    async fn on_run_started(&self, run: &Run) -> Result<(), ObserverError> {
        self.write_line(&format!("Starting run {}: {}", run.id(), run.objective()))
    }

    async fn on_step_completed(&self, _run: &Run, step: &Step) -> Result<(), ObserverError> {
        self.write_line(&Self::describe_step(step))
    }

    async fn on_run_finished(&self, run: &Run) -> Result<(), ObserverError> {
        let reason = run
            .termination()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".into());
        self.write_line(&format!(
            "Finished: {reason} ({} steps, {} model calls)",
            run.step_count(),
            run.successful_calls()
        ))
    }
}
