//! Run: the full ordered history of one agent execution.
//!
//! A Run is owned by its step loop. Steps and model call records are
//! append-only; nothing is reordered or mutated after it is pushed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Usage;
use crate::step::{NewStep, Step};

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The run controller said stop.
    ControllerStopped,
    /// A terminal action (e.g. `done`) executed successfully.
    DoneActionInvoked { action_id: String },
    /// The model call failed and no retries remained.
    ModelCallFailed { message: String },
    /// Too many consecutive responses failed validation.
    TooManyInvalidResponses { consecutive: u32 },
    /// An external stop signal was observed before the next iteration.
    Cancelled,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ControllerStopped => write!(f, "controller stopped the run"),
            Self::DoneActionInvoked { action_id } => write!(f, "'{action_id}' finished the run"),
            Self::ModelCallFailed { message } => write!(f, "model call failed: {message}"),
            Self::TooManyInvalidResponses { consecutive } => {
                write!(f, "{consecutive} consecutive invalid responses")
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One model invocation, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCallRecord {
    pub id: String,

    /// Index of the step this call was deciding.
    pub step_index: usize,

    /// 1 for the first attempt, incremented per retry.
    pub attempt: u32,

    /// Name of the text generator.
    pub generator: String,

    /// Model reported by the generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The rendered prompt text.
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ModelCallRecord {
    fn base(step_index: usize, attempt: u32, generator: &str, prompt: String, started_at: DateTime<Utc>) -> Self {
        let duration_ms = Utc::now()
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as u64;
        Self {
            id: Uuid::new_v4().to_string(),
            step_index,
            attempt,
            generator: generator.to_string(),
            model: None,
            prompt,
            response: None,
            error: None,
            success: false,
            usage: None,
            started_at,
            duration_ms,
        }
    }

    pub fn succeeded(
        step_index: usize,
        attempt: u32,
        generator: &str,
        prompt: String,
        started_at: DateTime<Utc>,
        generation: &crate::model::Generation,
    ) -> Self {
        Self {
            model: Some(generation.model.clone()),
            response: Some(generation.text.clone()),
            success: true,
            usage: generation.usage,
            ..Self::base(step_index, attempt, generator, prompt, started_at)
        }
    }

    pub fn failed(
        step_index: usize,
        attempt: u32,
        generator: &str,
        prompt: String,
        started_at: DateTime<Utc>,
        error: &crate::error::ModelCallError,
    ) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::base(step_index, attempt, generator, prompt, started_at)
        }
    }
}

/// The state of one agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    id: String,
    objective: String,
    steps: Vec<Step>,
    recorded_calls: Vec<ModelCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    termination: Option<TerminationReason>,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a running Run with an empty history.
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            objective: objective.into(),
            steps: Vec::new(),
            recorded_calls: Vec::new(),
            termination: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// The last `n` steps, oldest first.
    pub fn recent_steps(&self, n: usize) -> &[Step] {
        let start = self.steps.len().saturating_sub(n);
        &self.steps[start..]
    }

    pub fn recorded_calls(&self) -> &[ModelCallRecord] {
        &self.recorded_calls
    }

    pub fn successful_calls(&self) -> usize {
        self.recorded_calls.iter().filter(|c| c.success).count()
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        self.termination.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Append a step; the Run assigns its index and timestamp.
    pub fn append_step(&mut self, new: NewStep) -> &Step {
        let index = self.steps.len();
        self.steps.push(Step::from_new(index, new));
        &self.steps[index]
    }

    pub fn record_call(&mut self, record: ModelCallRecord) -> &ModelCallRecord {
        self.recorded_calls.push(record);
        &self.recorded_calls[self.recorded_calls.len() - 1]
    }

    /// Mark the run finished. The first reason wins; returns false if the
    /// run was already terminated.
    pub fn terminate(&mut self, reason: TerminationReason) -> bool {
        if self.termination.is_some() {
            return false;
        }
        self.termination = Some(reason);
        self.finished_at = Some(Utc::now());
        true
    }
}
