//! Step: the immutable record of one loop iteration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The response did not match the serialization format.
    MalformedOutput,
    /// The response named an action that is not registered.
    UnknownAction,
    /// The input did not satisfy the action's input schema.
    SchemaViolation,
    /// The action's execute operation failed.
    ActionExecutionFailed,
}

impl FailureKind {
    /// Validation failures count towards the consecutive-invalid threshold.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::ActionExecutionFailed)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedOutput => write!(f, "malformed_output"),
            Self::UnknownAction => write!(f, "unknown_action"),
            Self::SchemaViolation => write!(f, "schema_violation"),
            Self::ActionExecutionFailed => write!(f, "action_execution_failed"),
        }
    }
}

impl From<&ValidationError> for FailureKind {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::MalformedOutput { .. } => Self::MalformedOutput,
            ValidationError::UnknownAction { .. } => Self::UnknownAction,
            ValidationError::SchemaViolation { .. } => Self::SchemaViolation,
        }
    }
}

/// What happened when the step was attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded {
        output: serde_json::Value,
        /// Set by terminal actions such as `done`.
        #[serde(default)]
        terminates_run: bool,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            Self::Succeeded { .. } => None,
        }
    }

    pub fn terminates_run(&self) -> bool {
        matches!(
            self,
            Self::Succeeded {
                terminates_run: true,
                ..
            }
        )
    }
}

/// Everything about a step except the fields the Run assigns on append.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub action_id: Option<String>,
    pub input: Option<serde_json::Value>,
    pub reasoning: Option<String>,
    pub raw_response: Option<String>,
    pub outcome: StepOutcome,
    pub summary: String,
}

impl NewStep {
    /// A step for a response that never reached dispatch.
    pub fn invalid(raw_response: impl Into<String>, error: &ValidationError) -> Self {
        let action_id = match error {
            ValidationError::UnknownAction { action_id, .. }
            | ValidationError::SchemaViolation { action_id, .. } => Some(action_id.clone()),
            ValidationError::MalformedOutput { .. } => None,
        };
        Self {
            action_id,
            input: None,
            reasoning: None,
            raw_response: Some(raw_response.into()),
            outcome: StepOutcome::Failed {
                kind: FailureKind::from(error),
                message: error.to_string(),
            },
            summary: error.to_string(),
        }
    }
}

/// One recorded iteration. Immutable once appended to a Run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Zero-based position in the run.
    pub index: usize,

    /// The chosen action, when the response named one.
    pub action_id: Option<String>,

    /// The validated input.
    pub input: Option<serde_json::Value>,

    /// Free text the model wrote around its action choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Raw model response, kept for steps that failed validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,

    pub outcome: StepOutcome,

    /// Human/model-readable summary of the outcome.
    pub summary: String,

    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub(crate) fn from_new(index: usize, new: NewStep) -> Self {
        Self {
            index,
            action_id: new.action_id,
            input: new.input,
            reasoning: new.reasoning,
            raw_response: new.raw_response,
            outcome: new.outcome,
            summary: new.summary,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Label used in history and console output.
    pub fn action_label(&self) -> &str {
        self.action_id.as_deref().unwrap_or("(none)")
    }
}
