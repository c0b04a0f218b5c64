//! Error types for the Stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them for callers that want a single type.

use thiserror::Error;

/// The top-level error type for all Stepwise operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Model call error: {0}")]
    ModelCall(#[from] ModelCallError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the model-call abstraction (transport or provider side).
#[derive(Debug, Clone, Error)]
pub enum ModelCallError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model exhausted: {0}")]
    Exhausted(String),
}

/// Why a model response could not be turned into an action invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Malformed output: {reason}")]
    MalformedOutput { reason: String },

    #[error("Unknown action '{action_id}' (available: {})", available.join(", "))]
    UnknownAction {
        action_id: String,
        available: Vec<String>,
    },

    #[error("Input for '{action_id}' violates its schema: {}", violations.join("; "))]
    SchemaViolation {
        action_id: String,
        violations: Vec<String>,
    },
}

/// Failures raised by an action's execute operation.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("Action execution failed: {action_id} - {reason}")]
    ExecutionFailed { action_id: String, reason: String },

    #[error("Action timed out: {action_id} after {timeout_secs}s")]
    Timeout { action_id: String, timeout_secs: u64 },

    #[error("Permission denied: {action_id} - {reason}")]
    PermissionDenied { action_id: String, reason: String },

    #[error("Invalid action arguments: {0}")]
    InvalidArguments(String),
}

/// Problems building an action registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Action '{0}' is already registered")]
    DuplicateAction(String),

    #[error("Action '{action_id}' has an invalid {which} schema: {reason}")]
    InvalidSchema {
        action_id: String,
        which: &'static str,
        reason: String,
    },
}

/// Failure inside an observer hook. Logged, never propagated to the loop.
#[derive(Debug, Clone, Error)]
#[error("Observer '{observer}' failed: {message}")]
pub struct ObserverError {
    pub observer: String,
    pub message: String,
}

impl ObserverError {
    pub fn new(observer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            message: message.into(),
        }
    }
}
