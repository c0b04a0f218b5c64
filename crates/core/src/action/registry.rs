//! The action registry: validates model output and dispatches actions.
//!
//! The step loop uses this to:
//! 1. Render the action catalog for prompts
//! 2. Turn a raw model response into a validated invocation
//! 3. Execute the chosen action without letting failures escape

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use super::format::ActionFormat;
use super::schema::CompiledSchema;
use super::{Action, ActionInvocation, ActionOutput, ExecutionOutcome};
use crate::error::{RegistryError, ValidationError};

struct RegisteredAction {
    action: Arc<dyn Action>,
    input_schema: CompiledSchema,
    output_schema: CompiledSchema,
}

/// An ordered set of actions plus the format the model must answer in.
///
/// Registration order drives catalog rendering; dispatch is by identifier.
pub struct ActionRegistry {
    actions: Vec<RegisteredAction>,
    by_id: HashMap<String, usize>,
    format: Arc<dyn ActionFormat>,
}

impl ActionRegistry {
    pub fn new(format: Arc<dyn ActionFormat>) -> Self {
        Self {
            actions: Vec::new(),
            by_id: HashMap::new(),
            format,
        }
    }

    /// Build a registry from a list of actions, in order.
    pub fn with_actions(
        format: Arc<dyn ActionFormat>,
        actions: impl IntoIterator<Item = Arc<dyn Action>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(format);
        for action in actions {
            registry.register(action)?;
        }
        Ok(registry)
    }

    /// Register an action. Identifiers must be unique.
    pub fn register(&mut self, action: Arc<dyn Action>) -> Result<(), RegistryError> {
        let id = action.id().to_string();
        if self.by_id.contains_key(&id) {
            return Err(RegistryError::DuplicateAction(id));
        }

        let input_schema =
            CompiledSchema::compile(&action.input_schema()).map_err(|reason| RegistryError::InvalidSchema {
                action_id: id.clone(),
                which: "input",
                reason,
            })?;
        let output_schema =
            CompiledSchema::compile(&action.output_schema()).map_err(|reason| RegistryError::InvalidSchema {
                action_id: id.clone(),
                which: "output",
                reason,
            })?;

        debug!(action = %id, "Registered action");
        self.by_id.insert(id, self.actions.len());
        self.actions.push(RegisteredAction {
            action,
            input_schema,
            output_schema,
        });
        Ok(())
    }

    fn entry(&self, id: &str) -> Option<&RegisteredAction> {
        self.by_id.get(id).map(|&i| &self.actions[i])
    }

    /// Get an action by identifier.
    pub fn get(&self, id: &str) -> Option<&dyn Action> {
        self.entry(id).map(|e| e.action.as_ref())
    }

    /// Identifiers in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.actions.iter().map(|e| e.action.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn format(&self) -> &dyn ActionFormat {
        self.format.as_ref()
    }

    /// Parse and validate a raw model response.
    ///
    /// Total: every input yields an invocation or a [`ValidationError`].
    pub fn validate(&self, raw: &str) -> Result<ActionInvocation, ValidationError> {
        let invocation = self.format.decode(raw)?;
        self.validate_input(&invocation.action_id, &invocation.input)?;
        Ok(invocation)
    }

    /// Check that `action_id` exists and `input` satisfies its schema.
    pub fn validate_input(&self, action_id: &str, input: &serde_json::Value) -> Result<(), ValidationError> {
        let entry = self.entry(action_id).ok_or_else(|| ValidationError::UnknownAction {
            action_id: action_id.to_string(),
            available: self.ids().into_iter().map(String::from).collect(),
        })?;

        let violations = entry.input_schema.violations(input);
        if !violations.is_empty() {
            return Err(ValidationError::SchemaViolation {
                action_id: action_id.to_string(),
                violations,
            });
        }
        Ok(())
    }

    /// Execute an action. Never fails: errors and panics become a
    /// [`ExecutionOutcome::Failure`].
    pub async fn dispatch(&self, action_id: &str, input: &serde_json::Value) -> ExecutionOutcome {
        let Some(entry) = self.entry(action_id) else {
            warn!(action = %action_id, "Dispatch of unregistered action");
            return ExecutionOutcome::Failure {
                message: format!("Action '{action_id}' is not registered"),
            };
        };

        let result = AssertUnwindSafe(entry.action.execute(input.clone()))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(output)) => {
                let violations = entry.output_schema.violations(&output.output);
                if !violations.is_empty() {
                    warn!(action = %action_id, ?violations, "Action output violates its schema");
                    return ExecutionOutcome::Failure {
                        message: format!(
                            "Output of '{action_id}' violates its schema: {}",
                            violations.join("; ")
                        ),
                    };
                }
                ExecutionOutcome::Success {
                    output,
                    terminates_run: entry.action.terminates_run(),
                }
            }
            Ok(Err(e)) => {
                warn!(action = %action_id, error = %e, "Action execution failed");
                ExecutionOutcome::Failure { message: e.to_string() }
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(action = %action_id, panic = %detail, "Action panicked");
                ExecutionOutcome::Failure {
                    message: format!("Action '{action_id}' panicked: {detail}"),
                }
            }
        }
    }

    /// Deterministic listing of all actions in registration order.
    pub fn render_catalog(&self) -> String {
        let mut catalog = format!("{}\n", self.format.description());
        for entry in &self.actions {
            let action = entry.action.as_ref();
            catalog.push_str(&format!(
                "\n### {}\n{}\nSyntax:\n{}\n",
                action.id(),
                action.description(),
                self.format.encode(action.id(), &action.input_example()),
            ));
        }
        catalog
    }

    /// Summarize an outcome via the action's formatter, or fall back to
    /// the execute summary when the action is unknown.
    pub fn format_result(&self, action_id: &str, input: &serde_json::Value, output: &ActionOutput) -> String {
        match self.get(action_id) {
            Some(action) => action.format_result(input, output),
            None => output.summary.clone(),
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.ids())
            .field("format", &self.format.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_actions::{BrokenAction, EchoAction};
    use crate::action::{DoneAction, FlexibleJsonActionFormat, JsonActionFormat};
    use serde_json::json;

    fn registry() -> ActionRegistry {
        ActionRegistry::with_actions(
            Arc::new(JsonActionFormat),
            [
                Arc::new(EchoAction) as Arc<dyn Action>,
                Arc::new(DoneAction::new()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.ids(), vec!["echo", "done"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = registry();
        let err = registry.register(Arc::new(EchoAction)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAction(id) if id == "echo"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn validate_accepts_good_response() {
        let inv = registry()
            .validate(r#"{"action":"echo","input":{"text":"hi"}}"#)
            .unwrap();
        assert_eq!(inv.action_id, "echo");
        assert_eq!(inv.input, json!({ "text": "hi" }));
    }

    #[test]
    fn validate_reports_each_error_kind() {
        let registry = registry();

        let err = registry.validate("not json at all").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedOutput { .. }));

        let err = registry
            .validate(r#"{"action":"unknown-tool","input":{}}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownAction { ref action_id, .. } if action_id == "unknown-tool"));

        let err = registry
            .validate(r#"{"action":"echo","input":{"text":7}}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::SchemaViolation { ref action_id, .. } if action_id == "echo"));
    }

    #[test]
    fn validate_is_total_over_odd_inputs() {
        let registry = registry();
        for raw in ["", "{", "}", "null", "\"echo\"", "{\"action\":null}", "\u{0}", "{{{{"] {
            assert!(registry.validate(raw).is_err(), "{raw:?} should not validate");
        }
    }

    #[tokio::test]
    async fn dispatch_executes_action() {
        let outcome = registry().dispatch("echo", &json!({ "text": "hi" })).await;
        match outcome {
            ExecutionOutcome::Success { output, terminates_run } => {
                assert_eq!(output.output, json!({ "text": "hi" }));
                assert!(!terminates_run);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_unknown_is_failure_not_crash() {
        let outcome = registry().dispatch("nope", &json!({})).await;
        assert!(matches!(outcome, ExecutionOutcome::Failure { .. }));
    }

    #[tokio::test]
    async fn dispatch_isolates_errors_and_panics() {
        let registry = ActionRegistry::with_actions(
            Arc::new(JsonActionFormat),
            [
                Arc::new(BrokenAction::Fails) as Arc<dyn Action>,
                Arc::new(BrokenAction::Panics),
                Arc::new(BrokenAction::BadOutput),
            ],
        )
        .unwrap();

        match registry.dispatch("fails", &json!({})).await {
            ExecutionOutcome::Failure { message } => assert!(message.contains("disk on fire")),
            other => panic!("unexpected {other:?}"),
        }
        match registry.dispatch("panics", &json!({})).await {
            ExecutionOutcome::Failure { message } => assert!(message.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
        match registry.dispatch("bad-output", &json!({})).await {
            ExecutionOutcome::Failure { message } => assert!(message.contains("violates its schema")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn done_action_terminates() {
        let outcome = registry().dispatch("done", &json!({ "result": "all good" })).await;
        assert!(matches!(outcome, ExecutionOutcome::Success { terminates_run: true, .. }));
    }

    #[test]
    fn catalog_lists_actions_in_order() {
        let catalog = registry().render_catalog();
        let echo = catalog.find("### echo").unwrap();
        let done = catalog.find("### done").unwrap();
        assert!(echo < done);
        assert!(catalog.contains(r#"{"action":"echo","input":{"text":"{text to echo}"}}"#));
        assert!(catalog.starts_with(JsonActionFormat.description()));
    }

    #[test]
    fn catalog_is_deterministic() {
        assert_eq!(registry().render_catalog(), registry().render_catalog());
    }

    #[test]
    fn catalog_follows_format() {
        let registry =
            ActionRegistry::with_actions(Arc::new(FlexibleJsonActionFormat), [Arc::new(EchoAction) as Arc<dyn Action>])
                .unwrap();
        assert!(registry.render_catalog().starts_with(FlexibleJsonActionFormat.description()));
    }

    #[test]
    fn format_result_uses_action_formatter() {
        let registry = registry();
        let output = ActionOutput::new("Echoed 2 chars", json!({ "text": "hi" }));
        assert_eq!(registry.format_result("echo", &json!({}), &output), "echo: hi");
        assert_eq!(registry.format_result("ghost", &json!({}), &output), "Echoed 2 chars");
    }
}
