//! The step loop.
//!
//! Each iteration asks the controller whether to go on, renders a prompt
//! from the run, asks the model for the next action, validates and
//! dispatches it, and records a [`Step`]. Tool failures and invalid responses become
//! failed steps the model sees next time. Only model-call failures, too many
//! invalid responses in a row, a terminal action, the controller or
//! cancellation end a run.
//!
//! [`Step`]: stepwise_core::step::Step

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stepwise_config::AgentConfig;
use stepwise_core::action::{ActionInvocation, ActionRegistry, ExecutionOutcome};
use stepwise_core::error::ModelCallError;
use stepwise_core::model::{GenerateRequest, TextGenerator};
use stepwise_core::observer::RunObserver;
use stepwise_core::prompt::RenderedPrompt;
use stepwise_core::run::{ModelCallRecord, Run, TerminationReason};
use stepwise_core::step::{FailureKind, NewStep, StepOutcome};

use crate::controller::{Controller, max_steps};
use crate::observer::CombinedObserver;
use crate::prompt::PromptComposer;

/// Step ceiling used when no controller is configured.
pub const DEFAULT_MAX_STEPS: usize = 20;

/// Retries for failed model calls. The default never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Pause before each retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Failure-handling knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Invalid responses in a row that end the run.
    pub max_consecutive_invalid_responses: u32,
    pub retry: RetryPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_consecutive_invalid_responses: 3,
            retry: RetryPolicy::none(),
        }
    }
}

impl From<&AgentConfig> for LoopSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_consecutive_invalid_responses: config.max_consecutive_invalid_responses,
            retry: RetryPolicy::new(
                config.model_call_retries,
                Duration::from_millis(config.retry_backoff_ms),
            ),
        }
    }
}

/// Drives one run at a time; reusable across runs.
///
/// A `StepLoop` holds no per-run state, so one instance behind an `Arc` can
/// drive several runs concurrently.
pub struct StepLoop {
    composer: PromptComposer,
    registry: Arc<ActionRegistry>,
    generator: Arc<dyn TextGenerator>,
    controller: Box<dyn Controller>,
    observers: CombinedObserver,
    settings: LoopSettings,
    setup_steps: Vec<ActionInvocation>,
}

impl StepLoop {
    pub fn new(
        composer: PromptComposer,
        registry: Arc<ActionRegistry>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            composer,
            registry,
            generator,
            controller: Box::new(max_steps(DEFAULT_MAX_STEPS)),
            observers: CombinedObserver::new(),
            settings: LoopSettings::default(),
            setup_steps: Vec::new(),
        }
    }

    /// Replace the controller.
    pub fn with_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controller = Box::new(controller);
        self
    }

    /// Add an observer after the ones already registered.
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Invocations executed in order before the first model call.
    pub fn with_setup_steps(mut self, steps: Vec<ActionInvocation>) -> Self {
        self.setup_steps = steps;
        self
    }

    /// Step ceiling and failure settings from configuration.
    pub fn with_config(self, config: &AgentConfig) -> Self {
        self.with_controller(max_steps(config.max_steps))
            .with_settings(LoopSettings::from(config))
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run to completion.
    pub async fn run(&self, objective: impl Into<String>) -> Run {
        self.run_with_cancellation(objective, CancellationToken::new())
            .await
    }

    /// Run until a termination condition or until `cancel` fires.
    ///
    /// The token is checked before each step. In-flight model calls and
    /// actions are allowed to finish.
    pub async fn run_with_cancellation(
        &self,
        objective: impl Into<String>,
        cancel: CancellationToken,
    ) -> Run {
        let mut run = Run::new(objective);
        info!(
            run_id = %run.id(),
            actions = self.registry.len(),
            generator = self.generator.name(),
            "Run started"
        );
        let _ = self.observers.on_run_started(&run).await;

        let reason = self.drive(&mut run, &cancel).await;

        info!(
            run_id = %run.id(),
            steps = run.step_count(),
            model_calls = run.recorded_calls().len(),
            reason = %reason,
            "Run finished"
        );
        run.terminate(reason);
        let _ = self.observers.on_run_finished(&run).await;
        run
    }

    async fn drive(&self, run: &mut Run, cancel: &CancellationToken) -> TerminationReason {
        for invocation in &self.setup_steps {
            if cancel.is_cancelled() {
                return TerminationReason::Cancelled;
            }
            if !self.controller.should_continue(run) {
                return TerminationReason::ControllerStopped;
            }
            if let Some(reason) = self.run_setup_step(run, invocation).await {
                return reason;
            }
        }

        let mut consecutive_invalid = 0u32;
        loop {
            if cancel.is_cancelled() {
                debug!(run_id = %run.id(), steps = run.step_count(), "Cancellation observed");
                return TerminationReason::Cancelled;
            }
            if !self.controller.should_continue(run) {
                return TerminationReason::ControllerStopped;
            }

            let prompt = self.composer.render(run, &self.registry);
            let response = match self.call_model(run, &prompt, cancel).await {
                Ok(text) => text,
                Err(_) if cancel.is_cancelled() => return TerminationReason::Cancelled,
                Err(e) => {
                    return TerminationReason::ModelCallFailed {
                        message: e.to_string(),
                    };
                }
            };

            match self.registry.validate(&response) {
                Ok(invocation) => {
                    consecutive_invalid = 0;
                    if let Some(action_id) = self.execute(run, invocation).await {
                        return TerminationReason::DoneActionInvoked { action_id };
                    }
                }
                Err(err) => {
                    consecutive_invalid += 1;
                    warn!(
                        run_id = %run.id(),
                        step = run.step_count(),
                        kind = %FailureKind::from(&err),
                        consecutive = consecutive_invalid,
                        error = %err,
                        "Invalid model response"
                    );
                    self.record_step(run, NewStep::invalid(response, &err))
                        .await;
                    if consecutive_invalid >= self.settings.max_consecutive_invalid_responses {
                        return TerminationReason::TooManyInvalidResponses {
                            consecutive: consecutive_invalid,
                        };
                    }
                }
            }
        }
    }

    /// Validate and execute one configured invocation. Invalid setup steps
    /// are recorded and skipped.
    async fn run_setup_step(
        &self,
        run: &mut Run,
        invocation: &ActionInvocation,
    ) -> Option<TerminationReason> {
        if let Err(err) = self
            .registry
            .validate_input(&invocation.action_id, &invocation.input)
        {
            warn!(
                run_id = %run.id(),
                action = %invocation.action_id,
                error = %err,
                "Invalid setup step"
            );
            let raw = self
                .registry
                .format()
                .encode(&invocation.action_id, &invocation.input);
            self.record_step(run, NewStep::invalid(raw, &err)).await;
            return None;
        }

        self.execute(run, invocation.clone())
            .await
            .map(|action_id| TerminationReason::DoneActionInvoked { action_id })
    }

    /// Call the model, retrying per policy. Every attempt is recorded on the
    /// run and reported to observers. No retry starts once `cancel` fires.
    async fn call_model(
        &self,
        run: &mut Run,
        prompt: &RenderedPrompt,
        cancel: &CancellationToken,
    ) -> Result<String, ModelCallError> {
        let step_index = run.step_count();
        let prompt_text = prompt.text();
        let generator = self.generator.name().to_string();
        let mut attempt = 1u32;

        loop {
            debug!(
                run_id = %run.id(),
                step = step_index,
                attempt,
                prompt_tokens = prompt.estimated_tokens(),
                "Calling model"
            );
            let request = GenerateRequest {
                run_id: run.id().to_string(),
                step_index,
                prompt: prompt.clone(),
            };
            let started_at = Utc::now();
            let result = self.generator.generate(request).await;

            let record = match &result {
                Ok(generation) => ModelCallRecord::succeeded(
                    step_index,
                    attempt,
                    &generator,
                    prompt_text.clone(),
                    started_at,
                    generation,
                ),
                Err(e) => ModelCallRecord::failed(
                    step_index,
                    attempt,
                    &generator,
                    prompt_text.clone(),
                    started_at,
                    e,
                ),
            };
            run.record_call(record);
            if let Some(call) = run.recorded_calls().last() {
                let _ = self.observers.on_model_call_completed(run, call).await;
            }

            match result {
                Ok(generation) => return Ok(generation.text),
                Err(e) if attempt <= self.settings.retry.max_retries && !cancel.is_cancelled() => {
                    warn!(
                        run_id = %run.id(),
                        step = step_index,
                        attempt,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    if !self.settings.retry.backoff.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(self.settings.retry.backoff) => {}
                            _ = cancel.cancelled() => {
                                debug!(run_id = %run.id(), step = step_index, "Retry abandoned on cancellation");
                                return Err(e);
                            }
                        }
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        run_id = %run.id(),
                        step = step_index,
                        attempts = attempt,
                        error = %e,
                        "Model call failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Dispatch a validated invocation and record the step. Returns the
    /// action id when the action ends the run.
    async fn execute(&self, run: &mut Run, invocation: ActionInvocation) -> Option<String> {
        let ActionInvocation {
            action_id,
            input,
            reasoning,
        } = invocation;
        debug!(
            run_id = %run.id(),
            step = run.step_count(),
            action = %action_id,
            "Dispatching action"
        );

        let (outcome, summary, terminal) = match self.registry.dispatch(&action_id, &input).await {
            ExecutionOutcome::Success {
                output,
                terminates_run,
            } => {
                let summary = self.registry.format_result(&action_id, &input, &output);
                (
                    StepOutcome::Succeeded {
                        output: output.output,
                        terminates_run,
                    },
                    summary,
                    terminates_run,
                )
            }
            ExecutionOutcome::Failure { message } => (
                StepOutcome::Failed {
                    kind: FailureKind::ActionExecutionFailed,
                    message: message.clone(),
                },
                message,
                false,
            ),
        };

        self.record_step(
            run,
            NewStep {
                action_id: Some(action_id.clone()),
                input: Some(input),
                reasoning,
                raw_response: None,
                outcome,
                summary,
            },
        )
        .await;

        terminal.then_some(action_id)
    }

    async fn record_step(&self, run: &mut Run, new: NewStep) {
        let index = run.append_step(new).index;
        let step = &run.steps()[index];
        debug!(
            run_id = %run.id(),
            step = index,
            action = step.action_label(),
            success = step.is_success(),
            "Step recorded"
        );
        let _ = self.observers.on_step_completed(run, step).await;
    }
}

impl std::fmt::Debug for StepLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepLoop")
            .field("registry", &self.registry)
            .field("generator", &self.generator.name())
            .field("observers", &self.observers)
            .field("settings", &self.settings)
            .field("setup_steps", &self.setup_steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::from_fn;
    use crate::observer::test_observers::{FaultyObserver, RecordingObserver};
    use crate::scripted::ScriptedGenerator;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use stepwise_core::action::{
        Action, ActionFormat, ActionOutput, DoneAction, FlexibleJsonActionFormat, JsonActionFormat,
    };
    use stepwise_core::error::{ActionError, ObserverError};
    use stepwise_core::model::Generation;
    use stepwise_core::step::Step;

    struct EchoAction;

    #[async_trait]
    impl Action for EchoAction {
        fn id(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the given text back."
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }

        fn input_example(&self) -> Value {
            json!({"text": "{text to echo}"})
        }

        async fn execute(&self, input: Value) -> Result<ActionOutput, ActionError> {
            let text = input["text"].as_str().unwrap_or_default().to_string();
            Ok(ActionOutput::new(text.clone(), json!({ "text": text })))
        }

        fn format_result(&self, _input: &Value, output: &ActionOutput) -> String {
            format!("echo: {}", output.summary)
        }
    }

    struct FailingAction;

    #[async_trait]
    impl Action for FailingAction {
        fn id(&self) -> &str {
            "fails"
        }

        fn description(&self) -> &str {
            "Always fails."
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn input_example(&self) -> Value {
            json!({})
        }

        async fn execute(&self, _input: Value) -> Result<ActionOutput, ActionError> {
            Err(ActionError::ExecutionFailed {
                action_id: "fails".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    fn registry_with(format: Arc<dyn ActionFormat>) -> Arc<ActionRegistry> {
        Arc::new(
            ActionRegistry::with_actions(
                format,
                [
                    Arc::new(EchoAction) as Arc<dyn Action>,
                    Arc::new(FailingAction),
                    Arc::new(DoneAction::new()),
                ],
            )
            .unwrap(),
        )
    }

    fn registry() -> Arc<ActionRegistry> {
        registry_with(Arc::new(JsonActionFormat))
    }

    fn composer() -> PromptComposer {
        PromptComposer::standard("You are a test agent.", None, 10)
    }

    fn echo(text: &str) -> String {
        json!({"action": "echo", "input": {"text": text}}).to_string()
    }

    fn done(result: &str) -> String {
        json!({"action": "done", "input": {"result": result}}).to_string()
    }

    fn step_loop(generator: Arc<ScriptedGenerator>) -> StepLoop {
        StepLoop::new(composer(), registry(), generator)
    }

    #[tokio::test]
    async fn echo_once_then_controller_stops() {
        let generator = Arc::new(ScriptedGenerator::new([echo("hi")]));
        let run = step_loop(generator.clone())
            .with_controller(max_steps(1))
            .run("Say hi")
            .await;

        assert_eq!(run.step_count(), 1);
        let step = &run.steps()[0];
        assert_eq!(step.action_id.as_deref(), Some("echo"));
        assert_eq!(
            step.outcome,
            StepOutcome::Succeeded {
                output: json!({"text": "hi"}),
                terminates_run: false,
            }
        );
        assert_eq!(step.summary, "echo: hi");
        assert_eq!(run.termination(), Some(&TerminationReason::ControllerStopped));
        assert_eq!(generator.calls(), 1);
        assert_eq!(run.recorded_calls().len(), 1);
        assert!(run.recorded_calls()[0].success);
    }

    #[tokio::test]
    async fn unknown_action_is_recorded_and_run_continues() {
        let unknown = json!({"action": "unknown-tool", "input": {}}).to_string();
        let generator = Arc::new(ScriptedGenerator::new([unknown, echo("after")]));
        let run = step_loop(generator)
            .with_controller(max_steps(2))
            .run("Try things")
            .await;

        assert_eq!(run.step_count(), 2);
        assert_eq!(
            run.steps()[0].outcome.failure_kind(),
            Some(FailureKind::UnknownAction)
        );
        assert_eq!(run.steps()[0].action_id.as_deref(), Some("unknown-tool"));
        assert!(run.steps()[1].is_success());
        assert_eq!(run.termination(), Some(&TerminationReason::ControllerStopped));
    }

    #[tokio::test]
    async fn three_malformed_responses_end_the_run() {
        let generator = Arc::new(ScriptedGenerator::new(["nope", "still nope", "{"]));
        let run = step_loop(generator).run("Anything").await;

        assert_eq!(
            run.termination(),
            Some(&TerminationReason::TooManyInvalidResponses { consecutive: 3 })
        );
        assert_eq!(run.step_count(), 3);
        assert_eq!(run.steps().iter().filter(|s| s.is_success()).count(), 0);
        assert!(
            run.steps()
                .iter()
                .all(|s| s.outcome.failure_kind() == Some(FailureKind::MalformedOutput))
        );
    }

    #[tokio::test]
    async fn valid_response_resets_invalid_count() {
        let generator = Arc::new(ScriptedGenerator::new([
            "bad".to_string(),
            "bad".to_string(),
            echo("ok"),
            "bad".to_string(),
            "bad".to_string(),
            done("finished"),
        ]));
        let run = step_loop(generator).run("Persist").await;

        assert_eq!(run.step_count(), 6);
        assert_eq!(
            run.termination(),
            Some(&TerminationReason::DoneActionInvoked {
                action_id: "done".into()
            })
        );
    }

    #[tokio::test]
    async fn schema_violation_is_recorded() {
        let bad_input = json!({"action": "echo", "input": {"text": 42}}).to_string();
        let generator = Arc::new(ScriptedGenerator::new([bad_input, done("ok")]));
        let run = step_loop(generator).run("x").await;

        assert_eq!(
            run.steps()[0].outcome.failure_kind(),
            Some(FailureKind::SchemaViolation)
        );
        assert!(run.steps()[0].raw_response.is_some());
        assert!(run.steps()[1].is_success());
    }

    #[tokio::test]
    async fn done_ends_the_run_regardless_of_controller() {
        let generator = Arc::new(ScriptedGenerator::new([done("all good"), echo("never")]));
        let run = step_loop(generator.clone())
            .with_controller(from_fn(|_: &Run| true))
            .run("Finish")
            .await;

        assert_eq!(run.step_count(), 1);
        assert_eq!(run.steps()[0].summary, "done: all good");
        assert!(run.steps()[0].outcome.terminates_run());
        assert_eq!(
            run.termination(),
            Some(&TerminationReason::DoneActionInvoked {
                action_id: "done".into()
            })
        );
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn action_failure_is_a_step_not_a_crash() {
        let fails = json!({"action": "fails", "input": {}}).to_string();
        let generator = Arc::new(ScriptedGenerator::new([fails, done("recovered")]));
        let run = step_loop(generator).run("x").await;

        assert_eq!(run.step_count(), 2);
        assert_eq!(
            run.steps()[0].outcome.failure_kind(),
            Some(FailureKind::ActionExecutionFailed)
        );
        assert!(run.steps()[0].summary.contains("disk on fire"));
        assert!(run.steps()[1].is_success());
    }

    #[tokio::test]
    async fn model_failure_ends_the_run() {
        let generator = Arc::new(ScriptedGenerator::from_results([Err(
            ModelCallError::Network("connection reset".into()),
        )]));
        let run = step_loop(generator).run("x").await;

        assert_eq!(run.step_count(), 0);
        assert_eq!(run.recorded_calls().len(), 1);
        assert!(!run.recorded_calls()[0].success);
        match run.termination() {
            Some(TerminationReason::ModelCallFailed { message }) => {
                assert!(message.contains("connection reset"))
            }
            other => panic!("unexpected termination: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_policy_retries_failed_calls() {
        let generator = Arc::new(ScriptedGenerator::from_results([
            Err(ModelCallError::Timeout("30s".into())),
            Ok(done("second time lucky")),
        ]));
        let run = step_loop(generator)
            .with_settings(LoopSettings {
                retry: RetryPolicy::new(1, Duration::ZERO),
                ..LoopSettings::default()
            })
            .run("x")
            .await;

        let attempts: Vec<u32> = run.recorded_calls().iter().map(|c| c.attempt).collect();
        assert_eq!(attempts, [1, 2]);
        assert_eq!(run.step_count(), 1);
        assert!(matches!(
            run.termination(),
            Some(TerminationReason::DoneActionInvoked { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let generator = Arc::new(ScriptedGenerator::from_results([
            Err(ModelCallError::RateLimited { retry_after_secs: 1 }),
            Err(ModelCallError::RateLimited { retry_after_secs: 1 }),
            Err(ModelCallError::RateLimited { retry_after_secs: 1 }),
        ]));
        let run = step_loop(generator.clone())
            .with_settings(LoopSettings {
                retry: RetryPolicy::new(2, Duration::from_millis(500)),
                ..LoopSettings::default()
            })
            .run("x")
            .await;

        assert_eq!(generator.calls(), 3);
        assert_eq!(run.recorded_calls().len(), 3);
        assert!(matches!(
            run.termination(),
            Some(TerminationReason::ModelCallFailed { .. })
        ));
    }

    #[tokio::test]
    async fn steps_never_exceed_max_steps() {
        let generator = Arc::new(ScriptedGenerator::new((0..10).map(|i| echo(&i.to_string()))));
        let run = step_loop(generator.clone())
            .with_controller(max_steps(3))
            .run("Loop")
            .await;

        assert_eq!(run.step_count(), 3);
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn zero_step_limit_makes_no_calls() {
        let generator = Arc::new(ScriptedGenerator::new(["garbage", "garbage2"]));
        let run = step_loop(generator.clone())
            .with_controller(max_steps(0))
            .run("x")
            .await;

        assert_eq!(run.step_count(), 0);
        assert_eq!(generator.calls(), 0);
        assert!(run.recorded_calls().is_empty());
        assert_eq!(run.termination(), Some(&TerminationReason::ControllerStopped));
    }

    #[tokio::test]
    async fn zero_step_limit_skips_setup_steps() {
        let generator = Arc::new(ScriptedGenerator::new([done("ok")]));
        let run = step_loop(generator.clone())
            .with_controller(max_steps(0))
            .with_setup_steps(vec![ActionInvocation::new("echo", json!({"text": "one"}))])
            .run("x")
            .await;

        assert_eq!(run.step_count(), 0);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn next_prompt_shows_previous_mistake() {
        let generator = Arc::new(ScriptedGenerator::new(["garbage".to_string(), done("ok")]));
        step_loop(generator.clone()).run("x").await;

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].text().contains("garbage"));
        let second = prompts[1].text();
        assert!(second.contains("Response: garbage"));
        assert!(second.contains("malformed_output"));
    }

    #[tokio::test]
    async fn observers_see_every_event_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let generator = Arc::new(ScriptedGenerator::new([echo("a"), done("b")]));
        let run = step_loop(generator)
            .with_observer(Arc::new(FaultyObserver { panics: true }))
            .with_observer(Arc::new(RecordingObserver::new("rec", log.clone())))
            .with_observer(Arc::new(FaultyObserver { panics: false }))
            .run("x")
            .await;

        assert_eq!(run.step_count(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            [
                "rec:started",
                "rec:call",
                "rec:step0",
                "rec:call",
                "rec:step1",
                "rec:finished"
            ]
        );
    }

    #[tokio::test]
    async fn failed_model_calls_are_reported_to_observers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let generator = Arc::new(ScriptedGenerator::from_results([Err(
            ModelCallError::AuthenticationFailed("bad key".into()),
        )]));
        step_loop(generator)
            .with_observer(Arc::new(RecordingObserver::new("rec", log.clone())))
            .run("x")
            .await;

        assert_eq!(
            *log.lock().unwrap(),
            ["rec:started", "rec:call_failed", "rec:finished"]
        );
    }

    #[tokio::test]
    async fn setup_steps_run_before_the_model() {
        let generator = Arc::new(ScriptedGenerator::new([done("ok")]));
        let run = step_loop(generator.clone())
            .with_setup_steps(vec![
                ActionInvocation::new("echo", json!({"text": "setup"})),
                ActionInvocation::new("missing", json!({})),
            ])
            .run("x")
            .await;

        assert_eq!(run.step_count(), 3);
        assert_eq!(run.steps()[0].summary, "echo: setup");
        assert_eq!(
            run.steps()[1].outcome.failure_kind(),
            Some(FailureKind::UnknownAction)
        );
        assert_eq!(generator.calls(), 1);
        assert!(generator.prompts()[0].text().contains("echo: setup"));
    }

    #[tokio::test]
    async fn controller_is_consulted_after_setup_steps() {
        let generator = Arc::new(ScriptedGenerator::new([done("ok")]));
        let run = step_loop(generator.clone())
            .with_controller(max_steps(1))
            .with_setup_steps(vec![
                ActionInvocation::new("echo", json!({"text": "one"})),
                ActionInvocation::new("echo", json!({"text": "two"})),
            ])
            .run("x")
            .await;

        assert_eq!(run.step_count(), 1);
        assert_eq!(generator.calls(), 0);
        assert_eq!(run.termination(), Some(&TerminationReason::ControllerStopped));
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let generator = Arc::new(ScriptedGenerator::new([echo("never")]));
        let token = CancellationToken::new();
        token.cancel();
        let run = step_loop(generator.clone())
            .run_with_cancellation("x", token)
            .await;

        assert_eq!(run.termination(), Some(&TerminationReason::Cancelled));
        assert_eq!(generator.calls(), 0);
        assert_eq!(run.step_count(), 0);
    }

    /// Cancels the token as soon as the first step is recorded.
    struct CancelAfterFirstStep(CancellationToken);

    #[async_trait]
    impl RunObserver for CancelAfterFirstStep {
        async fn on_step_completed(&self, _run: &Run, _step: &Step) -> Result<(), ObserverError> {
            self.0.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_steps() {
        let generator = Arc::new(ScriptedGenerator::new([echo("a"), echo("b"), echo("c")]));
        let token = CancellationToken::new();
        let run = step_loop(generator.clone())
            .with_observer(Arc::new(CancelAfterFirstStep(token.clone())))
            .run_with_cancellation("x", token)
            .await;

        assert_eq!(run.step_count(), 1);
        assert!(run.steps()[0].is_success());
        assert_eq!(run.termination(), Some(&TerminationReason::Cancelled));
        assert_eq!(generator.calls(), 1);
    }

    /// Cancels the token as soon as any model call completes.
    struct CancelOnModelCall(CancellationToken);

    #[async_trait]
    impl RunObserver for CancelOnModelCall {
        async fn on_model_call_completed(
            &self,
            _run: &Run,
            _call: &ModelCallRecord,
        ) -> Result<(), ObserverError> {
            self.0.cancel();
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retries() {
        let generator = Arc::new(ScriptedGenerator::from_results([
            Err(ModelCallError::Network("reset".into())),
            Err(ModelCallError::Network("reset".into())),
            Err(ModelCallError::Network("reset".into())),
        ]));
        let token = CancellationToken::new();
        let run = step_loop(generator.clone())
            .with_settings(LoopSettings {
                retry: RetryPolicy::new(2, Duration::from_secs(30)),
                ..LoopSettings::default()
            })
            .with_observer(Arc::new(CancelOnModelCall(token.clone())))
            .run_with_cancellation("x", token)
            .await;

        assert_eq!(generator.calls(), 1);
        assert_eq!(run.recorded_calls().len(), 1);
        assert_eq!(run.termination(), Some(&TerminationReason::Cancelled));
    }

    /// Cancels the token from outside while the loop waits out a backoff.
    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_retry_backoff() {
        let generator = Arc::new(ScriptedGenerator::from_results([
            Err(ModelCallError::Network("reset".into())),
            Err(ModelCallError::Network("reset".into())),
        ]));
        let token = CancellationToken::new();
        let step_loop = step_loop(generator.clone()).with_settings(LoopSettings {
            retry: RetryPolicy::new(1, Duration::from_secs(60)),
            ..LoopSettings::default()
        });

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let run = step_loop.run_with_cancellation("x", token).await;

        assert_eq!(generator.calls(), 1);
        assert_eq!(run.termination(), Some(&TerminationReason::Cancelled));
    }

    #[tokio::test]
    async fn flexible_format_records_reasoning() {
        let response = format!("I should echo first.\n```json\n{}\n```", echo("x"));
        let generator = Arc::new(ScriptedGenerator::new([response]));
        let run = StepLoop::new(
            composer(),
            registry_with(Arc::new(FlexibleJsonActionFormat)),
            generator,
        )
        .with_controller(max_steps(1))
        .run("x")
        .await;

        assert!(run.steps()[0].is_success());
        assert_eq!(
            run.steps()[0].reasoning.as_deref(),
            Some("I should echo first.")
        );
    }

    /// Always answers with the same echo.
    struct RepeatGenerator;

    #[async_trait]
    impl TextGenerator for RepeatGenerator {
        fn name(&self) -> &str {
            "repeat"
        }

        async fn generate(&self, _request: GenerateRequest) -> Result<Generation, ModelCallError> {
            Ok(Generation {
                text: echo("again"),
                model: "repeat".into(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn one_loop_drives_concurrent_runs() {
        let step_loop = Arc::new(
            StepLoop::new(composer(), registry(), Arc::new(RepeatGenerator))
                .with_controller(max_steps(2)),
        );

        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|objective| {
                let step_loop = step_loop.clone();
                tokio::spawn(async move { step_loop.run(objective).await })
            })
            .collect();

        for handle in handles {
            let run = handle.await.unwrap();
            assert_eq!(run.step_count(), 2);
            assert_eq!(run.recorded_calls().len(), 2);
        }
    }

    #[test]
    fn settings_from_config() {
        let config = AgentConfig {
            max_consecutive_invalid_responses: 5,
            model_call_retries: 2,
            retry_backoff_ms: 250,
            ..AgentConfig::default()
        };
        let settings = LoopSettings::from(&config);
        assert_eq!(settings.max_consecutive_invalid_responses, 5);
        assert_eq!(settings.retry, RetryPolicy::new(2, Duration::from_millis(250)));
        assert_eq!(LoopSettings::default().retry, RetryPolicy::none());
    }
}
