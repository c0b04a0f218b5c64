//! Replay text generator.
//!
//! Returns canned responses in order. Used by tests and by the CLI's
//! `run --responses` mode in place of a live model.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use stepwise_core::error::ModelCallError;
use stepwise_core::model::{GenerateRequest, Generation, TextGenerator, Usage};
use stepwise_core::prompt::RenderedPrompt;

/// Separator line between responses in a transcript file.
pub const TRANSCRIPT_SEPARATOR: &str = "---";

pub struct ScriptedGenerator {
    model: String,
    usage: Option<Usage>,
    script: Mutex<VecDeque<Result<String, ModelCallError>>>,
    prompts: Mutex<Vec<RenderedPrompt>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Replay successful responses in order.
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::from_results(responses.into_iter().map(|r| Ok(r.into())))
    }

    /// Replay a mix of responses and failures in order.
    pub fn from_results(script: impl IntoIterator<Item = Result<String, ModelCallError>>) -> Self {
        Self {
            model: "scripted".into(),
            usage: None,
            script: Mutex::new(script.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Parse a transcript: responses separated by lines that are exactly `---`.
    /// Blank responses are skipped.
    pub fn from_transcript(text: &str) -> Self {
        let mut responses = Vec::new();
        let mut current = String::new();
        for line in text.lines() {
            if line.trim() == TRANSCRIPT_SEPARATOR {
                responses.push(std::mem::take(&mut current));
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        responses.push(current);

        Self::new(
            responses
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        )
    }

    /// Model name reported in each generation.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Token usage reported in each generation.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Number of `generate` calls so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<RenderedPrompt> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<Generation, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.prompt);

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            Some(Ok(text)) => Ok(Generation {
                text,
                model: self.model.clone(),
                usage: self.usage,
            }),
            Some(Err(e)) => Err(e),
            None => Err(ModelCallError::Exhausted(
                "no scripted responses left".into(),
            )),
        }
    }
}
