//! TextGenerator trait: the abstraction over model calls.
//!
//! A TextGenerator turns a rendered prompt into response text. The engine
//! never sees the provider's wire protocol; credentials and endpoints are
//! injected into implementations at construction time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelCallError;
use crate::prompt::RenderedPrompt;

/// A single model invocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The run this call belongs to.
    pub run_id: String,

    /// Index the next step will receive.
    pub step_index: usize,

    /// The rendered prompt.
    pub prompt: RenderedPrompt,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A successful model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The raw response text.
    pub text: String,

    /// Which model actually responded.
    pub model: String,

    /// Token usage, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The model-call abstraction.
///
/// Implementations handle their own timeouts; a timeout surfaces as
/// [`ModelCallError::Timeout`] through the normal failure path.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A human-readable name (e.g. "openai-chat", "replay").
    fn name(&self) -> &str;

    /// Generate a response for the rendered prompt.
    async fn generate(&self, request: GenerateRequest) -> Result<Generation, ModelCallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_total_saturates() {
        let usage = Usage::new(u32::MAX, 10);
        assert_eq!(usage.total_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 10);
    }

    #[test]
    fn usage_totals() {
        let usage = Usage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn generation_omits_missing_usage() {
        let generation = Generation {
            text: "{}".into(),
            model: "mock".into(),
            usage: None,
        };
        let json = serde_json::to_string(&generation).unwrap();
        assert!(!json.contains("usage"));
    }
}
