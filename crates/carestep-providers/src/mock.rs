//! Mock judge for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use carestep_core::error::TransportError;
use carestep_core::traits::{JudgeProvider, JudgeReply, JudgeRequest, ModelInfo, TokenUsage};

/// A mock judge for exercising the grading pipeline without real API calls.
///
/// Returns configurable replies based on prompt content matching, or a
/// fixed transport error.
pub struct MockJudge {
    /// Map of prompt substring → reply text.
    responses: HashMap<String, String>,
    /// Reply if no prompt matches.
    default_response: String,
    /// Returned instead of any reply when set.
    failure: Option<TransportError>,
    /// Simulated latency.
    delay: Duration,
    call_count: AtomicU32,
    last_request: Mutex<Option<JudgeRequest>>,
}

/// A reply that passes with full marks.
pub const PASSING_REPLY: &str = r#"{"judgement":"○","score":100,"breakdown":{},"short_comment":"よく観察できています","good_points":["具体的です"],"missing_points":[],"improvement_example":""}"#;

impl MockJudge {
    /// Create a mock with the given prompt→reply mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: PASSING_REPLY.to_string(),
            failure: None,
            delay: Duration::ZERO,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same reply.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(HashMap::new())
        }
    }

    /// Create a mock whose every call fails with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(HashMap::new())
        }
    }

    /// Delay every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<JudgeRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl JudgeProvider for MockJudge {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &JudgeRequest) -> Result<JudgeReply, TransportError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(JudgeReply {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: self.delay.as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
