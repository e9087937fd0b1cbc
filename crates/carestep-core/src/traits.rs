//! The remote judge seam.
//!
//! `JudgeProvider` is implemented by the backends in `carestep-providers`.
//! A provider only moves text: it never interprets the verdict.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// A text-generation backend acting as the remote judge.
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Send a prompt and return the raw response text.
    async fn complete(&self, request: &JudgeRequest) -> Result<JudgeReply, TransportError>;

    /// Models this provider can judge with.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// A single prompt sent to the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRequest {
    /// Model identifier (e.g. "gemini-2.0-flash").
    pub model: String,
    /// The full grading prompt.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Output size budget.
    pub max_output_tokens: u32,
    /// Sampling temperature; kept low for repeatable verdicts.
    pub temperature: f64,
    /// Ask the backend for a JSON-only response when it supports it.
    #[serde(default)]
    pub json_response: bool,
}

/// Raw answer from the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReply {
    /// The response text, expected to hold one JSON object.
    pub content: String,
    /// Model that actually answered.
    pub model: String,
    #[serde(default)]
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one judge call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

/// System prompt shared by all judge backends.
pub const JUDGE_SYSTEM_PROMPT: &str = "あなたは介護施設の新人研修プログラムの採点AIです。指定されたJSON形式のみで回答してください。";

// ---------------------------------------------------------------------------
// Code fence stripping
// ---------------------------------------------------------------------------

/// Remove markdown code-fence markers from a judge response.
///
/// Drops every "```json" and "```" marker (each with one following newline,
/// if present) wherever it appears, then trims the result.
pub fn strip_code_fences(response: &str) -> String {
    let mut out = String::with_capacity(response.len());
    let mut rest = response;

    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        if let Some(after_tag) = rest.strip_prefix("json") {
            rest = after_tag;
        }
        if let Some(after_newline) = rest.strip_prefix('\n') {
            rest = after_newline;
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}
