use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod gemini;

pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL};

/// Static sampling settings applied to every completion call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationPolicy {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub policy: GenerationPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion endpoint is misconfigured: {0}")]
    Config(String),
    #[error("failed to reach completion endpoint: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion response contained no text: {reason}")]
    Empty { reason: String },
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;
}
