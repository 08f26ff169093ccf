// 🤖 Text Generation - Chat-completions client + response parsing
// The model is an opaque service that returns JSON text. Everything that
// can go wrong between "prompt sent" and "candidates parsed" is an LlmError.

use crate::naming::{NameAnalysis, NameCandidate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("DEEPSEEK_API_KEY is not configured")]
    MissingApiKey,

    #[error("request to text-generation service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("text-generation service returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("text-generation service returned empty content")]
    EmptyContent,

    #[error("model output is not the expected JSON: {0}")]
    MalformedJson(String),

    #[error("model output contains no name candidates")]
    NoCandidates,
}

// ============================================================================
// GENERATOR SEAM
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the service to constrain output to a JSON object
    pub json_mode: bool,
}

impl GenerationOptions {
    pub fn naming() -> Self {
        GenerationOptions {
            temperature: 0.8,
            max_tokens: 2000,
            json_mode: true,
        }
    }

    pub fn analysis() -> Self {
        GenerationOptions {
            temperature: 0.7,
            max_tokens: 2000,
            json_mode: false,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Raw text of the first completion choice
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        (**self).generate(prompt, options).await
    }
}

// ============================================================================
// DEEPSEEK CLIENT
// ============================================================================

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct DeepSeekClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl DeepSeekClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(DeepSeekClient { config, http })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, prompt: &'a str, options: &GenerationOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        }
    }
}

#[async_trait]
impl TextGenerator for DeepSeekClient {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.request_body(prompt, options))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "text-generation service rejected request");
            return Err(LlmError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyContent)?;

        debug!(chars = content.chars().count(), "text-generation reply received");
        Ok(content)
    }
}

// ============================================================================
// RESPONSE PARSING
// ============================================================================

/// Drop surrounding whitespace and markdown code fences
pub fn strip_code_fences(content: &str) -> &str {
    let mut text = content.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[derive(Deserialize)]
struct CandidateEnvelope {
    #[serde(alias = "chars")]
    names: Option<Vec<NameCandidate>>,
}

pub fn parse_candidates(content: &str) -> Result<Vec<NameCandidate>, LlmError> {
    let envelope: CandidateEnvelope = serde_json::from_str(strip_code_fences(content))
        .map_err(|e| LlmError::MalformedJson(e.to_string()))?;

    match envelope.names {
        Some(names) if !names.is_empty() => Ok(names),
        _ => Err(LlmError::NoCandidates),
    }
}

pub fn parse_analysis(content: &str) -> Result<NameAnalysis, LlmError> {
    serde_json::from_str(strip_code_fences(content)).map_err(|e| LlmError::MalformedJson(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
