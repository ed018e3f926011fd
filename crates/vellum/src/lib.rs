//! Artifact lifecycle engine for model-synthesized markup documents.
//!
//! `vellum` turns a text prompt or an uploaded image/document into a
//! runnable, self-contained HTML artifact produced by a remote generative
//! model, then lets the user refine it through natural-language
//! instructions or by pointing at elements of the rendered document.
//!
//! The remote model is an external collaborator behind the
//! [`SynthesisService`](synthesis::SynthesisService) trait. Everything
//! around it lives here:
//!
//! - [`api::retry`]: bounded exponential backoff for transient failures.
//! - [`synthesis`]: request construction and output cleanup
//!   ([`SynthesisGateway`](synthesis::SynthesisGateway)).
//! - [`store`]: the most-recent-first history with durable persistence and
//!   evict-oldest-on-overflow ([`ArtifactStore`](store::ArtifactStore)).
//! - [`versions`]: undo/redo scoped to the active artifact.
//! - [`overlay`]: the Interact / Inspect / Edit state machine over a
//!   rendered document.
//! - [`transfer`]: snapshot and bare-document export, validated import.
//! - [`studio`]: the session context tying all of the above together.
//!
//! # Getting started
//!
//! ```ignore
//! use vellum::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StudioError> {
//!     let config = StudioConfig::default();
//!     let client = OpenRouterClient::new(std::env::var("OPENROUTER_KEY").unwrap(), &config)?;
//!     let gateway = SynthesisGateway::new(std::sync::Arc::new(client), &config);
//!
//!     let slot = FileSlot::new(&config.storage_path, Some(config.storage_quota_bytes));
//!     let mut studio = Studio::open(Box::new(slot));
//!
//!     let artifact = studio.generate(&gateway, GenerateRequest::prompt("dashboard")).await?;
//!     studio.refine(&gateway, "make it dark").await?;
//!     studio.undo()?;
//!     println!("{}", artifact.name);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod overlay;
pub mod prelude;
pub mod store;
pub mod studio;
pub mod synthesis;
pub mod transfer;
pub mod versions;

use std::time::{Duration, Instant};

use futures::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::StudioConfig;
use crate::error::{ServiceError, ServiceErrorKind};
use crate::synthesis::{SynthesisFuture, SynthesisRequest, SynthesisService};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for generation and refinement.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Used to validate imported artifact snapshots
/// before deserializing them.
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// Message content: plain text, or a list of parts when an image is attached.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multimodal message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageUrl {
    /// A `data:` URI carrying the inline payload.
    pub url: String,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message with an inline image (or document) payload.
    pub fn user_with_image(text: impl Into<String>, data_uri: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_uri.into(),
                    },
                },
                ContentPart::Text { text: text.into() },
            ]),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<u16>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Turn a successful HTTP body into the model's text, classifying failures.
fn completion_text(body: &str) -> Result<String, ServiceError> {
    let parsed: RawChatResponse = serde_json::from_str(body).map_err(|e| {
        ServiceError::new(
            ServiceErrorKind::Server,
            format!("failed to parse response: {e}"),
        )
    })?;

    if let Some(err) = parsed.error {
        return Err(match err.code {
            Some(code) => ServiceError::from_status(code, err.message),
            None => ServiceError::new(ServiceErrorKind::Server, err.message),
        });
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let choice = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| ServiceError::new(ServiceErrorKind::EmptyResponse, "no choices returned"))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ServiceError::new(
            ServiceErrorKind::ContentSafety,
            "output withheld by content filter",
        ));
    }

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ServiceError::new(
            ServiceErrorKind::EmptyResponse,
            "model returned no text",
        )),
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key, using the model settings from `config`.
    pub fn new(api_key: impl Into<String>, config: &StudioConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .user_agent("vellum/0.1")
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| {
                ServiceError::new(
                    ServiceErrorKind::Client,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            referer: "https://github.com/vellum-rs/vellum".into(),
            title: "vellum".into(),
        })
    }

    /// Send a chat completion request and return the model's text.
    pub async fn chat(&self, body: &ChatRequest) -> Result<String, ServiceError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::new(ServiceErrorKind::Server, format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            ServiceError::new(
                ServiceErrorKind::Server,
                format!("failed to read response: {e}"),
            )
        })?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ServiceError::from_status(status.as_u16(), text));
        }

        completion_text(&text)
    }
}

impl SynthesisService for OpenRouterClient {
    fn synthesize<'a>(&'a self, request: &'a SynthesisRequest) -> SynthesisFuture<'a> {
        async move {
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = &request.system {
                messages.push(Message::system(system));
            }
            messages.push(match &request.image {
                Some(image) => Message::user_with_image(&request.instruction, image.to_data_uri()),
                None => Message::user(&request.instruction),
            });

            let body = ChatRequest {
                model: self.model.clone(),
                messages,
                max_tokens: self.max_tokens,
                temperature: request.temperature,
            };
            self.chat(&body).await
        }
        .boxed()
    }
}
