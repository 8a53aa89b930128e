//! Generative text backends
//!
//! Backends take a prompt and return a [`BackendResponse`]. The response is a
//! tagged union over the payload shapes the Responses API has used; each
//! shape has exactly one text extraction function.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SummarizerConfig;
use crate::error::SummaryError;

/// Text-generation backend
#[async_trait]
pub trait TextBackend: Send + Sync + Debug {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Send one prompt, return the decoded response
    async fn generate(&self, prompt: &str) -> Result<BackendResponse, SummaryError>;
}

/// Known response payload shapes
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    /// Top-level aggregated `output_text`
    OutputText(String),
    /// `output[].content[].text` blocks
    OutputBlocks(Vec<OutputItem>),
    /// Chat-style `messages[].content[].text`
    Messages(Vec<Message>),
    /// Anything else; rendered verbatim
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputTextShape {
    output_text: String,
}

#[derive(Debug, Deserialize)]
struct OutputBlocksShape {
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct MessagesShape {
    messages: Vec<Message>,
}

impl BackendResponse {
    /// Classify a raw JSON payload by shape.
    ///
    /// Shapes are tried most-specific first; a shape only matches when its
    /// field is present and yields non-empty text.
    pub fn from_json(value: serde_json::Value) -> Self {
        if let Ok(shape) = OutputTextShape::deserialize(&value) {
            if !shape.output_text.trim().is_empty() {
                return BackendResponse::OutputText(shape.output_text);
            }
        }
        if let Ok(shape) = OutputBlocksShape::deserialize(&value) {
            let candidate = BackendResponse::OutputBlocks(shape.output);
            if candidate.text().is_some() {
                return candidate;
            }
        }
        if let Ok(shape) = MessagesShape::deserialize(&value) {
            let candidate = BackendResponse::Messages(shape.messages);
            if candidate.text().is_some() {
                return candidate;
            }
        }
        BackendResponse::Other(value)
    }

    /// Text carried by this shape, if any
    fn text(&self) -> Option<String> {
        match self {
            BackendResponse::OutputText(text) => Some(text.clone()),
            BackendResponse::OutputBlocks(items) => first_text(items.first().map(|i| &i.content)),
            BackendResponse::Messages(messages) => first_text(messages.first().map(|m| &m.content)),
            BackendResponse::Other(value) => Some(value.to_string()),
        }
    }

    /// Text to parse for narrative and recommendation sections
    pub fn into_text(self) -> String {
        match self {
            BackendResponse::OutputText(text) => text,
            other => other.text().unwrap_or_default(),
        }
    }
}

fn first_text(content: Option<&Vec<ContentPart>>) -> Option<String> {
    content
        .and_then(|parts| parts.first())
        .and_then(|part| part.text.clone())
        .filter(|text| !text.trim().is_empty())
}

/// OpenAI Responses API backend
#[derive(Debug)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
}

impl OpenAiBackend {
    /// Create a backend from configuration; fails without an API key
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummaryError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SummaryError::Configuration("API key not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummaryError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<BackendResponse, SummaryError> {
        let start = Instant::now();

        debug!(model = %self.model, "Sending summary request");

        let response = self
            .client
            .post(self.responses_url())
            .bearer_auth(&self.api_key)
            .json(&ResponsesRequest {
                model: &self.model,
                input: prompt,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummaryError::Timeout(self.timeout_secs)
                } else {
                    SummaryError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Summary backend returned an error status");
            return Err(SummaryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Summary backend responded"
        );

        Ok(BackendResponse::from_json(value))
    }
}
