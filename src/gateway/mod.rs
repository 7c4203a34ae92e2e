//! Text-generation gateway.
//!
//! A uniform interface to an external completion backend. The gateway makes a
//! single attempt per call and never panics into caller logic: transport
//! failures, timeouts and unusable structured output all come back as a
//! [`GatewayError`], and every call site pairs it with a deterministic fallback.

mod openai;
pub mod testing;

pub use openai::{OpenAiGateway, OpenAiGatewayConfig};

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Why a gateway call produced nothing usable.
///
/// Callers must not branch on the variant for control flow: a timeout is
/// handled exactly like any other failure. Variants exist for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed output: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// What the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A single JSON object; the caller validates it against its own schema.
    Structured,
    /// Free-form text.
    FreeText,
}

/// A system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Raw gateway output, already checked against the requested [`ResponseShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Structured(Value),
    Text(String),
}

impl RawOutput {
    /// Converts backend text into the requested shape.
    pub fn from_text(text: &str, shape: ResponseShape) -> Result<Self, GatewayError> {
        match shape {
            ResponseShape::FreeText => {
                let text = text.trim();
                if text.is_empty() {
                    Err(GatewayError::Malformed("empty completion".into()))
                } else {
                    Ok(Self::Text(text.to_string()))
                }
            }
            ResponseShape::Structured => extract_json(text)
                .map(Self::Structured)
                .ok_or_else(|| GatewayError::Malformed("no JSON object in completion".into())),
        }
    }

    /// Decodes structured output into `T`, mapping schema mismatches to
    /// [`GatewayError::Malformed`].
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, GatewayError> {
        match self {
            Self::Structured(value) => serde_json::from_value(value)
                .map_err(|e| GatewayError::Malformed(format!("schema validation failed: {}", e))),
            Self::Text(_) => Err(GatewayError::Malformed(
                "expected structured output, got free text".into(),
            )),
        }
    }
}

/// Uniform interface to an external completion capability.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Short backend name for logs and health reports.
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt, shape: ResponseShape)
        -> Result<RawOutput, GatewayError>;
}

/// Requests a structured completion and decodes it into `T`.
pub async fn complete_structured<T: DeserializeOwned>(
    gateway: &dyn Gateway,
    prompt: &Prompt,
) -> Result<T, GatewayError> {
    gateway
        .complete(prompt, ResponseShape::Structured)
        .await?
        .decode()
}

/// A gateway with no backend. Every call fails, so every step takes its
/// deterministic path.
#[derive(Debug, Clone, Default)]
pub struct OfflineGateway;

#[async_trait]
impl Gateway for OfflineGateway {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(
        &self,
        _prompt: &Prompt,
        _shape: ResponseShape,
    ) -> Result<RawOutput, GatewayError> {
        Err(GatewayError::Unavailable(
            "no text-generation backend configured".into(),
        ))
    }
}

/// Pulls the first JSON object out of completion text.
///
/// Backends often wrap JSON in markdown fences or add a sentence before it,
/// so this tries the whole text, then a fenced block, then the outermost
/// `{ ... }` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();

    let parse_object = |s: &str| match serde_json::from_str::<Value>(s.trim()) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    };

    if let Some(v) = parse_object(text) {
        return Some(v);
    }

    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        let body = body.strip_prefix("json").unwrap_or(body);
        if let Some(end) = body.find("```") {
            if let Some(v) = parse_object(&body[..end]) {
                return Some(v);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}
