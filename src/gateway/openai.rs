//! Gateway backed by an OpenAI-compatible chat completions endpoint.
//!
//! Works against LM Studio, Ollama's OpenAI shim, or the hosted API; the
//! backend is chosen by base URL and model name alone.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{Gateway, GatewayError, Prompt, RawOutput, ResponseShape};

/// Connection settings for [`OpenAiGateway`].
#[derive(Debug, Clone)]
pub struct OpenAiGatewayConfig {
    /// Base URL including the API version segment, e.g. `http://127.0.0.1:1234/v1`.
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// HTTP client for an OpenAI-compatible completion backend.
#[derive(Debug, Clone)]
pub struct OpenAiGateway {
    config: OpenAiGatewayConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGateway {
    pub fn new(config: OpenAiGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("could not build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn request_body(&self, prompt: &Prompt, shape: ResponseShape) -> serde_json::Value {
        let system = match shape {
            ResponseShape::Structured => format!(
                "{}\n\nRespond with a single JSON object and nothing else.",
                prompt.system
            ),
            ResponseShape::FreeText => prompt.system.clone(),
        };

        let mut body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt.user },
            ],
        });
        if shape == ResponseShape::Structured {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    fn map_transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Gateway for OpenAiGateway {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        shape: ResponseShape,
    ) -> Result<RawOutput, GatewayError> {
        tracing::debug!(model = %self.config.model, ?shape, "Sending completion request");

        let mut request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(prompt, shape));
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::Malformed("completion has no content".into()))?;

        RawOutput::from_text(&content, shape)
    }
}
