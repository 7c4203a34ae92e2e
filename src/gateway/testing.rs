//! Scripted gateway for exercising both the gateway and fallback paths.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Gateway, GatewayError, Prompt, RawOutput, ResponseShape};

/// A gateway that replays a queue of canned completions.
///
/// Each call pops the next entry; text entries go through the same shape
/// checks as a real backend's output. An empty queue fails every call, so
/// `ScriptedGateway::failing()` drives every step down its fallback path.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn then_json(self, value: serde_json::Value) -> Self {
        self.push(Ok(value.to_string()));
        self
    }

    pub fn then_fail(self, error: GatewayError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, entry: Result<String, GatewayError>) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(entry);
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("prompt log poisoned").len()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().expect("script lock poisoned").len()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        shape: ResponseShape,
    ) -> Result<RawOutput, GatewayError> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.clone());

        let next = self.script.lock().expect("script lock poisoned").pop_front();
        match next {
            Some(Ok(text)) => RawOutput::from_text(&text, shape),
            Some(Err(e)) => Err(e),
            None => Err(GatewayError::Unavailable("script exhausted".into())),
        }
    }
}
