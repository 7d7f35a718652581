use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ragline_core::config::BackendConfig;
use ragline_core::error::BackendError;
use ragline_core::traits::CompletionService;

use crate::http::{check_status, client, transport_error};

/// OpenAI-compatible `POST /chat/completions` client (OpenAI, vLLM, Ollama's
/// `/v1`). Each prompt is sent as a single user message.
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            client: client(timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key: None,
            temperature: 0.0,
            timeout,
        })
    }

    pub fn from_config(backends: &BackendConfig) -> Result<Self, BackendError> {
        let mut client = Self::new(&backends.completion_url, backends.completion_model.clone(), backends.request_timeout())?;
        client.api_key = backends.api_key.clone();
        Ok(client)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
        };
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| transport_error(e, self.timeout))?;
        let body: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("completion body: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed("completion without content".into()))
    }
}
