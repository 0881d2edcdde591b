use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ApiSection;
use crate::error::AppError;
use crate::services::prompt_service::SYSTEM_PROMPT;

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 500;
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// The remote model that turns a rendered batch prompt into free text.
#[async_trait]
pub trait ClassificationClient: Send + Sync {
    async fn classify(&self, prompt: &str) -> Result<String, AppError>;

    /// Cheap connectivity check.
    async fn check(&self) -> Result<(), AppError> {
        self.classify("ping").await.map(|_| ())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionClient {
    pub fn new(api: &ApiSection, timeout: Duration) -> Result<Self, AppError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api.api_key.trim().to_string(),
            base_url: api.base_url.trim_end_matches('/').to_string(),
            model: api.model.clone(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String, AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transport {
                status: Some(status.as_u16()),
                message: body.chars().take(300).collect(),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| AppError::Transport {
                status: Some(status.as_u16()),
                message: "response contained no choices".to_string(),
            })?;

        debug!(chars = content.len(), "classification reply received");
        Ok(content)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl ClassificationClient for ChatCompletionClient {
    async fn classify(&self, prompt: &str) -> Result<String, AppError> {
        info!(model = %self.model, "calling classification endpoint");
        self.send(
            vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", prompt),
            ],
            MAX_TOKENS,
            self.timeout,
        )
        .await
    }

    async fn check(&self) -> Result<(), AppError> {
        self.send(vec![ChatMessage::new("user", "test")], 1, CHECK_TIMEOUT)
            .await
            .map(|_| ())
    }
}
