use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::error::{LlmError, LlmResult};
use crate::models::{model_config, CompletionField, Provider};
use crate::types::*;

const DEFAULT_MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 60000;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Anything that can answer a chat completion.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat_complete(&self, request: ChatRequest) -> LlmResult<ChatResponse>;
}

/// Every message must carry non-blank content.
pub fn validate_messages(messages: &[ChatMessage]) -> LlmResult<()> {
    if messages.is_empty() {
        return Err(LlmError::Validation(
            "messages must be a non-empty list".to_string(),
        ));
    }

    if let Some(index) = messages.iter().position(|m| m.content.trim().is_empty()) {
        return Err(LlmError::Validation(format!(
            "message {} has empty content",
            index
        )));
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn openai(api_key: Option<String>) -> Self {
        Self::new(OPENAI_BASE_URL, api_key)
    }

    pub fn deepseek(api_key: Option<String>) -> Self {
        Self::new(DEEPSEEK_BASE_URL, api_key)
    }
}

/// Client for OpenAI and DeepSeek chat completions.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    openai: ProviderEndpoint,
    deepseek: ProviderEndpoint,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl OpenAiCompatClient {
    pub fn new(openai: ProviderEndpoint, deepseek: ProviderEndpoint) -> Self {
        Self {
            client: Client::new(),
            openai,
            deepseek,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, max_retries: u32, initial_ms: u64, max_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff_ms = initial_ms;
        self.max_backoff_ms = max_ms.max(initial_ms);
        self
    }

    fn endpoint(&self, provider: Provider) -> &ProviderEndpoint {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::DeepSeek => &self.deepseek,
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: F, operation_name: &str) -> LlmResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = LlmResult<T>>,
    {
        let mut retries = 0;
        let mut backoff_ms = self.initial_backoff_ms;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => {
                    if retries >= self.max_retries {
                        error!(
                            "{} failed after {} retries: {}",
                            operation_name, retries, e
                        );
                        return Err(e);
                    }

                    let wait_ms = match &e {
                        LlmError::RateLimited {
                            retry_after: Some(secs),
                            ..
                        } => secs * 1000,
                        _ => backoff_ms,
                    }
                    .min(self.max_backoff_ms);

                    warn!(
                        "{} failed ({}), retrying in {}ms (attempt {}/{})",
                        operation_name,
                        e,
                        wait_ms,
                        retries + 1,
                        self.max_retries
                    );

                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                    retries += 1;
                    backoff_ms = (backoff_ms * 2).min(self.max_backoff_ms);
                }
                Err(e) => {
                    if retries > 0 {
                        info!("{} failed after {} retries: {}", operation_name, retries, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Wire body with the model's token ceiling and temperature rules applied.
    pub fn build_request(request: &ChatRequest) -> ChatCompletionRequest {
        let config = model_config(&request.model);
        let limit = config.clamp_max_tokens(request.max_tokens);
        let (max_tokens, max_completion_tokens) = match config.completion_field {
            CompletionField::MaxTokens => (Some(limit), None),
            CompletionField::MaxCompletionTokens => (None, Some(limit)),
        };

        ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            temperature: config.effective_temperature(request.temperature),
            max_tokens,
            max_completion_tokens,
            stream: Some(false),
        }
    }

    async fn chat_completion_inner(
        &self,
        provider: Provider,
        body: &ChatCompletionRequest,
    ) -> LlmResult<ChatResponse> {
        let endpoint = self.endpoint(provider);
        let api_key = endpoint
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured {
                provider: provider.name().to_string(),
                reason: "API key is missing".to_string(),
            })?;

        debug!(
            "Creating chat completion with {} messages, model {} via {}",
            body.messages.len(),
            body.model,
            provider
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", endpoint.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                warn!("Rate limited by {}", provider);
                return Err(LlmError::RateLimited {
                    provider: provider.name().to_string(),
                    retry_after,
                });
            }

            if let Ok(error_resp) = serde_json::from_str::<ApiErrorBody>(&error_text) {
                error!(
                    "{} API error: {} (type: {:?})",
                    provider, error_resp.error.message, error_resp.error.error_type
                );
                return Err(LlmError::Api {
                    provider: provider.name().to_string(),
                    message: error_resp.error.message,
                    status_code: Some(status.as_u16()),
                });
            }

            return Err(LlmError::Api {
                provider: provider.name().to_string(),
                message: error_text,
                status_code: Some(status.as_u16()),
            });
        }

        let chat_response: ChatCompletionResponse = response.json().await?;
        let usage = chat_response.usage.unwrap_or_default().into();
        let model = chat_response.model.unwrap_or_else(|| body.model.clone());

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse(body.model.clone()))?;

        Ok(ChatResponse {
            content,
            usage,
            model,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat_complete(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        validate_messages(&request.messages)?;

        let provider = Provider::for_model(&request.model);
        let body = Self::build_request(&request);

        self.with_retry(
            || async { self.chat_completion_inner(provider, &body).await },
            "chat_completion",
        )
        .await
    }
}
