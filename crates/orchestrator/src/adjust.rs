//! User-requested revisions of an existing analysis.

use std::sync::Arc;

use chrono::Utc;
use db::AnalysisResultRepository;
use events::{Event, EventBus};
use llm::tokens::{estimate_tokens, estimate_total, truncate_to_tokens};
use llm::{model_config, ChatClient, ChatMessage, ChatRequest, LlmError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use vyve_core::{extract_key_findings, AdjustmentRecord, TokenUsage};

use crate::locks::PhaseLocks;
use crate::prompts::PhasePrompts;

const O3_MINI_ADJUST_TOKENS: u32 = 6000;
const FINDINGS_MAX_TOKENS: u32 = 500;
/// Share of the context ceiling kept free for the completion when truncating.
const COMPLETION_RESERVE_DIVISOR: usize = 4;

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AdjustRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub context: Option<AdjustContext>,
    /// When set, the adjustment is recorded on that phase's stored result
    #[serde(default)]
    pub phase_number: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AdjustContext {
    #[serde(default)]
    pub original_content: Option<String>,
    #[serde(default)]
    pub key_findings: Option<Vec<String>>,
    #[serde(default)]
    pub phase_name: Option<String>,
    #[serde(default)]
    pub phase_description: Option<String>,
    #[serde(default)]
    pub user_adjustment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AdjustResponse {
    pub content: String,
    pub key_findings: Vec<String>,
    pub usage: TokenUsage,
    pub validation: AdjustValidation,
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AdjustValidation {
    pub warnings: Vec<String>,
    pub content_modifications: Vec<ContentModification>,
    pub metrics: AdjustMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ContentModification {
    #[serde(rename = "type")]
    pub kind: String,
    pub original_length: usize,
    pub truncated_length: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AdjustMetrics {
    pub estimated_tokens: usize,
    pub response_tokens: u64,
    pub content_length: usize,
}

#[derive(Debug, Error)]
pub enum AdjustError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Failed to initialize {0}")]
    NotConfigured(String),

    #[error("Analysis failed: {0}")]
    Api(String),

    #[error("Invalid response from model")]
    EmptyResponse,
}

impl From<LlmError> for AdjustError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NotConfigured { .. } => AdjustError::NotConfigured(err.to_string()),
            LlmError::EmptyResponse(_) => AdjustError::EmptyResponse,
            other => AdjustError::Api(other.to_string()),
        }
    }
}

/// Validated adjustment inputs with defaults applied.
struct AdjustInput {
    model: String,
    system_prompt: String,
    original_content: String,
    key_findings: Vec<String>,
    phase_name: String,
    phase_description: String,
    user_adjustment: String,
    phase_number: Option<i64>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, AdjustError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(AdjustError::MissingField(field))
}

impl TryFrom<AdjustRequest> for AdjustInput {
    type Error = AdjustError;

    fn try_from(request: AdjustRequest) -> Result<Self, Self::Error> {
        let model = required(request.model, "model")?;
        let system_prompt = required(request.system_prompt, "system_prompt")?;
        let context = request
            .context
            .ok_or(AdjustError::MissingField("context.original_content"))?;
        let original_content = required(context.original_content, "context.original_content")?;
        let user_adjustment = required(context.user_adjustment, "context.user_adjustment")?;

        Ok(Self {
            model,
            system_prompt,
            original_content,
            key_findings: context.key_findings.unwrap_or_default(),
            phase_name: context
                .phase_name
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            phase_description: context
                .phase_description
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "No description".to_string()),
            user_adjustment,
            phase_number: request.phase_number,
        })
    }
}

pub struct AnalysisAdjuster {
    chat: Arc<dyn ChatClient>,
    results: AnalysisResultRepository,
    event_bus: Option<EventBus>,
    locks: PhaseLocks,
}

impl AnalysisAdjuster {
    pub fn new(chat: Arc<dyn ChatClient>, results: AnalysisResultRepository) -> Self {
        Self {
            chat,
            results,
            event_bus: None,
            locks: PhaseLocks::default(),
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Records adjustments under the same per-phase locks as phase runs,
    /// so an adjustment waits for a running phase to finish.
    pub fn with_phase_locks(mut self, locks: PhaseLocks) -> Self {
        self.locks = locks;
        self
    }

    pub async fn adjust(
        &self,
        request: AdjustRequest,
        request_id: &str,
    ) -> Result<AdjustResponse, AdjustError> {
        let mut input = AdjustInput::try_from(request)?;
        let config = model_config(&input.model);
        info!(
            request_id,
            model = %input.model,
            content_length = input.original_content.chars().count(),
            "Adjusting analysis"
        );

        let completion_tokens = if input.model == "o3-mini" {
            O3_MINI_ADJUST_TOKENS
        } else {
            config.default_max_tokens
        };

        let findings_text = input.key_findings.join("\n");
        let estimated_tokens = estimate_total([
            input.original_content.as_str(),
            input.system_prompt.as_str(),
            input.user_adjustment.as_str(),
            findings_text.as_str(),
        ]);
        let ceiling = config.max_allowed_tokens as usize;

        let mut validation = AdjustValidation::default();
        if estimated_tokens > ceiling {
            let others = estimate_tokens(&input.system_prompt)
                + estimate_tokens(&input.user_adjustment)
                + estimate_tokens(&findings_text);
            let reserve = (completion_tokens as usize).min(ceiling / COMPLETION_RESERVE_DIVISOR);
            let budget = ceiling.saturating_sub(others + reserve);

            let original_length = input.original_content.chars().count();
            input.original_content = truncate_to_tokens(&input.original_content, budget).to_string();
            let truncated_length = input.original_content.chars().count();

            warn!(
                request_id,
                original_length,
                truncated_length,
                ceiling,
                "Original content truncated to fit the model context"
            );
            validation.warnings.push(format!(
                "Original content exceeded the {} token limit of {} and was truncated",
                ceiling, input.model
            ));
            validation.content_modifications.push(ContentModification {
                kind: "truncation".to_string(),
                original_length,
                truncated_length,
            });
        }

        let revision = self
            .chat
            .chat_complete(
                ChatRequest::new(
                    input.model.as_str(),
                    vec![
                        ChatMessage::system(input.system_prompt.as_str()),
                        ChatMessage::user(PhasePrompts::adjustment(
                            &input.original_content,
                            &input.key_findings,
                            &input.phase_name,
                            &input.phase_description,
                            &input.user_adjustment,
                        )),
                    ],
                )
                .with_max_tokens(completion_tokens),
            )
            .await?;
        if revision.content.trim().is_empty() {
            return Err(AdjustError::EmptyResponse);
        }

        let key_findings = self
            .findings(&input.model, &revision.content, request_id)
            .await;

        validation.metrics = AdjustMetrics {
            estimated_tokens,
            response_tokens: revision.usage.total_tokens,
            content_length: input.original_content.chars().count(),
        };

        if let Some(phase_number) = input.phase_number {
            self.record(phase_number, &input, request_id).await;
        }

        if let Some(bus) = &self.event_bus {
            bus.emit(Event::AnalysisAdjusted {
                phase_number: input.phase_number,
                request_id: request_id.to_string(),
            });
        }

        Ok(AdjustResponse {
            content: revision.content,
            key_findings,
            usage: revision.usage,
            validation,
        })
    }

    /// Best-effort bullet extraction; failures yield no findings.
    async fn findings(&self, model: &str, content: &str, request_id: &str) -> Vec<String> {
        let request = ChatRequest::new(
            model,
            vec![
                ChatMessage::system(PhasePrompts::findings_system()),
                ChatMessage::user(PhasePrompts::findings_user(content)),
            ],
        )
        .with_max_tokens(FINDINGS_MAX_TOKENS);

        match self.chat.chat_complete(request).await {
            Ok(response) => extract_key_findings(&response.content),
            Err(err) => {
                warn!(request_id, error = %err, "Key findings extraction failed");
                Vec::new()
            }
        }
    }

    async fn record(&self, phase_number: i64, input: &AdjustInput, request_id: &str) {
        let record = AdjustmentRecord {
            timestamp: Utc::now(),
            prompt: input.user_adjustment.clone(),
            model: input.model.clone(),
        };
        let _guard = self.locks.acquire(phase_number).await;
        match self.results.append_adjustment(phase_number, record).await {
            Ok(Some(_)) => info!(request_id, phase = phase_number, "Recorded adjustment"),
            Ok(None) => warn!(request_id, phase = phase_number, "No stored result to record adjustment on"),
            Err(err) => warn!(request_id, phase = phase_number, error = %err, "Failed to record adjustment"),
        }
    }
}
