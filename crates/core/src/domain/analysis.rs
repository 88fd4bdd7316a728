use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CoreError;

/// Lifecycle of one phase's result row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Status only moves forward within one run. Starting a new run is done
    /// through [`AnalysisResult::begin_run`], not through a transition.
    pub fn validate_transition(self, to: AnalysisStatus) -> Result<(), CoreError> {
        let allowed = self == to
            || matches!(
                (self, to),
                (Self::Pending, Self::InProgress)
                    | (Self::Pending, Self::Error)
                    | (Self::InProgress, Self::Completed)
                    | (Self::InProgress, Self::Error)
            );

        if allowed {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// The fixed, ordered stages of a phase run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    InitialSetup,
    DocumentRetrieval,
    VectorQuery,
    FrameworkAnalysis,
    ModelAnalysis,
    FormatVerification,
    FinalVerification,
    SavingResults,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 8] = [
        Self::InitialSetup,
        Self::DocumentRetrieval,
        Self::VectorQuery,
        Self::FrameworkAnalysis,
        Self::ModelAnalysis,
        Self::FormatVerification,
        Self::FinalVerification,
        Self::SavingResults,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialSetup => "Initial Setup",
            Self::DocumentRetrieval => "Document Retrieval",
            Self::VectorQuery => "Vector Query",
            Self::FrameworkAnalysis => "Framework Analysis",
            Self::ModelAnalysis => "Model Analysis",
            Self::FormatVerification => "Format Verification",
            Self::FinalVerification => "Final Verification",
            Self::SavingResults => "Saving Results",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.name() == name)
    }

    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|step| step == self)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StepLog {
    pub step_name: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    #[cfg_attr(feature = "typescript", ts(type = "unknown"))]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// A user-requested revision applied to a stored analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AdjustmentRecord {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AnalysisMetadata {
    pub status: AnalysisStatus,
    #[serde(default)]
    pub conversation_log: Vec<StepLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_findings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<AdjustmentRecord>,
    /// Number of stored content chunks when the content exceeded the inline limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
}

impl AnalysisMetadata {
    /// Fresh metadata for a run: first step in progress, the rest pending.
    pub fn new_run(model: impl Into<String>) -> Self {
        let now = Utc::now();
        let conversation_log = PipelineStep::ALL
            .iter()
            .enumerate()
            .map(|(i, step)| StepLog {
                step_name: step.name().to_string(),
                status: if i == 0 {
                    StepStatus::InProgress
                } else {
                    StepStatus::Pending
                },
                timestamp: now,
                details: None,
            })
            .collect();

        Self {
            status: AnalysisStatus::InProgress,
            conversation_log,
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn step(&self, step: PipelineStep) -> Option<&StepLog> {
        self.conversation_log
            .iter()
            .find(|log| log.step_name == step.name())
    }

    pub fn update_step(
        &mut self,
        step: PipelineStep,
        status: StepStatus,
        details: Option<serde_json::Value>,
    ) {
        let now = Utc::now();
        match self
            .conversation_log
            .iter_mut()
            .find(|log| log.step_name == step.name())
        {
            Some(log) => {
                log.status = status;
                log.timestamp = now;
                if details.is_some() {
                    log.details = details;
                }
            }
            None => self.conversation_log.push(StepLog {
                step_name: step.name().to_string(),
                status,
                timestamp: now,
                details,
            }),
        }
    }

    /// The step currently marked in progress, if any.
    pub fn current_step(&self) -> Option<PipelineStep> {
        self.conversation_log
            .iter()
            .find(|log| log.status == StepStatus::InProgress)
            .and_then(|log| PipelineStep::parse(&log.step_name))
    }

    /// Aborts the run: the in-progress step (or `failed_step` when given)
    /// becomes `error` and every later unsettled step is marked skipped.
    pub fn fail(&mut self, failed_step: Option<PipelineStep>, message: impl Into<String>) {
        let message = message.into();
        let failed = failed_step
            .or_else(|| self.current_step())
            .unwrap_or(PipelineStep::InitialSetup);

        self.update_step(
            failed,
            StepStatus::Error,
            Some(serde_json::json!({ "error": message })),
        );

        for step in PipelineStep::ALL.iter().skip(failed.index() + 1) {
            let unsettled = self
                .step(*step)
                .map(|log| !log.status.is_settled())
                .unwrap_or(true);
            if unsettled {
                self.update_step(
                    *step,
                    StepStatus::Error,
                    Some(serde_json::json!({ "skipped": true })),
                );
            }
        }

        self.status = AnalysisStatus::Error;
        self.error = Some(message);
    }

    /// True when no step is left pending or in progress.
    pub fn is_settled(&self) -> bool {
        self.conversation_log
            .iter()
            .all(|log| log.status.is_settled())
    }
}

/// The single persisted row for a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AnalysisResult {
    pub id: Uuid,
    pub phase_number: i64,
    pub sub_phase: i64,
    pub content: String,
    pub metadata: AnalysisMetadata,
    /// Bumped on every write; writers must present the version they read
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(phase_number: i64, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phase_number,
            sub_phase: 0,
            content: String::new(),
            metadata: AnalysisMetadata::new_run(model),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Restart this row for a new run, keeping its identity and version.
    pub fn begin_run(&mut self, model: impl Into<String>) {
        let adjustments = std::mem::take(&mut self.metadata.adjustments);
        self.content.clear();
        self.metadata = AnalysisMetadata::new_run(model);
        self.metadata.adjustments = adjustments;
        self.updated_at = Utc::now();
    }

    pub fn status(&self) -> AnalysisStatus {
        self.metadata.status
    }

    pub fn is_completed(&self) -> bool {
        self.metadata.status == AnalysisStatus::Completed && !self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(AnalysisStatus::InProgress.as_str(), "in_progress");
        assert_eq!(
            AnalysisStatus::parse("completed"),
            Some(AnalysisStatus::Completed)
        );
        assert_eq!(AnalysisStatus::parse("done"), None);
    }

    #[test]
    fn test_status_is_monotonic() {
        use AnalysisStatus::*;
        assert!(Pending.validate_transition(InProgress).is_ok());
        assert!(InProgress.validate_transition(Completed).is_ok());
        assert!(InProgress.validate_transition(Error).is_ok());
        assert!(Completed.validate_transition(InProgress).is_err());
        assert!(Error.validate_transition(Completed).is_err());
        assert!(Completed.validate_transition(Pending).is_err());
    }

    #[test]
    fn test_pipeline_order() {
        let names: Vec<_> = PipelineStep::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "Initial Setup",
                "Document Retrieval",
                "Vector Query",
                "Framework Analysis",
                "Model Analysis",
                "Format Verification",
                "Final Verification",
                "Saving Results",
            ]
        );
        assert_eq!(PipelineStep::ModelAnalysis.index(), 4);
        assert_eq!(
            PipelineStep::parse("Vector Query"),
            Some(PipelineStep::VectorQuery)
        );
    }

    #[test]
    fn test_new_run_metadata() {
        let metadata = AnalysisMetadata::new_run("o3-mini");
        assert_eq!(metadata.status, AnalysisStatus::InProgress);
        assert_eq!(metadata.conversation_log.len(), 8);
        assert_eq!(metadata.conversation_log[0].status, StepStatus::InProgress);
        assert!(metadata.conversation_log[1..]
            .iter()
            .all(|log| log.status == StepStatus::Pending));
        assert_eq!(metadata.current_step(), Some(PipelineStep::InitialSetup));
    }

    #[test]
    fn test_fail_settles_every_step() {
        let mut metadata = AnalysisMetadata::new_run("gpt-4");
        metadata.update_step(PipelineStep::InitialSetup, StepStatus::Completed, None);
        metadata.update_step(PipelineStep::DocumentRetrieval, StepStatus::InProgress, None);

        metadata.fail(None, "boom");

        assert_eq!(metadata.status, AnalysisStatus::Error);
        assert_eq!(metadata.error.as_deref(), Some("boom"));
        assert!(metadata.is_settled());

        let failed = metadata.step(PipelineStep::DocumentRetrieval).unwrap();
        assert_eq!(failed.status, StepStatus::Error);
        assert_eq!(failed.details.as_ref().unwrap()["error"], "boom");

        let skipped = metadata.step(PipelineStep::SavingResults).unwrap();
        assert_eq!(skipped.status, StepStatus::Error);
        assert_eq!(skipped.details.as_ref().unwrap()["skipped"], true);

        let first = metadata.step(PipelineStep::InitialSetup).unwrap();
        assert_eq!(first.status, StepStatus::Completed);
    }

    #[test]
    fn test_usage_addition() {
        let mut total = TokenUsage::default();
        total += TokenUsage::new(10, 5);
        total += TokenUsage::new(1, 2);
        assert_eq!(total, TokenUsage::new(11, 7));
        assert_eq!(total.total_tokens, 18);
    }

    #[test]
    fn test_begin_run_keeps_adjustments() {
        let mut result = AnalysisResult::new(2, "gpt-4");
        result.content = "old".to_string();
        result.metadata.status = AnalysisStatus::Completed;
        result.metadata.adjustments.push(AdjustmentRecord {
            timestamp: Utc::now(),
            prompt: "shorter".to_string(),
            model: "gpt-4".to_string(),
        });

        result.begin_run("o3-mini");

        assert!(result.content.is_empty());
        assert_eq!(result.status(), AnalysisStatus::InProgress);
        assert_eq!(result.metadata.adjustments.len(), 1);
        assert_eq!(result.metadata.model.as_deref(), Some("o3-mini"));
    }

    #[test]
    fn test_metadata_json_shape() {
        let metadata = AnalysisMetadata::new_run("o3-mini");
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["conversation_log"][0]["step_name"], "Initial Setup");
        assert!(json.get("error").is_none());
    }
}
