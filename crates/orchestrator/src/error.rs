use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No prompt found for phase {0}")]
    PromptNotFound(i64),

    #[error("Please complete phase {missing_phase} before starting phase {phase}")]
    PreconditionFailed { phase: i64, missing_phase: i64 },

    #[error("Unknown phase: {0}")]
    UnknownPhase(i64),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    #[error(transparent)]
    Core(#[from] vyve_core::CoreError),

    #[error("No documents or frameworks available for analysis")]
    NoContext,

    #[error("{step} produced no content")]
    EmptyOutput { step: String },
}

impl OrchestratorError {
    pub fn empty_output(step: impl Into<String>) -> Self {
        Self::EmptyOutput { step: step.into() }
    }

    /// Errors raised before anything was written for the run.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::PromptNotFound(_) | Self::PreconditionFailed { .. } | Self::UnknownPhase(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
