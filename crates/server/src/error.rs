use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use llm::LlmError;
use orchestrator::{AdjustError, OrchestratorError};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
    Database(db::DbError),
    Orchestrator(OrchestratorError),
    /// Adjustment failures carry the request id into the body
    Adjust {
        source: AdjustError,
        request_id: String,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

type Parts = (StatusCode, &'static str, String);

fn database_parts(err: db::DbError) -> Parts {
    match err {
        db::DbError::PromptNotFound { .. } | db::DbError::DocumentNotFound(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        db::DbError::VersionConflict { .. } | db::DbError::Duplicate(_) => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        _ => {
            tracing::error!("Database error: {:?}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error occurred".to_string(),
            )
        }
    }
}

fn llm_parts(err: LlmError) -> Parts {
    let code = match &err {
        LlmError::Validation(_) => {
            return (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        LlmError::NotConfigured { .. } => "OPENAI_INIT_ERROR",
        LlmError::Api { .. } | LlmError::Http(_) | LlmError::RateLimited { .. } => {
            "OPENAI_API_ERROR"
        }
        LlmError::EmptyResponse(_) => "OPENAI_ERROR",
        LlmError::Serialization(_) => "INTERNAL_SERVER_ERROR",
    };
    tracing::error!("Model provider error: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
}

fn orchestrator_parts(err: OrchestratorError) -> Parts {
    match err {
        OrchestratorError::PromptNotFound(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        OrchestratorError::PreconditionFailed { .. } => {
            (StatusCode::CONFLICT, "PRECONDITION_FAILED", err.to_string())
        }
        OrchestratorError::UnknownPhase(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        OrchestratorError::Database(err) => database_parts(err),
        OrchestratorError::Llm(err) => llm_parts(err),
        other => {
            tracing::error!("Orchestrator error: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                other.to_string(),
            )
        }
    }
}

fn adjust_parts(err: AdjustError) -> Parts {
    match err {
        AdjustError::MissingField(_) | AdjustError::InvalidBody(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        AdjustError::NotConfigured(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "OPENAI_INIT_ERROR",
            err.to_string(),
        ),
        AdjustError::Api(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "OPENAI_API_ERROR",
            err.to_string(),
        ),
        AdjustError::EmptyResponse => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "OPENAI_ERROR",
            err.to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut request_id = None;
        let (status, error_type, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", msg)
            }
            AppError::Database(err) => database_parts(err),
            AppError::Orchestrator(err) => orchestrator_parts(err),
            AppError::Adjust { source, request_id: id } => {
                tracing::warn!(request_id = %id, error = %source, "Adjustment failed");
                request_id = Some(id);
                adjust_parts(source)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            request_id,
        });

        (status, body).into_response()
    }
}

impl AppError {
    pub fn adjust(source: AdjustError, request_id: &str) -> Self {
        AppError::Adjust {
            source,
            request_id: request_id.to_string(),
        }
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Database(err)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Orchestrator(err)
    }
}
