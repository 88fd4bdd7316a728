use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use orchestrator::{AdjustRequest, AdjustResponse};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Short id logged with each line of an adjustment and returned on failure.
fn request_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[utoipa::path(
    post,
    path = "/api/vyve/adjust-analysis",
    request_body = AdjustRequest,
    responses(
        (status = 200, description = "Revised analysis", body = AdjustResponse),
        (status = 400, description = "Missing required field", body = crate::error::ErrorResponse),
        (status = 500, description = "Provider failure", body = crate::error::ErrorResponse)
    ),
    tag = "adjust"
)]
pub async fn adjust_analysis(
    State(state): State<AppState>,
    payload: Result<Json<AdjustRequest>, JsonRejection>,
) -> Result<Json<AdjustResponse>, AppError> {
    let request_id = request_id();
    let Json(request) = payload.map_err(|rejection| AppError::Adjust {
        source: orchestrator::AdjustError::InvalidBody(rejection.body_text()),
        request_id: request_id.clone(),
    })?;

    tracing::info!(request_id = %request_id, "Adjust analysis request received");
    let response = state
        .adjuster
        .adjust(request, &request_id)
        .await
        .map_err(|e| AppError::adjust(e, &request_id))?;

    Ok(Json(response))
}
