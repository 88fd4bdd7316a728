use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use vyve_core::AnalysisResult;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearResultsResponse {
    pub deleted: u64,
}

#[utoipa::path(
    get,
    path = "/api/analysis-results",
    responses(
        (status = 200, description = "Stored results ordered by phase", body = Vec<AnalysisResult>)
    ),
    tag = "results"
)]
pub async fn list_analysis_results(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnalysisResult>>, AppError> {
    Ok(Json(state.results.list().await?))
}

/// Polling target while a phase runs.
#[utoipa::path(
    get,
    path = "/api/analysis-results/{phase}",
    params(
        ("phase" = i64, Path, description = "Phase number")
    ),
    responses(
        (status = 200, description = "Result row with its step log", body = AnalysisResult),
        (status = 404, description = "Phase has no stored result")
    ),
    tag = "results"
)]
pub async fn get_analysis_result(
    State(state): State<AppState>,
    Path(phase): Path<i64>,
) -> Result<Json<AnalysisResult>, AppError> {
    state
        .results
        .find_by_phase(phase)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No analysis result for phase {}", phase)))
}

#[utoipa::path(
    delete,
    path = "/api/analysis-results",
    responses(
        (status = 200, description = "Every stored result deleted", body = ClearResultsResponse)
    ),
    tag = "results"
)]
pub async fn clear_analysis_results(
    State(state): State<AppState>,
) -> Result<Json<ClearResultsResponse>, AppError> {
    let deleted = state.orchestrator.clear_results().await?;
    Ok(Json(ClearResultsResponse { deleted }))
}
