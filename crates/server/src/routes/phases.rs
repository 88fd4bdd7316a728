use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use orchestrator::PhaseStatus;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RunPhaseQuery {
    /// Model to run with; the configured default when absent
    pub model: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunPhaseResponse {
    pub phase_number: i64,
    pub model: String,
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/api/phases",
    responses(
        (status = 200, description = "Catalog of phases with stored status and whether a run holds the phase", body = Vec<PhaseStatus>)
    ),
    tag = "phases"
)]
pub async fn list_phases(
    State(state): State<AppState>,
) -> Result<Json<Vec<PhaseStatus>>, AppError> {
    Ok(Json(state.orchestrator.phase_statuses().await?))
}

/// Starts a phase run in the background.
///
/// Preconditions are checked before responding, so a missing prompt or an
/// unfinished predecessor is reported here. Progress is then visible on
/// `GET /api/analysis-results/{phase}` and the event stream.
#[utoipa::path(
    post,
    path = "/api/phases/{phase}/run",
    params(
        ("phase" = i64, Path, description = "Phase number"),
        RunPhaseQuery
    ),
    responses(
        (status = 202, description = "Run started", body = RunPhaseResponse),
        (status = 400, description = "Negative phase number"),
        (status = 404, description = "No prompt for the phase"),
        (status = 409, description = "Previous phase not completed")
    ),
    tag = "phases"
)]
pub async fn run_phase(
    State(state): State<AppState>,
    Path(phase): Path<i64>,
    Query(query): Query<RunPhaseQuery>,
) -> Result<(StatusCode, Json<RunPhaseResponse>), AppError> {
    state.orchestrator.check_preconditions(phase).await?;

    let model = query
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.orchestrator.default_model().to_string());

    let orchestrator = state.orchestrator.clone();
    let run_model = model.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_phase(phase, &run_model).await {
            tracing::warn!(phase, error = %e, "Background phase run ended with error");
        }
    });

    tracing::info!(phase, model = %model, "Phase run accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(RunPhaseResponse {
            phase_number: phase,
            model,
            status: "accepted".to_string(),
        }),
    ))
}
