use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use db::{DbError, ReferenceDocumentRepository};
use vyve_core::{extract_document_names, phase_info, PhasePrompt, UpsertPhasePrompt};

use crate::error::AppError;
use crate::state::AppState;

/// Builds the stored prompt for an upsert request.
///
/// Reference documents may be given by id, by filename, or not at all; in
/// the last case the names are read out of the prompt text. Unknown
/// filenames are skipped. The phase name defaults to the catalog name.
pub async fn resolve_prompt(
    documents: &ReferenceDocumentRepository,
    request: UpsertPhasePrompt,
) -> Result<PhasePrompt, DbError> {
    let names = if request.document_ids.is_empty() && request.document_names.is_empty() {
        extract_document_names(&request.prompt_text)
    } else {
        request.document_names
    };

    let mut document_ids = request.document_ids;
    for doc in documents.find_by_filenames(&names).await? {
        if !document_ids.contains(&doc.id) {
            document_ids.push(doc.id);
        }
    }

    let phase_name = request
        .phase_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| phase_info(request.phase_number).ok().map(|i| i.name.to_string()))
        .unwrap_or_else(|| format!("Phase {}", request.phase_number));

    Ok(
        PhasePrompt::new(request.phase_number, phase_name, request.prompt_text)
            .with_sub_phase(request.sub_phase)
            .with_documents(document_ids),
    )
}

pub fn validate_upsert(request: &UpsertPhasePrompt) -> Result<(), String> {
    if request.phase_number < 0 || request.sub_phase < 0 {
        return Err("phase_number and sub_phase must not be negative".to_string());
    }
    if request.prompt_text.trim().is_empty() {
        return Err("Missing required field: prompt_text".to_string());
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/phase-prompts",
    responses(
        (status = 200, description = "All phase prompts ordered by phase and sub-phase", body = Vec<PhasePrompt>)
    ),
    tag = "prompts"
)]
pub async fn list_phase_prompts(
    State(state): State<AppState>,
) -> Result<Json<Vec<PhasePrompt>>, AppError> {
    Ok(Json(state.prompts.list().await?))
}

#[utoipa::path(
    get,
    path = "/api/phase-prompts/{phase}/{sub_phase}",
    params(
        ("phase" = i64, Path, description = "Phase number"),
        ("sub_phase" = i64, Path, description = "Sub-phase number")
    ),
    responses(
        (status = 200, description = "Phase prompt", body = PhasePrompt),
        (status = 404, description = "No prompt stored for the key")
    ),
    tag = "prompts"
)]
pub async fn get_phase_prompt(
    State(state): State<AppState>,
    Path((phase, sub_phase)): Path<(i64, i64)>,
) -> Result<Json<PhasePrompt>, AppError> {
    state
        .prompts
        .find(phase, sub_phase)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!("No prompt found for phase {}.{}", phase, sub_phase))
        })
}

#[utoipa::path(
    put,
    path = "/api/phase-prompts",
    request_body = UpsertPhasePrompt,
    responses(
        (status = 200, description = "Prompt stored", body = PhasePrompt),
        (status = 400, description = "Invalid prompt")
    ),
    tag = "prompts"
)]
pub async fn upsert_phase_prompt(
    State(state): State<AppState>,
    Json(payload): Json<UpsertPhasePrompt>,
) -> Result<Json<PhasePrompt>, AppError> {
    validate_upsert(&payload).map_err(AppError::Validation)?;
    let prompt = resolve_prompt(&state.reference_documents, payload).await?;
    let stored = state.prompts.upsert(&prompt).await?;

    tracing::info!(
        phase = stored.phase_number,
        sub_phase = stored.sub_phase,
        documents = stored.document_ids.len(),
        "Stored phase prompt"
    );
    Ok(Json(stored))
}

#[utoipa::path(
    delete,
    path = "/api/phase-prompts/{phase}/{sub_phase}",
    params(
        ("phase" = i64, Path, description = "Phase number"),
        ("sub_phase" = i64, Path, description = "Sub-phase number")
    ),
    responses(
        (status = 204, description = "Prompt deleted"),
        (status = 404, description = "No prompt stored for the key")
    ),
    tag = "prompts"
)]
pub async fn delete_phase_prompt(
    State(state): State<AppState>,
    Path((phase, sub_phase)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    if state.prompts.delete(phase, sub_phase).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "No prompt found for phase {}.{}",
            phase, sub_phase
        )))
    }
}
