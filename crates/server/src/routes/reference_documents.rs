use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use vyve_core::{CreateReferenceDocument, ReferenceDocument};

use crate::error::AppError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/reference-documents",
    responses(
        (status = 200, description = "Reference documents ordered by filename", body = Vec<ReferenceDocument>)
    ),
    tag = "prompts"
)]
pub async fn list_reference_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReferenceDocument>>, AppError> {
    Ok(Json(state.reference_documents.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/reference-documents",
    request_body = CreateReferenceDocument,
    responses(
        (status = 201, description = "Reference document stored (replaces one with the same filename)", body = ReferenceDocument),
        (status = 400, description = "Missing filename or content")
    ),
    tag = "prompts"
)]
pub async fn create_reference_document(
    State(state): State<AppState>,
    Json(payload): Json<CreateReferenceDocument>,
) -> Result<(StatusCode, Json<ReferenceDocument>), AppError> {
    if payload.filename.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing required field: filename".to_string(),
        ));
    }
    if payload.content.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing required field: content".to_string(),
        ));
    }

    let doc = ReferenceDocument::new(payload.filename.trim(), payload.content);
    let stored = state.reference_documents.upsert(&doc).await?;
    tracing::info!(filename = %stored.filename, id = %stored.id, "Stored reference document");

    Ok((StatusCode::CREATED, Json(stored)))
}
