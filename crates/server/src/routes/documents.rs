use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use vyve_core::Document;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DocumentsQuery {
    /// Company name; unknown names yield an empty list
    pub company: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ToggleProcessResponse {
    pub id: Uuid,
    pub should_process: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshLatestResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWebsiteRequest {
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub company_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignCompanyRequest {
    pub company_name: String,
}

#[utoipa::path(
    get,
    path = "/api/documents",
    params(DocumentsQuery),
    responses(
        (status = 200, description = "Documents, newest first", body = Vec<Document>)
    ),
    tag = "documents"
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<DocumentsQuery>,
) -> Result<Json<Vec<Document>>, AppError> {
    let company = query.company.filter(|c| !c.trim().is_empty());
    let documents = match company {
        Some(name) => match state.companies.find_by_name(&name).await? {
            Some(company) => state.documents.list(Some(company.id)).await?,
            None => Vec::new(),
        },
        None => state.documents.list(None).await?,
    };
    Ok(Json(documents))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/toggle-process",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "New should_process value", body = ToggleProcessResponse),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn toggle_document_process(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ToggleProcessResponse>, AppError> {
    let should_process = state.documents.toggle_should_process(id).await?;
    tracing::debug!(document = %id, should_process, "Toggled document processing");
    Ok(Json(ToggleProcessResponse { id, should_process }))
}

#[utoipa::path(
    post,
    path = "/api/documents/refresh-latest",
    responses(
        (status = 200, description = "Website rows re-marked", body = RefreshLatestResponse)
    ),
    tag = "documents"
)]
pub async fn refresh_latest_documents(
    State(state): State<AppState>,
) -> Result<Json<RefreshLatestResponse>, AppError> {
    let updated = state.documents.refresh_latest_website_content().await?;
    Ok(Json(RefreshLatestResponse { updated }))
}

/// Stores a new scrape of a website. Earlier scrapes of the same URL stay
/// but lose their latest mark.
#[utoipa::path(
    post,
    path = "/api/documents/website",
    request_body = CreateWebsiteRequest,
    responses(
        (status = 201, description = "Website document stored", body = Document),
        (status = 400, description = "Missing url")
    ),
    tag = "documents"
)]
pub async fn create_website_document(
    State(state): State<AppState>,
    Json(payload): Json<CreateWebsiteRequest>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(AppError::Validation("Missing required field: url".to_string()));
    }

    let title = payload
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| url.to_string());
    let mut document = Document::website(url, title);
    if let Some(content) = payload.content {
        document = document.with_content(content);
    }
    if let Some(name) = payload.company_name.filter(|n| !n.trim().is_empty()) {
        let company = state.companies.find_or_create(name.trim()).await?;
        document = document.with_company(company.id);
    }

    let created = state.documents.create(&document).await?;
    state.documents.refresh_latest_website_content().await?;
    let stored = state
        .documents
        .find_by_id(created.id)
        .await?
        .ok_or(db::DbError::DocumentNotFound(created.id))?;

    tracing::info!(document = %stored.id, url = %url, "Stored website document");
    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    put,
    path = "/api/documents/{id}/company",
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = AssignCompanyRequest,
    responses(
        (status = 200, description = "Document moved to the company", body = Document),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn assign_document_company(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignCompanyRequest>,
) -> Result<Json<Document>, AppError> {
    let name = payload.company_name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(
            "Missing required field: company_name".to_string(),
        ));
    }

    let company = state.companies.find_or_create(name).await?;
    state.documents.assign_company(id, company.id).await?;
    state
        .documents
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Document not found: {}", id)))
}

#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.documents.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Document not found: {}", id)))
    }
}
