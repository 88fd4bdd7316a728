use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;
use vyve_core::Company;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCompanyRequest {
    pub name: String,
}

#[utoipa::path(
    get,
    path = "/api/companies",
    responses(
        (status = 200, description = "Companies ordered by name", body = Vec<Company>)
    ),
    tag = "documents"
)]
pub async fn list_companies(
    State(state): State<AppState>,
) -> Result<Json<Vec<Company>>, AppError> {
    Ok(Json(state.companies.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Company created", body = Company),
        (status = 400, description = "Missing name"),
        (status = 409, description = "A company with the name exists")
    ),
    tag = "documents"
)]
pub async fn create_company(
    State(state): State<AppState>,
    Json(payload): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<Company>), AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Missing required field: name".to_string()));
    }

    let company = state.companies.create(&Company::new(name)).await?;
    tracing::info!(company = %company.name, "Created company");
    Ok((StatusCode::CREATED, Json(company)))
}
