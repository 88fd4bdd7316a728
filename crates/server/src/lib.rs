pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use config::AppConfig;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vyve API",
        version = "0.1.0",
        description = "Phase-based document analysis: prompts, runs, results and uploads"
    ),
    paths(
        routes::health_check,
        routes::list_phase_prompts,
        routes::get_phase_prompt,
        routes::upsert_phase_prompt,
        routes::delete_phase_prompt,
        routes::list_reference_documents,
        routes::create_reference_document,
        routes::list_phases,
        routes::run_phase,
        routes::list_analysis_results,
        routes::get_analysis_result,
        routes::clear_analysis_results,
        routes::adjust_analysis,
        routes::list_documents,
        routes::toggle_document_process,
        routes::refresh_latest_documents,
        routes::create_website_document,
        routes::assign_document_company,
        routes::delete_document,
        routes::list_companies,
        routes::create_company,
        routes::upload::upload_document,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::RunPhaseResponse,
        routes::ClearResultsResponse,
        routes::ToggleProcessResponse,
        routes::RefreshLatestResponse,
        routes::CreateWebsiteRequest,
        routes::AssignCompanyRequest,
        routes::CreateCompanyRequest,
        error::ErrorResponse,
        orchestrator::PhaseStatus,
        orchestrator::AdjustRequest,
        orchestrator::AdjustResponse,
        orchestrator::adjust::AdjustContext,
        orchestrator::adjust::AdjustValidation,
        orchestrator::adjust::ContentModification,
        orchestrator::adjust::AdjustMetrics,
        vyve_core::PhasePrompt,
        vyve_core::UpsertPhasePrompt,
        vyve_core::ReferenceDocument,
        vyve_core::CreateReferenceDocument,
        vyve_core::AnalysisResult,
        vyve_core::AnalysisMetadata,
        vyve_core::AnalysisStatus,
        vyve_core::StepLog,
        vyve_core::StepStatus,
        vyve_core::TokenUsage,
        vyve_core::AdjustmentRecord,
        vyve_core::PhaseCategory,
        vyve_core::Document,
        vyve_core::Company,
        vyve_core::ProcessingMethod,
        events::EventEnvelope,
        events::Event,
        events::UploadEvent,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "prompts", description = "Phase prompts and reference documents"),
        (name = "phases", description = "Phase catalog and runs"),
        (name = "results", description = "Stored analysis results"),
        (name = "adjust", description = "User-requested analysis revisions"),
        (name = "documents", description = "Uploaded documents, websites and companies"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let app_dir = state.app_dir.clone();

    let api_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/api/phase-prompts",
            get(routes::list_phase_prompts).put(routes::upsert_phase_prompt),
        )
        .route(
            "/api/phase-prompts/{phase}/{sub_phase}",
            get(routes::get_phase_prompt).delete(routes::delete_phase_prompt),
        )
        .route(
            "/api/reference-documents",
            get(routes::list_reference_documents).post(routes::create_reference_document),
        )
        .route("/api/phases", get(routes::list_phases))
        .route("/api/phases/{phase}/run", post(routes::run_phase))
        .route(
            "/api/analysis-results",
            get(routes::list_analysis_results).delete(routes::clear_analysis_results),
        )
        .route(
            "/api/analysis-results/{phase}",
            get(routes::get_analysis_result),
        )
        .route("/api/vyve/adjust-analysis", post(routes::adjust_analysis))
        .route("/api/documents", get(routes::list_documents))
        .route(
            "/api/documents/refresh-latest",
            post(routes::refresh_latest_documents),
        )
        .route(
            "/api/documents/website",
            post(routes::create_website_document),
        )
        .route(
            "/api/documents/{id}",
            axum::routing::delete(routes::delete_document),
        )
        .route(
            "/api/documents/{id}/toggle-process",
            post(routes::toggle_document_process),
        )
        .route(
            "/api/documents/{id}/company",
            put(routes::assign_document_company),
        )
        .route(
            "/api/companies",
            get(routes::list_companies).post(routes::create_company),
        )
        .route(
            "/upload",
            post(routes::upload::upload_document)
                .layer(DefaultBodyLimit::max(routes::upload::MAX_UPLOAD_BYTES)),
        )
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    if let Some(app_dir) = app_dir {
        let index_file = app_dir.join("index.html");
        let serve_dir = ServeDir::new(&app_dir).not_found_service(ServeFile::new(&index_file));
        api_router.fallback_service(serve_dir)
    } else {
        api_router
    }
}
