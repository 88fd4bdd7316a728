use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use events::UploadEvent;
use llm::{DisabledRetriever, OpenAiCompatClient, ProviderEndpoint};
use orchestrator::ExecutorConfig;
use serde_json::{json, Value};
use server::{create_router, state::AppState};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANALYSIS_TEXT: &str = "Verification score: 87. Emissions disclosures and governance \
reporting are covered in detail.\n• Scope one emissions fell sharply\n\
• Board oversight is documented";

async fn setup_test_server() -> (TestServer, TempDir, MockServer) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = db::create_pool(&db_url).await.expect("Failed to create pool");
    db::run_migrations(&pool).await.expect("Failed to run migrations");

    let mock_llm = MockServer::start().await;
    let chat = OpenAiCompatClient::new(
        ProviderEndpoint::new(mock_llm.uri(), Some("sk-test".to_string())),
        ProviderEndpoint::new(
            format!("{}/deepseek", mock_llm.uri()),
            Some("ds-test".to_string()),
        ),
    )
    .with_backoff(0, 1, 1);

    let state = AppState::new(
        pool,
        Arc::new(chat),
        Arc::new(DisabledRetriever),
        ExecutorConfig::default(),
    );
    let app = create_router(state);

    let server = TestServer::new(app).expect("Failed to create test server");

    (server, temp_dir, mock_llm)
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "model": "o3-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 40, "completion_tokens": 20, "total_tokens": 60 }
    })
}

async fn mock_completions(mock: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .mount(mock)
        .await;
}

async fn seed_phase_zero(server: &TestServer) {
    server
        .post("/api/reference-documents")
        .json(&json!({
            "filename": "framework.md",
            "content": "Emissions disclosures framework. Report governance and board oversight."
        }))
        .await
        .assert_status(StatusCode::CREATED);

    server
        .put("/api/phase-prompts")
        .json(&json!({
            "phase_number": 0,
            "prompt_text": "Summarise the emissions disclosures.",
            "document_names": ["framework.md"]
        }))
        .await
        .assert_status_ok();
}

fn upload_form(contents: &'static [u8]) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(contents.to_vec())
            .file_name("report.txt")
            .mime_type("text/plain"),
    )
}

fn upload_events(body: &str) -> Vec<UploadEvent> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("Invalid NDJSON line"))
        .collect()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server.get("/api/openapi.json").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["info"]["title"], "Vyve API");
        assert!(body["paths"]["/api/vyve/adjust-analysis"].is_object());
    }
}

mod phase_prompts {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_get_prompt() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .put("/api/phase-prompts")
            .json(&json!({ "phase_number": 2, "prompt_text": "Assess the targets." }))
            .await;
        response.assert_status_ok();
        let created: Value = response.json();
        assert_eq!(created["phase_number"], 2);

        let response = server.get("/api/phase-prompts/2/0").await;
        response.assert_status_ok();
        let fetched: Value = response.json();
        assert_eq!(fetched["prompt_text"], "Assess the targets.");
        assert_eq!(fetched["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_prompt() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        for text in ["First draft.", "Second draft."] {
            server
                .put("/api/phase-prompts")
                .json(&json!({ "phase_number": 1, "prompt_text": text }))
                .await
                .assert_status_ok();
        }

        let prompts: Vec<Value> = server.get("/api/phase-prompts").await.json();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0]["prompt_text"], "Second draft.");
    }

    #[tokio::test]
    async fn test_prompt_links_reference_documents_named_in_text() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let document: Value = server
            .post("/api/reference-documents")
            .json(&json!({ "filename": "gri.md", "content": "GRI standards" }))
            .await
            .json();

        let prompt: Value = server
            .put("/api/phase-prompts")
            .json(&json!({
                "phase_number": 0,
                "prompt_text": "Please review gri.md before answering."
            }))
            .await
            .json();

        assert_eq!(prompt["document_ids"], json!([document["id"]]));
    }

    #[tokio::test]
    async fn test_empty_prompt_text_is_rejected() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .put("/api/phase-prompts")
            .json(&json!({ "phase_number": 0, "prompt_text": "  " }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_delete_prompt() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        server
            .put("/api/phase-prompts")
            .json(&json!({ "phase_number": 3, "prompt_text": "Review risks." }))
            .await
            .assert_status_ok();

        server
            .delete("/api/phase-prompts/3/0")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get("/api/phase-prompts/3/0")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .delete("/api/phase-prompts/3/0")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

mod reference_documents {
    use super::*;

    #[tokio::test]
    async fn test_create_and_list() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        server
            .post("/api/reference-documents")
            .json(&json!({ "filename": "tcfd.md", "content": "Climate disclosures" }))
            .await
            .assert_status(StatusCode::CREATED);

        let documents: Vec<Value> = server.get("/api/reference-documents").await.json();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["filename"], "tcfd.md");
    }

    #[tokio::test]
    async fn test_missing_content_is_rejected() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .post("/api/reference-documents")
            .json(&json!({ "filename": "tcfd.md", "content": "" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

mod phases {
    use super::*;

    #[tokio::test]
    async fn test_list_phases_has_catalog() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server.get("/api/phases").await;

        response.assert_status_ok();
        let phases: Vec<Value> = response.json();
        assert!(!phases.is_empty());
        assert_eq!(phases[0]["phase_number"], 0);
        assert_eq!(phases[0]["running"], false);
    }

    #[tokio::test]
    async fn test_run_without_prompt_is_not_found() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server.post("/api/phases/0/run").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_before_previous_phase_completes_is_rejected() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        server
            .put("/api/phase-prompts")
            .json(&json!({ "phase_number": 1, "prompt_text": "Assess materiality." }))
            .await
            .assert_status_ok();

        let response = server.post("/api/phases/1/run").await;

        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "PRECONDITION_FAILED");

        server
            .get("/api/analysis-results/1")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_phase_zero_stores_completed_result() {
        let (server, _temp_dir, mock) = setup_test_server().await;
        mock_completions(&mock, ANALYSIS_TEXT).await;
        seed_phase_zero(&server).await;

        let response = server
            .post("/api/phases/0/run")
            .add_query_param("model", "o3-mini")
            .await;
        response.assert_status(StatusCode::ACCEPTED);
        let accepted: Value = response.json();
        assert_eq!(accepted["status"], "accepted");
        assert_eq!(accepted["model"], "o3-mini");

        let mut result = Value::Null;
        for _ in 0..200 {
            let response = server.get("/api/analysis-results/0").await;
            if response.status_code() == StatusCode::OK {
                result = response.json();
                let status = &result["metadata"]["status"];
                if status == "completed" || status == "error" {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(result["metadata"]["status"], "completed");
        assert_eq!(result["metadata"]["verification_score"], 87);
        assert!(result["content"]
            .as_str()
            .unwrap()
            .contains("Board oversight"));
        let log = result["metadata"]["conversation_log"].as_array().unwrap();
        assert!(log
            .iter()
            .all(|step| step["status"] == "completed" || step["status"] == "in_progress"));
    }
}

mod analysis_results {
    use super::*;

    #[tokio::test]
    async fn test_missing_result_is_not_found() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server.get("/api/analysis-results/4").await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_clear_empty_results() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server.delete("/api/analysis-results").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["deleted"], 0);

        let results: Vec<Value> = server.get("/api/analysis-results").await.json();
        assert!(results.is_empty());
    }
}

mod adjust {
    use super::*;

    fn adjust_body(original: &str) -> Value {
        json!({
            "model": "gpt-4o",
            "system_prompt": "You revise sustainability analyses.",
            "context": {
                "original_content": original,
                "key_findings": ["Emissions fell"],
                "phase_name": "Baseline",
                "user_adjustment": "Make it shorter."
            }
        })
    }

    #[tokio::test]
    async fn test_missing_field_returns_validation_error() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .post("/api/vyve/adjust-analysis")
            .json(&json!({ "model": "gpt-4o" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "VALIDATION_ERROR");
        assert_eq!(body["message"], "Missing required field: system_prompt");
        assert_eq!(body["requestId"].as_str().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_malformed_body_returns_validation_error() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .post("/api/vyve/adjust-analysis")
            .content_type("application/json")
            .text("{not json")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "VALIDATION_ERROR");
        assert!(body["requestId"].is_string());
    }

    #[tokio::test]
    async fn test_adjust_returns_revision() {
        let (server, _temp_dir, mock) = setup_test_server().await;
        mock_completions(&mock, "• Emissions fell 12%\n• Targets were met").await;

        let response = server
            .post("/api/vyve/adjust-analysis")
            .json(&adjust_body("Emissions fell across all sites."))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["content"].as_str().unwrap().contains("Emissions"));
        assert_eq!(body["key_findings"].as_array().unwrap().len(), 2);
        assert!(body["validation"]["warnings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_content_is_truncated_with_warning() {
        let (server, _temp_dir, mock) = setup_test_server().await;
        mock_completions(&mock, "• Condensed revision").await;

        let original = "emissions ".repeat(60_000);
        let response = server
            .post("/api/vyve/adjust-analysis")
            .json(&adjust_body(&original))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        let validation = &body["validation"];
        assert_eq!(validation["warnings"].as_array().unwrap().len(), 1);
        let modification = &validation["contentModifications"][0];
        assert_eq!(modification["type"], "truncation");
        assert!(
            modification["truncatedLength"].as_u64().unwrap()
                < modification["originalLength"].as_u64().unwrap()
        );
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_api_error() {
        let (server, _temp_dir, mock) = setup_test_server().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "model overloaded", "type": "invalid_request_error" }
            })))
            .mount(&mock)
            .await;

        let response = server
            .post("/api/vyve/adjust-analysis")
            .json(&adjust_body("Emissions fell."))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], "OPENAI_API_ERROR");
        assert!(body["requestId"].is_string());
    }
}

mod upload {
    use super::*;

    #[tokio::test]
    async fn test_upload_streams_progress_then_complete() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .post("/upload")
            .add_query_param("company_name", "Acme")
            .multipart(upload_form(b"First page text\x0cSecond page text"))
            .await;

        response.assert_status_ok();
        let events = upload_events(&response.text());
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            UploadEvent::Progress {
                current_page: 1,
                total_pages: 2,
                ..
            }
        ));
        let document_id = match &events[2] {
            UploadEvent::Complete {
                document_id,
                total_pages,
                ..
            } => {
                assert_eq!(*total_pages, 2);
                *document_id
            }
            other => panic!("Expected complete event, got {:?}", other),
        };

        let documents: Vec<Value> = server
            .get("/api/documents")
            .add_query_param("company", "Acme")
            .await
            .json();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["id"], json!(document_id));
        assert_eq!(documents[0]["filename"], "report.txt");
    }

    #[tokio::test]
    async fn test_upload_without_company_reports_error_event() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .post("/upload")
            .multipart(upload_form(b"Some text"))
            .await;

        response.assert_status_ok();
        let events = upload_events(&response.text());
        assert_eq!(
            events,
            vec![UploadEvent::error("Company name is required")]
        );

        let documents: Vec<Value> = server.get("/api/documents").await.json();
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_upload_unsupported_method_reports_error_event() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .post("/upload")
            .add_query_param("company_name", "Acme")
            .add_query_param("processingMethod", "ocr")
            .multipart(upload_form(b"Some text"))
            .await;

        let events = upload_events(&response.text());
        assert!(matches!(&events[..], [UploadEvent::Error { .. }]));
    }
}

mod documents {
    use super::*;

    #[tokio::test]
    async fn test_rescrape_moves_latest_flag() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let first: Value = server
            .post("/api/documents/website")
            .json(&json!({ "url": "https://acme.example", "content": "v1" }))
            .await
            .json();
        let response = server
            .post("/api/documents/website")
            .json(&json!({ "url": "https://acme.example", "content": "v2" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let second: Value = response.json();
        assert_eq!(second["is_latest"], true);

        let documents: Vec<Value> = server.get("/api/documents").await.json();
        let latest: Vec<&Value> = documents
            .iter()
            .filter(|d| d["is_latest"] == true)
            .collect();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0]["id"], second["id"]);
        assert!(documents
            .iter()
            .any(|d| d["id"] == first["id"] && d["is_latest"] == false));
    }

    #[tokio::test]
    async fn test_toggle_process() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let document: Value = server
            .post("/api/documents/website")
            .json(&json!({ "url": "https://acme.example" }))
            .await
            .json();
        let id = document["id"].as_str().unwrap();
        let initial = document["should_process"].as_bool().unwrap();

        let response = server
            .post(&format!("/api/documents/{}/toggle-process", id))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["should_process"], !initial);
    }

    #[tokio::test]
    async fn test_toggle_unknown_document_is_not_found() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let response = server
            .post(&format!(
                "/api/documents/{}/toggle-process",
                uuid::Uuid::new_v4()
            ))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_assign_company_and_delete() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let document: Value = server
            .post("/api/documents/website")
            .json(&json!({ "url": "https://acme.example" }))
            .await
            .json();
        let id = document["id"].as_str().unwrap();

        server
            .put(&format!("/api/documents/{}/company", id))
            .json(&json!({ "company_name": "Globex" }))
            .await
            .assert_status_ok();
        let documents: Vec<Value> = server
            .get("/api/documents")
            .add_query_param("company", "Globex")
            .await
            .json();
        assert_eq!(documents.len(), 1);

        server
            .delete(&format!("/api/documents/{}", id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let documents: Vec<Value> = server.get("/api/documents").await.json();
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_company_filter_is_empty() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        let documents: Vec<Value> = server
            .get("/api/documents")
            .add_query_param("company", "Nobody")
            .await
            .json();

        assert!(documents.is_empty());
    }
}

mod companies {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_company_conflicts() {
        let (server, _temp_dir, _mock) = setup_test_server().await;

        server
            .post("/api/companies")
            .json(&json!({ "name": "Acme" }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post("/api/companies")
            .json(&json!({ "name": "Acme" }))
            .await;

        response.assert_status(StatusCode::CONFLICT);
        let companies: Vec<Value> = server.get("/api/companies").await.json();
        assert_eq!(companies.len(), 1);
    }
}
