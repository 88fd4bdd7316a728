use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use events::{Event, UploadEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use utoipa::IntoParams;
use vyve_core::{split_pages, Document, ProcessingMethod};

use crate::error::AppError;
use crate::state::AppState;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UploadQuery {
    #[serde(rename = "processingMethod")]
    pub processing_method: Option<String>,
    pub company_name: Option<String>,
}

struct UploadedFile {
    filename: String,
    content_type: String,
    bytes: Bytes,
}

/// A validated upload ready for extraction.
struct UploadJob {
    file: UploadedFile,
    text: String,
    company_name: String,
    method: ProcessingMethod,
}

fn ndjson_response(rx: mpsc::Receiver<UploadEvent>) -> Response {
    let body = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(Bytes::from(event.to_line())));
    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], Body::from_stream(body)).into_response()
}

fn single_event(event: UploadEvent) -> Response {
    let line = event.to_line();
    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], line).into_response()
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.txt").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("text/plain")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read file: {}", e)))?;
        return Ok(Some(UploadedFile {
            filename,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

fn prepare(query: UploadQuery, file: Option<UploadedFile>) -> Result<UploadJob, String> {
    let file = file.ok_or_else(|| "No file uploaded".to_string())?;
    let company_name = query
        .company_name
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| "Company name is required".to_string())?;
    let method = match query.processing_method.as_deref() {
        None | Some("") => ProcessingMethod::default(),
        Some(raw) => ProcessingMethod::parse(raw)
            .ok_or_else(|| format!("Unsupported processing method: {}", raw))?,
    };
    let text = std::str::from_utf8(&file.bytes)
        .map_err(|_| format!("{} is not a text document", file.filename))?
        .to_string();

    Ok(UploadJob {
        file,
        text,
        company_name,
        method,
    })
}

/// Streams one progress line per page, then stores the document and
/// finishes with a complete line. Stops early once the client hangs up.
async fn process(state: AppState, job: UploadJob, tx: mpsc::Sender<UploadEvent>) {
    let pages = split_pages(&job.text);
    if pages.is_empty() {
        let _ = tx
            .send(UploadEvent::error(format!(
                "No text could be extracted from {}",
                job.file.filename
            )))
            .await;
        return;
    }

    let total_pages = pages.len();
    let mut total_text = 0;
    let mut content = String::with_capacity(job.text.len());
    for (index, page) in pages.iter().enumerate() {
        let page_text = page.chars().count();
        total_text += page_text;
        if !content.is_empty() {
            content.push_str("\n\n");
        }
        content.push_str(page);

        let progress = UploadEvent::Progress {
            current_page: index + 1,
            total_pages,
            page_text,
            total_text,
        };
        if tx.send(progress).await.is_err() {
            tracing::info!(filename = %job.file.filename, "Upload cancelled by client");
            return;
        }
    }

    let stored = async {
        let company = state.companies.find_or_create(&job.company_name).await?;
        let document = Document::uploaded(
            &job.file.filename,
            &job.file.content_type,
            job.file.bytes.len() as i64,
        )
        .with_company(company.id)
        .with_content(content);
        state.documents.create(&document).await
    }
    .await;

    let event = match stored {
        Ok(document) => {
            tracing::info!(
                document = %document.id,
                filename = %document.filename,
                pages = total_pages,
                method = job.method.as_str(),
                "Document uploaded"
            );
            state.event_bus.emit(Event::DocumentUploaded {
                document_id: document.id,
                filename: document.filename.clone(),
                company: job.company_name.clone(),
            });
            UploadEvent::Complete {
                document_id: document.id,
                filename: document.filename,
                total_pages,
                total_text,
                processing_method: job.method,
            }
        }
        Err(e) => {
            tracing::error!(filename = %job.file.filename, error = %e, "Failed to store upload");
            UploadEvent::error(format!("Failed to save document: {}", e))
        }
    };
    let _ = tx.send(event).await;
}

#[utoipa::path(
    post,
    path = "/upload",
    params(UploadQuery),
    request_body(content_type = "multipart/form-data", description = "Multipart body with a `file` field"),
    responses(
        (status = 200, description = "NDJSON stream of progress, complete and error events", body = UploadEvent, content_type = "application/x-ndjson"),
        (status = 400, description = "Body is not multipart")
    ),
    tag = "documents"
)]
pub async fn upload_document(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;
    let file = read_file_field(&mut multipart).await?;

    let job = match prepare(query, file) {
        Ok(job) => job,
        Err(message) => {
            tracing::warn!(error = %message, "Rejected upload");
            return Ok(single_event(UploadEvent::error(message)));
        }
    };

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(process(state, job, tx));
    Ok(ndjson_response(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(bytes: &'static [u8]) -> Option<UploadedFile> {
        Some(UploadedFile {
            filename: "report.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: Bytes::from_static(bytes),
        })
    }

    fn query(company: Option<&str>, method: Option<&str>) -> UploadQuery {
        UploadQuery {
            processing_method: method.map(str::to_string),
            company_name: company.map(str::to_string),
        }
    }

    #[test]
    fn test_prepare_defaults_to_standard() {
        let job = prepare(query(Some(" Acme "), None), file(b"hello")).unwrap();
        assert_eq!(job.company_name, "Acme");
        assert_eq!(job.method, ProcessingMethod::Standard);
        assert_eq!(job.text, "hello");
    }

    #[test]
    fn test_prepare_rejections() {
        assert_eq!(
            prepare(query(Some("Acme"), None), None).err().as_deref(),
            Some("No file uploaded")
        );
        assert_eq!(
            prepare(query(None, None), file(b"x")).err().as_deref(),
            Some("Company name is required")
        );
        assert!(prepare(query(Some("Acme"), Some("ocr")), file(b"x")).is_err());
        assert!(prepare(query(Some("Acme"), None), file(&[0xff, 0xfe, 0x00])).is_err());
    }

    #[test]
    fn test_vision_is_accepted() {
        let job = prepare(query(Some("Acme"), Some("vision")), file(b"x")).unwrap();
        assert_eq!(job.method, ProcessingMethod::Vision);
    }
}
