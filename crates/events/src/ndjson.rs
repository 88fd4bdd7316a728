//! Newline-delimited JSON streaming for document uploads.
//!
//! The server writes one [`UploadEvent`] per line while it extracts pages.
//! Clients read the body back with [`decode`], which yields parsed values
//! lazily as bytes arrive and ends when the body ends.

use std::pin::pin;

use bytes::Bytes;
use futures::{future, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use utoipa::ToSchema;
use uuid::Uuid;
use vyve_core::ProcessingMethod;

/// Longest accepted line. Page text is reported as counts, so lines stay small.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// One page extracted. Text sizes are character counts.
    Progress {
        #[serde(rename = "currentPage")]
        current_page: usize,
        #[serde(rename = "totalPages")]
        total_pages: usize,
        #[serde(rename = "pageText")]
        page_text: usize,
        #[serde(rename = "totalText")]
        total_text: usize,
    },
    Complete {
        document_id: Uuid,
        filename: String,
        #[serde(rename = "totalPages")]
        total_pages: usize,
        #[serde(rename = "totalText")]
        total_text: usize,
        #[serde(rename = "processingMethod")]
        processing_method: ProcessingMethod,
    },
    /// Terminal; nothing follows it.
    Error { error: String },
}

impl UploadEvent {
    pub fn error(message: impl Into<String>) -> Self {
        UploadEvent::Error {
            error: message.into(),
        }
    }

    /// Serialized form including the trailing newline.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","error":"{}"}}"#, e));
        line.push('\n');
        line
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadEvent::Progress { .. })
    }
}

#[derive(Debug, Error)]
pub enum NdjsonError {
    #[error("Failed to read line: {0}")]
    Lines(#[from] LinesCodecError),

    #[error("Invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Stream ended without a complete event")]
    Incomplete,
}

/// Decodes a byte stream into a lazy stream of JSON values, one per line.
///
/// Blank lines are skipped and a final line without a newline is still
/// decoded. The stream is finite: it ends when `bytes` ends. A read error
/// is yielded as an item; the caller decides whether to keep polling.
pub fn decode<T, S, E>(bytes: S) -> impl Stream<Item = Result<T, NdjsonError>>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let reader = StreamReader::new(bytes.map(|chunk| chunk.map_err(std::io::Error::other)));

    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
        .enumerate()
        .filter_map(|(index, line)| future::ready(parse_line(index + 1, line)))
}

fn parse_line<T: DeserializeOwned>(
    number: usize,
    line: Result<String, LinesCodecError>,
) -> Option<Result<T, NdjsonError>> {
    let line = match line {
        Ok(line) => line,
        Err(e) => return Some(Err(e.into())),
    };

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(
        serde_json::from_str(trimmed).map_err(|source| NdjsonError::Json {
            line: number,
            source,
        }),
    )
}

/// Drains upload events, reporting progress, and returns the `complete`
/// event. An `error` event or a decode failure stops the drain.
pub async fn finish_upload<S, F>(events: S, mut on_progress: F) -> Result<UploadEvent, NdjsonError>
where
    S: Stream<Item = Result<UploadEvent, NdjsonError>>,
    F: FnMut(&UploadEvent),
{
    let mut events = pin!(events);
    let mut complete = None;

    while let Some(event) = events.next().await {
        match event? {
            progress @ UploadEvent::Progress { .. } => on_progress(&progress),
            UploadEvent::Error { error } => return Err(NdjsonError::Upload(error)),
            done @ UploadEvent::Complete { .. } => complete = Some(done),
        }
    }

    complete.ok_or(NdjsonError::Incomplete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    fn chunks<P: AsRef<str>>(parts: &[P]) -> impl Stream<Item = Result<Bytes, Infallible>> {
        let parts: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_ref().as_bytes())))
            .collect();
        stream::iter(parts)
    }

    fn progress(current_page: usize) -> UploadEvent {
        UploadEvent::Progress {
            current_page,
            total_pages: 2,
            page_text: 10,
            total_text: 10 * current_page,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json: serde_json::Value = serde_json::from_str(progress(1).to_line().trim()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["currentPage"], 1);
        assert_eq!(json["totalPages"], 2);

        let complete = UploadEvent::Complete {
            document_id: Uuid::nil(),
            filename: "report.txt".to_string(),
            total_pages: 2,
            total_text: 20,
            processing_method: ProcessingMethod::Vision,
        };
        let json: serde_json::Value = serde_json::to_value(&complete).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["processingMethod"], "vision");
        assert!(json.get("document_id").is_some());
    }

    #[tokio::test]
    async fn test_decode_lines_split_across_chunks() {
        let line1 = progress(1).to_line();
        let (head, tail) = line1.split_at(7);
        let parts = [head.to_string(), tail.to_string(), "\n  \n".to_string(), progress(2).to_line()];

        let decoded: Vec<UploadEvent> = decode(chunks(&parts))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(decoded, vec![progress(1), progress(2)]);
    }

    #[tokio::test]
    async fn test_decode_trailing_line_without_newline() {
        let decoded: Vec<serde_json::Value> = decode(chunks(&["{\"a\":1}\n{\"b\":2}"]))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1]["b"], 2);
    }

    #[tokio::test]
    async fn test_decode_reports_line_number() {
        let results: Vec<Result<serde_json::Value, NdjsonError>> =
            decode(chunks(&["{}\n", "not json\n"])).collect().await;

        assert!(results[0].is_ok());
        match &results[1] {
            Err(NdjsonError::Json { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected json error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_finish_upload_collects_progress() {
        let complete = UploadEvent::Complete {
            document_id: Uuid::new_v4(),
            filename: "a.md".to_string(),
            total_pages: 2,
            total_text: 20,
            processing_method: ProcessingMethod::Standard,
        };
        let events = stream::iter(vec![Ok(progress(1)), Ok(progress(2)), Ok(complete.clone())]);

        let mut seen = 0;
        let result = finish_upload(events, |_| seen += 1).await.unwrap();

        assert_eq!(seen, 2);
        assert_eq!(result, complete);
    }

    #[tokio::test]
    async fn test_finish_upload_error_event() {
        let events = stream::iter(vec![Ok(progress(1)), Ok(UploadEvent::error("bad file"))]);
        let err = finish_upload(events, |_| {}).await.unwrap_err();
        assert!(matches!(err, NdjsonError::Upload(msg) if msg == "bad file"));
    }

    #[tokio::test]
    async fn test_finish_upload_without_complete() {
        let events = stream::iter(vec![Ok(progress(1))]);
        let err = finish_upload(events, |_| {}).await.unwrap_err();
        assert!(matches!(err, NdjsonError::Incomplete));
    }
}
