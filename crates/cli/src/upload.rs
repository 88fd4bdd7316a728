use std::path::Path;

use anyhow::{bail, Context, Result};
use events::ndjson;
use events::UploadEvent;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::multipart::{Form, Part};

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        _ => "text/plain",
    }
}

/// Posts `file` to the server and renders the NDJSON progress stream.
/// Ctrl-C drops the response body, which ends the upload on the server.
pub async fn upload(server: &str, file: &Path, company: &str, method: &str) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.txt")
        .to_string();

    let part = Part::bytes(bytes)
        .file_name(filename.clone())
        .mime_str(mime_for(file))?;
    let url = format!("{}/upload", server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .query(&[("company_name", company), ("processingMethod", method)])
        .multipart(Form::new().part("file", part))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Upload rejected ({}): {}", status, body);
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] page {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let events = ndjson::decode::<UploadEvent, _, _>(response.bytes_stream());
    let drained = ndjson::finish_upload(events, |event| {
        if let UploadEvent::Progress {
            current_page,
            total_pages,
            total_text,
            ..
        } = event
        {
            bar.set_length(*total_pages as u64);
            bar.set_position(*current_page as u64);
            bar.set_message(format!("{} chars", total_text));
        }
    });

    let outcome = tokio::select! {
        outcome = drained => outcome,
        _ = tokio::signal::ctrl_c() => {
            bar.abandon_with_message("cancelled");
            bail!("Upload of {} cancelled", filename);
        }
    };

    match outcome {
        Ok(UploadEvent::Complete {
            document_id,
            total_pages,
            total_text,
            processing_method,
            ..
        }) => {
            bar.finish_with_message("done");
            println!(
                "Stored {} as {} ({} pages, {} chars, {})",
                filename,
                document_id,
                total_pages,
                total_text,
                processing_method.as_str()
            );
            Ok(())
        }
        Ok(other) => {
            bar.abandon();
            bail!("Unexpected final event: {:?}", other)
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            Err(e).with_context(|| format!("Upload of {} failed", filename))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for(Path::new("notes.MD")), "text/markdown");
        assert_eq!(mime_for(Path::new("data.csv")), "text/csv");
        assert_eq!(mime_for(Path::new("report")), "text/plain");
    }
}
