use std::path::Path;

use anyhow::{Context, Result};
use db::{PhasePromptRepository, ReferenceDocumentRepository};
use serde::Deserialize;
use server::config::AppConfig;
use server::routes::{resolve_prompt, validate_upsert};
use server::state::AppState;
use vyve_core::{CreateReferenceDocument, ReferenceDocument, UpsertPhasePrompt};

/// Either a bare array of prompts or an object that also carries the
/// reference documents the prompts name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PromptFile {
    Prompts(Vec<UpsertPhasePrompt>),
    Bundle {
        #[serde(default)]
        prompts: Vec<UpsertPhasePrompt>,
        #[serde(default)]
        reference_documents: Vec<CreateReferenceDocument>,
    },
}

impl PromptFile {
    fn into_parts(self) -> (Vec<UpsertPhasePrompt>, Vec<CreateReferenceDocument>) {
        match self {
            PromptFile::Prompts(prompts) => (prompts, Vec::new()),
            PromptFile::Bundle {
                prompts,
                reference_documents,
            } => (prompts, reference_documents),
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub documents: usize,
    pub prompts: usize,
    pub skipped: Vec<String>,
}

/// Stores documents first so prompts can resolve them by filename.
pub async fn import_into(
    prompts: &PhasePromptRepository,
    documents: &ReferenceDocumentRepository,
    file: PromptFile,
) -> Result<ImportSummary> {
    let (entries, reference_documents) = file.into_parts();
    let mut summary = ImportSummary::default();

    for doc in reference_documents {
        if doc.filename.trim().is_empty() {
            summary.skipped.push("reference document without filename".to_string());
            continue;
        }
        documents
            .upsert(&ReferenceDocument::new(doc.filename.trim(), doc.content))
            .await?;
        summary.documents += 1;
    }

    for entry in entries {
        let label = format!("phase {}.{}", entry.phase_number, entry.sub_phase);
        if let Err(reason) = validate_upsert(&entry) {
            tracing::warn!(prompt = %label, reason = %reason, "Skipping prompt");
            summary.skipped.push(format!("{}: {}", label, reason));
            continue;
        }
        let prompt = resolve_prompt(documents, entry).await?;
        tracing::debug!(
            prompt = %label,
            documents = prompt.document_ids.len(),
            "Importing prompt"
        );
        prompts.upsert(&prompt).await?;
        summary.prompts += 1;
    }

    Ok(summary)
}

pub async fn import_prompts(config: &AppConfig, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: PromptFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid prompt file {}", path.display()))?;

    let state = AppState::from_config(config).await?;
    let summary = import_into(&state.prompts, &state.reference_documents, file).await?;

    println!(
        "Imported {} prompts and {} reference documents",
        summary.prompts, summary.documents
    );
    for skipped in &summary.skipped {
        println!("  skipped {}", skipped);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repos() -> (PhasePromptRepository, ReferenceDocumentRepository) {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        (
            PhasePromptRepository::new(pool.clone()),
            ReferenceDocumentRepository::new(pool),
        )
    }

    #[test]
    fn test_parses_bare_array() {
        let file: PromptFile =
            serde_json::from_str(r#"[{"phase_number": 0, "prompt_text": "Go"}]"#).unwrap();
        let (prompts, documents) = file.into_parts();
        assert_eq!(prompts.len(), 1);
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_bundle_links_documents_by_name() {
        let (prompts, documents) = repos().await;
        let file: PromptFile = serde_json::from_str(
            r#"{
                "reference_documents": [{"filename": "csrd.md", "content": "CSRD text"}],
                "prompts": [
                    {"phase_number": 0, "prompt_text": "Additionally read csrd.md"},
                    {"phase_number": 1, "prompt_text": ""}
                ]
            }"#,
        )
        .unwrap();

        let summary = import_into(&prompts, &documents, file).await.unwrap();

        assert_eq!(summary.documents, 1);
        assert_eq!(summary.prompts, 1);
        assert_eq!(summary.skipped.len(), 1);
        let stored = prompts.find(0, 0).await.unwrap().unwrap();
        let doc = &documents.list().await.unwrap()[0];
        assert_eq!(stored.document_ids, vec![doc.id]);
    }

    #[tokio::test]
    async fn test_reimport_replaces_prompt() {
        let (prompts, documents) = repos().await;
        for text in ["First", "Second"] {
            let file = PromptFile::Prompts(vec![UpsertPhasePrompt {
                phase_number: 2,
                sub_phase: 0,
                phase_name: None,
                prompt_text: text.to_string(),
                document_ids: Vec::new(),
                document_names: Vec::new(),
            }]);
            import_into(&prompts, &documents, file).await.unwrap();
        }

        let all = prompts.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].prompt_text, "Second");
    }
}
