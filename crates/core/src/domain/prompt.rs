use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Instruction template for one phase, keyed by `(phase_number, sub_phase)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PhasePrompt {
    pub id: Uuid,
    pub phase_number: i64,
    pub sub_phase: i64,
    pub phase_name: String,
    pub prompt_text: String,
    /// Reference documents the phase reads as framework context
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhasePrompt {
    pub fn new(
        phase_number: i64,
        phase_name: impl Into<String>,
        prompt_text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phase_number,
            sub_phase: 0,
            phase_name: phase_name.into(),
            prompt_text: prompt_text.into(),
            document_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sub_phase(mut self, sub_phase: i64) -> Self {
        self.sub_phase = sub_phase;
        self
    }

    pub fn with_documents(mut self, document_ids: Vec<Uuid>) -> Self {
        self.document_ids = document_ids;
        self
    }
}

/// Payload for creating or replacing a phase prompt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct UpsertPhasePrompt {
    pub phase_number: i64,
    #[serde(default)]
    pub sub_phase: i64,
    #[serde(default)]
    pub phase_name: Option<String>,
    pub prompt_text: String,
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
    /// Reference documents named by filename, resolved at import time
    #[serde(default)]
    pub document_names: Vec<String>,
}

/// Externally authored framework text referenced from phase prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ReferenceDocument {
    pub id: Uuid,
    pub filename: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ReferenceDocument {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CreateReferenceDocument {
    pub filename: String,
    pub content: String,
}

/// Scans prompt text for markdown file names it asks the model to read.
///
/// Two shapes are recognised: a dash bullet whose remainder is a `.md` file
/// name, and any line mentioning "review" or "additionally" together with
/// one or more `.md` words. Names are returned in first-seen order without
/// duplicates.
pub fn extract_document_names(prompt_text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };

    for line in prompt_text.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        if !lower.contains(".md") {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('-') {
            let name = rest.trim();
            if name.ends_with(".md") {
                push(name);
            }
        } else if lower.contains("review") || lower.contains("additionally") {
            for part in trimmed.split(' ') {
                let part = part.trim();
                if part.to_lowercase().ends_with(".md") {
                    push(part);
                }
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builder() {
        let doc = Uuid::new_v4();
        let prompt = PhasePrompt::new(3, "Social", "Analyse")
            .with_sub_phase(2)
            .with_documents(vec![doc]);

        assert_eq!(prompt.phase_number, 3);
        assert_eq!(prompt.sub_phase, 2);
        assert_eq!(prompt.document_ids, vec![doc]);
    }

    #[test]
    fn test_extract_bullet_documents() {
        let text = "Use these:\n- esrs_e1.md\n- not a file\n  - esrs_s1.md  \n";
        assert_eq!(
            extract_document_names(text),
            vec!["esrs_e1.md".to_string(), "esrs_s1.md".to_string()]
        );
    }

    #[test]
    fn test_extract_review_line_documents() {
        let text = "Please review gri.md and sasb.md carefully.\nAdditionally consult tcfd.md";
        assert_eq!(
            extract_document_names(text),
            vec!["gri.md", "sasb.md", "tcfd.md"]
        );
    }

    #[test]
    fn test_extract_ignores_unrelated_lines() {
        let text = "The readme.md file is irrelevant here\n- gri.md\n- gri.md";
        assert_eq!(extract_document_names(text), vec!["gri.md"]);
    }
}
