use uuid::Uuid;
use vyve_core::{PhasePrompt, ReferenceDocument};

use super::{datetime_to_timestamp, parse_uuid, timestamp_to_datetime};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PhasePromptRow {
    pub id: String,
    pub phase_number: i64,
    pub sub_phase: i64,
    pub phase_name: String,
    pub prompt_text: String,
    pub document_ids: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PhasePromptRow {
    pub fn into_domain(self) -> PhasePrompt {
        let document_ids: Vec<String> = serde_json::from_str(&self.document_ids).unwrap_or_default();
        PhasePrompt {
            id: parse_uuid(&self.id),
            phase_number: self.phase_number,
            sub_phase: self.sub_phase,
            phase_name: self.phase_name,
            prompt_text: self.prompt_text,
            document_ids: document_ids
                .iter()
                .filter_map(|id| Uuid::parse_str(id).ok())
                .collect(),
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        }
    }
}

impl From<&PhasePrompt> for PhasePromptRow {
    fn from(prompt: &PhasePrompt) -> Self {
        let ids: Vec<String> = prompt.document_ids.iter().map(Uuid::to_string).collect();
        Self {
            id: prompt.id.to_string(),
            phase_number: prompt.phase_number,
            sub_phase: prompt.sub_phase,
            phase_name: prompt.phase_name.clone(),
            prompt_text: prompt.prompt_text.clone(),
            document_ids: serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string()),
            created_at: datetime_to_timestamp(prompt.created_at),
            updated_at: datetime_to_timestamp(prompt.updated_at),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReferenceDocumentRow {
    pub id: String,
    pub filename: String,
    pub content: String,
    pub created_at: i64,
}

impl ReferenceDocumentRow {
    pub fn into_domain(self) -> ReferenceDocument {
        ReferenceDocument {
            id: parse_uuid(&self.id),
            filename: self.filename,
            content: self.content,
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

impl From<&ReferenceDocument> for ReferenceDocumentRow {
    fn from(doc: &ReferenceDocument) -> Self {
        Self {
            id: doc.id.to_string(),
            filename: doc.filename.clone(),
            content: doc.content.clone(),
            created_at: datetime_to_timestamp(doc.created_at),
        }
    }
}
