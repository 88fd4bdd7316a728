use vyve_core::{AnalysisMetadata, AnalysisResult};

use super::{datetime_to_timestamp, parse_uuid, timestamp_to_datetime};
use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisResultRow {
    pub id: String,
    pub phase_number: i64,
    pub sub_phase: i64,
    pub content: String,
    pub metadata: String,
    pub status: String,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AnalysisResultRow {
    pub fn into_domain(self) -> Result<AnalysisResult, DbError> {
        let metadata: AnalysisMetadata = serde_json::from_str(&self.metadata)?;
        Ok(AnalysisResult {
            id: parse_uuid(&self.id),
            phase_number: self.phase_number,
            sub_phase: self.sub_phase,
            content: self.content,
            metadata,
            version: self.version,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }

    pub fn try_from_domain(result: &AnalysisResult) -> Result<Self, DbError> {
        Ok(Self {
            id: result.id.to_string(),
            phase_number: result.phase_number,
            sub_phase: result.sub_phase,
            content: result.content.clone(),
            metadata: serde_json::to_string(&result.metadata)?,
            status: result.metadata.status.as_str().to_string(),
            version: result.version,
            created_at: datetime_to_timestamp(result.created_at),
            updated_at: datetime_to_timestamp(result.updated_at),
        })
    }
}
