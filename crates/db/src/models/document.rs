use uuid::Uuid;
use vyve_core::{Company, Document};

use super::{datetime_to_timestamp, parse_uuid, timestamp_to_datetime};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub company_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub file_path: String,
    pub size: i64,
    pub url: Option<String>,
    pub is_website: bool,
    pub should_process: bool,
    pub is_latest: bool,
    pub content: Option<String>,
    pub created_at: i64,
}

impl DocumentRow {
    pub fn into_domain(self) -> Document {
        Document {
            id: parse_uuid(&self.id),
            company_id: self.company_id.and_then(|s| Uuid::parse_str(&s).ok()),
            filename: self.filename,
            content_type: self.content_type,
            file_path: self.file_path,
            size: self.size,
            url: self.url,
            is_website: self.is_website,
            should_process: self.should_process,
            is_latest: self.is_latest,
            content: self.content,
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

impl From<&Document> for DocumentRow {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.to_string(),
            company_id: doc.company_id.map(|id| id.to_string()),
            filename: doc.filename.clone(),
            content_type: doc.content_type.clone(),
            file_path: doc.file_path.clone(),
            size: doc.size,
            url: doc.url.clone(),
            is_website: doc.is_website,
            should_process: doc.should_process,
            is_latest: doc.is_latest,
            content: doc.content.clone(),
            created_at: datetime_to_timestamp(doc.created_at),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompanyRow {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

impl CompanyRow {
    pub fn into_domain(self) -> Company {
        Company {
            id: parse_uuid(&self.id),
            name: self.name,
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

impl From<&Company> for CompanyRow {
    fn from(company: &Company) -> Self {
        Self {
            id: company.id.to_string(),
            name: company.name.clone(),
            created_at: datetime_to_timestamp(company.created_at),
        }
    }
}
