use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// How an uploaded file is turned into text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    #[default]
    Standard,
    Vision,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Vision => "vision",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "vision" => Some(Self::Vision),
            _ => None,
        }
    }
}

/// An uploaded file or scraped website owned by a company.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Document {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub filename: String,
    pub content_type: String,
    pub file_path: String,
    pub size: i64,
    pub url: Option<String>,
    pub is_website: bool,
    pub should_process: bool,
    /// Only the newest scrape of a URL is marked latest
    pub is_latest: bool,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn uploaded(filename: impl Into<String>, content_type: impl Into<String>, size: i64) -> Self {
        let filename = filename.into();
        Self {
            id: Uuid::new_v4(),
            company_id: None,
            file_path: format!("uploads/{}", filename),
            filename,
            content_type: content_type.into(),
            size,
            url: None,
            is_website: false,
            should_process: true,
            is_latest: true,
            content: None,
            created_at: Utc::now(),
        }
    }

    pub fn website(url: impl Into<String>, title: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: Uuid::new_v4(),
            company_id: None,
            filename: title.into(),
            content_type: "text/html".to_string(),
            file_path: url.clone(),
            size: 0,
            url: Some(url),
            is_website: true,
            should_process: true,
            is_latest: true,
            content: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_company(mut self, company_id: Uuid) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if self.size == 0 {
            self.size = content.len() as i64;
        }
        self.content = Some(content);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Characters per page when the text carries no form feeds.
pub const PAGE_CHARS: usize = 3000;

/// Splits extracted text into pages: on form feeds when present, otherwise
/// into fixed runs of [`PAGE_CHARS`] characters. Blank pages are dropped.
pub fn split_pages(text: &str) -> Vec<String> {
    if text.contains('\u{c}') {
        return text
            .split('\u{c}')
            .filter(|page| !page.trim().is_empty())
            .map(str::to_string)
            .collect();
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(PAGE_CHARS)
        .map(|chunk| chunk.iter().collect::<String>())
        .filter(|page| !page.trim().is_empty())
        .collect()
}
