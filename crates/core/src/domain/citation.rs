use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CitationReference {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
}

/// A scored text snippet returned by vector search. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Citation {
    pub content: String,
    pub score: f64,
    pub reference: CitationReference,
}

impl Citation {
    pub fn new(content: impl Into<String>, score: f64, title: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score,
            reference: CitationReference {
                kind: "document".to_string(),
                title: title.into(),
            },
        }
    }

    /// Citations with no text or no relevance carry nothing for the prompt.
    pub fn is_usable(&self) -> bool {
        !self.content.trim().is_empty() && self.score > 0.0
    }
}

/// Sorts by descending score, keeping input order among equal scores.
pub fn rank_citations(mut citations: Vec<Citation>) -> Vec<Citation> {
    citations.sort_by(|a, b| b.score.total_cmp(&a.score));
    citations
}
