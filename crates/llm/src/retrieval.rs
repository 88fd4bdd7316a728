use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use vyve_core::{rank_citations, Citation, CitationReference};

use crate::error::{LlmError, LlmResult};
use crate::models::Provider;

const DEFAULT_TOP_K: usize = 10;
const RETRIEVAL_TEMPERATURE: f32 = 0.5;

/// Citations for a query. Transport failures are reported in `error`
/// alongside an empty citation list instead of failing the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    pub citations: Vec<Citation>,
    pub error: Option<String>,
}

impl RetrievalOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            citations: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, model: &str) -> RetrievalOutcome;
}

/// Stand-in used when no retrieval backend is configured.
#[derive(Debug, Clone, Default)]
pub struct DisabledRetriever;

#[async_trait]
impl Retriever for DisabledRetriever {
    async fn retrieve(&self, _query: &str, _model: &str) -> RetrievalOutcome {
        RetrievalOutcome::failed("retrieval backend is not configured")
    }
}

#[derive(Debug, Deserialize)]
struct FunctionResponse {
    #[serde(default)]
    citations: Vec<RawCitation>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCitation {
    content: Option<String>,
    score: Option<f64>,
    reference: Option<RawReference>,
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReference {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    filename: Option<String>,
}

impl From<RawCitation> for Citation {
    fn from(raw: RawCitation) -> Self {
        let reference = raw.reference.unwrap_or_default();
        let title = reference
            .title
            .or_else(|| raw.metadata.and_then(|m| m.filename))
            .unwrap_or_else(|| "Unknown document".to_string());

        Citation {
            content: raw.content.unwrap_or_default(),
            score: raw.score.unwrap_or(0.0),
            reference: CitationReference {
                kind: reference.kind.unwrap_or_else(|| "document".to_string()),
                title,
            },
        }
    }
}

/// Vector search served by hosted functions at `<functions_url>/<provider>`.
#[derive(Clone)]
pub struct FunctionRetriever {
    client: Client,
    functions_url: String,
    anon_key: Option<String>,
    index_api_key: Option<String>,
    top_k: usize,
    initialized: std::sync::Arc<OnceCell<()>>,
}

impl FunctionRetriever {
    pub fn new(functions_url: impl Into<String>, anon_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            functions_url: functions_url.into().trim_end_matches('/').to_string(),
            anon_key,
            index_api_key: None,
            top_k: DEFAULT_TOP_K,
            initialized: std::sync::Arc::new(OnceCell::new()),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Key forwarded to the index on initialise.
    pub fn with_index_api_key(mut self, key: Option<String>) -> Self {
        self.index_api_key = key;
        self
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.client.post(url).header("Content-Type", "application/json");
        match &self.anon_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn initialize(&self) -> LlmResult<()> {
        let response = self
            .post(format!("{}/pinecone", self.functions_url))
            .json(&json!({ "action": "initialize", "apiKey": self.index_api_key }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                provider: "retrieval".to_string(),
                message: format!("Failed to initialize: {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        let body: FunctionResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(LlmError::Api {
                provider: "retrieval".to_string(),
                message: format!("Failed to initialize: {}", error),
                status_code: None,
            });
        }

        debug!("Retrieval index initialized");
        Ok(())
    }

    async fn query(&self, query: &str, model: &str) -> LlmResult<Vec<Citation>> {
        self.initialized
            .get_or_try_init(|| self.initialize())
            .await?;

        let provider = Provider::for_model(model);
        let response = self
            .post(format!("{}/{}", self.functions_url, provider.slug()))
            .json(&json!({
                "question": query,
                "model": model,
                "messages": [{ "role": "user", "content": query }],
                "temperature": RETRIEVAL_TEMPERATURE,
                "context": query,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<FunctionResponse>(&text)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or(text);
            return Err(LlmError::Api {
                provider: provider.name().to_string(),
                message,
                status_code: Some(status.as_u16()),
            });
        }

        let body: FunctionResponse = response.json().await?;
        let mut citations = rank_citations(body.citations.into_iter().map(Citation::from).collect());
        citations.truncate(self.top_k);
        Ok(citations)
    }
}

#[async_trait]
impl Retriever for FunctionRetriever {
    async fn retrieve(&self, query: &str, model: &str) -> RetrievalOutcome {
        match self.query(query, model).await {
            Ok(citations) => {
                debug!(count = citations.len(), "Retrieved citations");
                RetrievalOutcome {
                    citations,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without citations");
                RetrievalOutcome::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_initialize(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/pinecone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_citations_are_ranked_and_defaulted() {
        let server = MockServer::start().await;
        mount_initialize(&server).await;
        Mock::given(method("POST"))
            .and(path("/openai"))
            .and(body_partial_json(json!({ "question": "emissions?", "temperature": 0.5 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "content": "answer" },
                "citations": [
                    { "content": "low", "score": 0.2, "metadata": { "filename": "a.pdf" } },
                    { "content": "high", "score": 0.9, "reference": { "type": "pdf", "title": "b.pdf" } },
                    { "score": 0.5 }
                ]
            })))
            .mount(&server)
            .await;

        let retriever = FunctionRetriever::new(server.uri(), Some("anon".to_string()));
        let outcome = retriever.retrieve("emissions?", "o3-mini").await;

        assert!(outcome.error.is_none());
        let titles: Vec<_> = outcome
            .citations
            .iter()
            .map(|c| c.reference.title.as_str())
            .collect();
        assert_eq!(titles, vec!["b.pdf", "Unknown document", "a.pdf"]);
        assert_eq!(outcome.citations[0].reference.kind, "pdf");
        assert_eq!(outcome.citations[2].reference.kind, "document");

        // Initialization happens once
        retriever.retrieve("emissions?", "o3-mini").await;
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty() {
        let server = MockServer::start().await;
        mount_initialize(&server).await;
        Mock::given(method("POST"))
            .and(path("/deepseek"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "index offline" })))
            .mount(&server)
            .await;

        let outcome = FunctionRetriever::new(server.uri(), None)
            .retrieve("q", "deepseek-chat")
            .await;

        assert!(outcome.citations.is_empty());
        assert!(outcome.error.unwrap().contains("index offline"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades() {
        let outcome = FunctionRetriever::new("http://127.0.0.1:9", None)
            .retrieve("q", "gpt-4")
            .await;
        assert!(outcome.citations.is_empty());
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_top_k() {
        let server = MockServer::start().await;
        mount_initialize(&server).await;
        Mock::given(method("POST"))
            .and(path("/openai"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "citations": [
                    { "content": "a", "score": 0.1 },
                    { "content": "b", "score": 0.3 },
                    { "content": "c", "score": 0.2 }
                ]
            })))
            .mount(&server)
            .await;

        let outcome = FunctionRetriever::new(server.uri(), None)
            .with_top_k(2)
            .retrieve("q", "gpt-4")
            .await;
        let contents: Vec<_> = outcome.citations.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_index_key_forwarded_on_initialize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pinecone"))
            .and(body_partial_json(json!({ "action": "initialize", "apiKey": "pc-key" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/openai"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "citations": [] })))
            .mount(&server)
            .await;

        let retriever = FunctionRetriever::new(server.uri(), None)
            .with_index_api_key(Some("pc-key".to_string()));
        let first = retriever.retrieve("q", "gpt-4").await;
        let second = retriever.retrieve("q", "gpt-4").await;
        assert!(first.error.is_none());
        assert!(second.error.is_none());
    }

    #[tokio::test]
    async fn test_disabled_retriever_degrades() {
        let outcome = DisabledRetriever.retrieve("q", "o3-mini").await;
        assert!(outcome.citations.is_empty());
        assert!(outcome.error.is_some());
    }
}
