use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Rejected locally before any request was sent
    #[error("Invalid chat request: {0}")]
    Validation(String),

    #[error("{provider} client is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("{provider} API error: {message}")]
    Api {
        provider: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("{provider} rate limited, retry after {retry_after:?}s")]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("Empty response from model {0}")]
    EmptyResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Api {
                status_code: Some(code),
                ..
            } => *code >= 500,
            _ => false,
        }
    }
}

pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let server = LlmError::Api {
            provider: "OpenAI".to_string(),
            message: "boom".to_string(),
            status_code: Some(503),
        };
        let client = LlmError::Api {
            provider: "OpenAI".to_string(),
            message: "bad".to_string(),
            status_code: Some(400),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!LlmError::Validation("x".to_string()).is_retryable());
    }
}
