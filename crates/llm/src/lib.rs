//! Chat-completion and retrieval clients.
//!
//! Two OpenAI-compatible providers sit behind [`ChatClient`], selected by
//! model name. Vector search sits behind [`Retriever`]. Both are plain
//! values constructed by the caller and shared as trait objects.

mod client;
mod error;
pub mod models;
mod retrieval;
pub mod tokens;
mod types;
pub mod validation;

pub use client::{
    validate_messages, ChatClient, OpenAiCompatClient, ProviderEndpoint, DEEPSEEK_BASE_URL,
    OPENAI_BASE_URL,
};
pub use error::{LlmError, LlmResult};
pub use models::{model_config, CompletionField, ModelConfig, Provider, DEFAULT_MODEL};
pub use retrieval::{DisabledRetriever, FunctionRetriever, RetrievalOutcome, Retriever};
pub use types::*;
pub use validation::{analyze_validated, OutputValidator, RetryPolicy, ValidatedResponse};
