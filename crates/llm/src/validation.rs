//! Heuristic output validation and the bounded retry policy built on it.
//!
//! A completion is checked against the keywords of its system context. When
//! it falls short, the request is re-issued with a lower temperature and a
//! larger completion budget, up to [`RetryPolicy::max_attempts`] calls.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, info, warn};
use vyve_core::TokenUsage;

use crate::client::ChatClient;
use crate::error::LlmResult;
use crate::models::model_config;
use crate::types::{ChatRequest, ChatResponse};

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];
const KEYWORD_COUNT: usize = 5;
const LOW_COVERAGE: f64 = 0.3;
const SHORT_CONTENT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub content_length: usize,
    /// Share of the context's top keywords present in the output
    pub context_coverage: f64,
    /// Overlap of significant words between output and context
    pub keyword_similarity: f64,
    pub is_valid: bool,
    pub discrepancies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OutputValidator {
    pub min_content_length: usize,
    pub min_coverage: f64,
    pub min_similarity: f64,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self {
            min_content_length: 50,
            min_coverage: 0.1,
            min_similarity: 0.1,
        }
    }
}

fn significant_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(&w.as_str()))
}

/// Most frequent significant words of `context`, ties broken alphabetically.
pub fn extract_keywords(context: &str) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in significant_words(context) {
        *freq.entry(word).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(KEYWORD_COUNT)
        .map(|(word, _)| word)
        .collect()
}

impl OutputValidator {
    pub fn validate(&self, output: &str, context: &str) -> ValidationReport {
        let content_length = output.trim().chars().count();
        let output_words: HashSet<String> = significant_words(output).collect();
        let context_words: HashSet<String> = significant_words(context).collect();

        let keywords = extract_keywords(context);
        let context_coverage = if keywords.is_empty() {
            1.0
        } else {
            let hits = keywords.iter().filter(|k| output_words.contains(*k)).count();
            hits as f64 / keywords.len() as f64
        };

        let keyword_similarity = if context_words.is_empty() {
            1.0
        } else if output_words.is_empty() {
            0.0
        } else {
            let shared = output_words.intersection(&context_words).count();
            shared as f64 / output_words.len().min(context_words.len()) as f64
        };

        let mut discrepancies = Vec::new();
        if content_length < self.min_content_length {
            discrepancies.push(format!(
                "content length {} is below minimum {}",
                content_length, self.min_content_length
            ));
        }
        if context_coverage < self.min_coverage {
            discrepancies.push(format!(
                "context coverage {:.0}% is below {:.0}%",
                context_coverage * 100.0,
                self.min_coverage * 100.0
            ));
        }
        if keyword_similarity < self.min_similarity {
            discrepancies.push(format!(
                "keyword similarity {:.0}% is below {:.0}%",
                keyword_similarity * 100.0,
                self.min_similarity * 100.0
            ));
        }

        ValidationReport {
            content_length,
            context_coverage,
            keyword_similarity,
            is_valid: discrepancies.is_empty(),
            discrepancies,
        }
    }
}

/// How a failed validation is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total calls including the first
    pub max_attempts: u32,
    pub backoff: Duration,
    pub temperature_step: f32,
    pub max_tokens_increase: u32,
    pub min_temperature: f32,
    pub min_temperature_change: f32,
    pub min_token_change: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            temperature_step: 0.1,
            max_tokens_increase: 500,
            min_temperature: 0.1,
            min_temperature_change: 0.05,
            min_token_change: 200,
        }
    }
}

impl RetryPolicy {
    /// A single call with no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Request for the retry following `attempt` (zero-based).
    pub fn adjust(&self, request: &ChatRequest, attempt: u32, report: &ValidationReport) -> ChatRequest {
        let config = model_config(&request.model);
        let mut next = request.clone();

        if let Some(current) = config.effective_temperature(request.temperature) {
            let mut step = self.temperature_step;
            if report.context_coverage < LOW_COVERAGE {
                step *= 2.0;
            }
            next.temperature =
                Some((current - step * (attempt + 1) as f32).max(self.min_temperature));
        }

        let mut increase = self.max_tokens_increase;
        if report.content_length < SHORT_CONTENT {
            increase = increase.saturating_mul(3) / 2;
        }
        let current = config.clamp_max_tokens(request.max_tokens);
        next.max_tokens = Some(config.clamp_max_tokens(Some(current.saturating_add(increase))));

        next
    }

    /// Whether `after` differs enough from `before` to be worth another call.
    pub fn is_significant(&self, before: &ChatRequest, after: &ChatRequest) -> bool {
        let config = model_config(&before.model);

        let temperature_changed = match (
            config.effective_temperature(before.temperature),
            config.effective_temperature(after.temperature),
        ) {
            (Some(a), Some(b)) => (a - b).abs() >= self.min_temperature_change,
            _ => false,
        };

        let tokens_before = config.clamp_max_tokens(before.max_tokens);
        let tokens_after = config.clamp_max_tokens(after.max_tokens);
        let tokens_changed = tokens_before.abs_diff(tokens_after) >= self.min_token_change;

        temperature_changed || tokens_changed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub report: ValidationReport,
}

#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    /// The last completion received
    pub response: ChatResponse,
    /// Usage summed over every attempt
    pub usage: TokenUsage,
    pub history: Vec<AttemptRecord>,
}

impl ValidatedResponse {
    pub fn is_valid(&self) -> bool {
        self.history.last().map(|a| a.report.is_valid).unwrap_or(false)
    }

    pub fn attempts(&self) -> usize {
        self.history.len()
    }
}

/// Calls `client` until the output validates, attempts run out, or a retry
/// would not change the request meaningfully. Transport errors end the loop.
pub async fn analyze_validated(
    client: &dyn ChatClient,
    request: ChatRequest,
    validator: &OutputValidator,
    policy: &RetryPolicy,
) -> LlmResult<ValidatedResponse> {
    let max_attempts = policy.max_attempts.max(1);
    let mut request = request;
    let mut usage = TokenUsage::default();
    let mut history = Vec::new();
    let mut attempt = 0;

    loop {
        let response = client.chat_complete(request.clone()).await?;
        usage += response.usage;

        let report = validator.validate(&response.content, request.system_context());
        debug!(
            attempt,
            valid = report.is_valid,
            coverage = report.context_coverage,
            similarity = report.keyword_similarity,
            "Validated analysis output"
        );
        history.push(AttemptRecord {
            attempt,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            report: report.clone(),
        });

        if report.is_valid || attempt + 1 >= max_attempts {
            if !report.is_valid {
                warn!(
                    attempts = attempt + 1,
                    discrepancies = ?report.discrepancies,
                    "Analysis output still fails validation, keeping last response"
                );
            }
            return Ok(ValidatedResponse {
                response,
                usage,
                history,
            });
        }

        let next = policy.adjust(&request, attempt, &report);
        if !policy.is_significant(&request, &next) {
            info!(attempt, "Retry parameters unchanged, keeping current response");
            return Ok(ValidatedResponse {
                response,
                usage,
                history,
            });
        }

        warn!(
            attempt = attempt + 1,
            max_attempts,
            temperature = ?next.temperature,
            max_tokens = ?next.max_tokens,
            "Analysis output failed validation, retrying"
        );
        if !policy.backoff.is_zero() {
            tokio::time::sleep(policy.backoff).await;
        }
        request = next;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::types::ChatMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedClient {
        replies: Mutex<Vec<String>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn chat_complete(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
            self.seen.lock().unwrap().push(request.clone());
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::EmptyResponse(request.model.clone()))?;
            Ok(ChatResponse {
                content,
                usage: TokenUsage::new(10, 5),
                model: request.model,
            })
        }
    }

    const CONTEXT: &str = "Analyse carbon emissions, carbon targets and emissions reporting for suppliers";
    const GOOD: &str = "Carbon emissions are reported annually; supplier emissions targets cover carbon reporting and reduction.";

    fn request() -> ChatRequest {
        ChatRequest::new(
            "gpt-4",
            vec![ChatMessage::system(CONTEXT), ChatMessage::user("go")],
        )
    }

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords(CONTEXT);
        assert_eq!(keywords[0], "carbon");
        assert_eq!(keywords[1], "emissions");
        assert_eq!(keywords.len(), 5);
        assert!(!keywords.contains(&"and".to_string()));
    }

    #[test]
    fn test_validate_good_and_short_output() {
        let validator = OutputValidator::default();
        let good = validator.validate(GOOD, CONTEXT);
        assert!(good.is_valid, "{:?}", good.discrepancies);

        let short = validator.validate("ok", CONTEXT);
        assert!(!short.is_valid);
        assert!(short.discrepancies[0].contains("content length"));
    }

    #[test]
    fn test_adjust_lowers_temperature_and_raises_tokens() {
        let policy = RetryPolicy::default();
        let report = OutputValidator::default().validate("short", CONTEXT);
        let next = policy.adjust(&request(), 0, &report);

        // coverage is zero so the step doubles; short content raises tokens by 750
        assert!((next.temperature.unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(next.max_tokens, Some(40750));
        assert!(policy.is_significant(&request(), &next));
    }

    #[test]
    fn test_adjust_respects_floor_and_ceiling() {
        let policy = RetryPolicy::default();
        let report = OutputValidator::default().validate("short", CONTEXT);
        let at_limit = request().with_temperature(0.1).with_max_tokens(100000);
        let next = policy.adjust(&at_limit, 2, &report);

        assert_eq!(next.temperature, Some(0.1));
        assert_eq!(next.max_tokens, Some(100000));
        assert!(!policy.is_significant(&at_limit, &next));
    }

    #[tokio::test]
    async fn test_retries_until_valid() {
        let client = ScriptedClient::new(&["too short", GOOD]);
        let result = analyze_validated(
            &client,
            request(),
            &OutputValidator::default(),
            &RetryPolicy::default().with_backoff(Duration::ZERO),
        )
        .await
        .unwrap();

        assert!(result.is_valid());
        assert_eq!(result.attempts(), 2);
        assert_eq!(result.response.content, GOOD);
        assert_eq!(result.usage, TokenUsage::new(20, 10));

        let seen = client.seen.lock().unwrap();
        assert!(seen[1].temperature.unwrap() < 0.7);
    }

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let client = ScriptedClient::new(&["a", "b", "c", "d"]);
        let result = analyze_validated(
            &client,
            request(),
            &OutputValidator::default(),
            &RetryPolicy::default()
                .with_max_attempts(3)
                .with_backoff(Duration::ZERO),
        )
        .await
        .unwrap();

        assert!(!result.is_valid());
        assert_eq!(result.attempts(), 3);
        assert_eq!(result.response.content, "c");
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let client = ScriptedClient::new(&["a", "b"]);
        let result = analyze_validated(
            &client,
            request(),
            &OutputValidator::default(),
            &RetryPolicy::none(),
        )
        .await
        .unwrap();
        assert_eq!(result.attempts(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let client = ScriptedClient::new(&[]);
        let result = analyze_validated(
            &client,
            request(),
            &OutputValidator::default(),
            &RetryPolicy::none(),
        )
        .await;
        assert!(matches!(result, Err(LlmError::EmptyResponse(_))));
    }
}
