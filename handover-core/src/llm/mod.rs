//! LLM provider abstraction and the uniform completion facade.
//!
//! Providers expose a raw `call`; the [`ProviderFacade`] layers schema
//! validation, retry-with-backoff, a concurrency cap, and per-call timeouts
//! on top, so the round runner sees a single `complete` that either yields
//! validated structured data or a typed error.

pub mod providers;
pub mod schema;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::AuthMethod;
use crate::error::{HandoverError, LlmError};

use schema::ResponseSchema;

/// Token usage from one LLM call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }
}

/// One structured completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: String) -> Self {
        Self {
            system: None,
            prompt,
            temperature: 0.7,
            max_tokens: 8192,
        }
    }
}

/// Validated structured completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub data: serde_json::Value,
    pub usage: TokenUsage,
}

/// Common interface for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// Maximum context window in tokens.
    fn max_context_tokens(&self) -> u32;

    /// Best-effort token estimate; default is `ceil(chars / 4)`.
    fn estimate_tokens(&self, text: &str) -> u32 {
        crate::context::budget::estimate_tokens(text)
    }

    /// Raw call: returns response text and usage, or a typed [`LlmError`]
    /// wrapped in [`HandoverError::Llm`].
    async fn call(&self, request: &CompletionRequest) -> crate::error::Result<(String, TokenUsage)>;
}

/// Backoff schedule for retryable failures.
const BACKOFF: [Duration; 3] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(120),
];

/// Per-provider cap on concurrent in-flight requests.
const PROVIDER_CONCURRENCY: usize = 2;

/// Uniform completion surface over any provider.
#[derive(Debug, Clone)]
pub struct ProviderFacade {
    provider: Arc<dyn LlmProvider>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    auth_method: AuthMethod,
}

impl ProviderFacade {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration, auth_method: AuthMethod) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(PROVIDER_CONCURRENCY)),
            timeout,
            auth_method,
        }
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn max_context_tokens(&self) -> u32 {
        self.provider.max_context_tokens()
    }

    pub fn estimate_tokens(&self, text: &str) -> u32 {
        self.provider.estimate_tokens(text)
    }

    /// Complete a request and validate the response against `response_schema`.
    ///
    /// Retryable failures (transient network errors, 5xx, api-key-mode rate
    /// limits) back off on the 30/60/120s schedule with jitter. Under
    /// subscription auth a rate limit is surfaced immediately, carrying its
    /// retry-after window. Schema violations and auth failures never retry.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        response_schema: &ResponseSchema,
    ) -> crate::error::Result<Completion> {
        let mut attempt = 0usize;
        loop {
            let outcome = self.call_once(request).await;
            let (text, usage) = match outcome {
                Ok(pair) => pair,
                Err(HandoverError::Llm(err)) => {
                    if matches!(err, LlmError::RateLimited { .. })
                        && self.auth_method == AuthMethod::Subscription
                    {
                        return Err(HandoverError::Llm(err));
                    }
                    if err.is_retryable() && attempt < BACKOFF.len() {
                        let delay = BACKOFF[attempt] + jitter();
                        warn!(
                            provider = self.provider.name(),
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "Retryable LLM failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(HandoverError::Llm(err));
                }
                Err(other) => return Err(other),
            };

            let data = schema::extract_json(&text)
                .map_err(|e| HandoverError::Llm(LlmError::Parse(e)))?;
            response_schema
                .validate(&data)
                .map_err(|e| HandoverError::Llm(LlmError::SchemaViolation(e)))?;

            debug!(
                provider = self.provider.name(),
                input = usage.input_tokens,
                output = usage.output_tokens,
                "Structured completion accepted"
            );
            return Ok(Completion { data, usage });
        }
    }

    async fn call_once(
        &self,
        request: &CompletionRequest,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| HandoverError::Llm(LlmError::Config("facade closed".into())))?;
        match tokio::time::timeout(self.timeout, self.provider.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(HandoverError::Llm(LlmError::Timeout(self.timeout))),
        }
    }
}

/// Sub-second jitter derived from the clock, so concurrent retries spread out.
fn jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    Duration::from_millis(u64::from(nanos % 1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::schema::{FieldKind, required};
    use std::sync::Mutex;

    /// Scriptable provider: pops one canned outcome per call.
    #[derive(Debug)]
    struct ScriptedProvider {
        responses: Mutex<Vec<crate::error::Result<String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<crate::error::Result<String>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn model_id(&self) -> &str {
            "scripted-model"
        }
        fn max_context_tokens(&self) -> u32 {
            100_000
        }
        async fn call(
            &self,
            _request: &CompletionRequest,
        ) -> crate::error::Result<(String, TokenUsage)> {
            *self.calls.lock().unwrap() += 1;
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("{}".to_string()));
            next.map(|text| (text, TokenUsage::default()))
        }
    }

    fn schema() -> ResponseSchema {
        ResponseSchema::new("test", vec![required("summary", FieldKind::String)])
    }

    fn facade(provider: Arc<ScriptedProvider>, auth: AuthMethod) -> ProviderFacade {
        ProviderFacade::new(provider, Duration::from_secs(5), auth)
    }

    #[tokio::test]
    async fn valid_response_accepted_first_try() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"summary": "fine"}"#.to_string()
        )]));
        let facade = facade(Arc::clone(&provider), AuthMethod::ApiKey);
        let completion = facade
            .complete(&CompletionRequest::new("hi".into()), &schema())
            .await
            .unwrap();
        assert_eq!(completion.data["summary"], "fine");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn schema_violation_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"wrong": true}"#.to_string()),
            Ok(r#"{"summary": "late"}"#.to_string()),
        ]));
        let facade = facade(Arc::clone(&provider), AuthMethod::ApiKey);
        let err = facade
            .complete(&CompletionRequest::new("hi".into()), &schema())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandoverError::Llm(LlmError::SchemaViolation(_))
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_backs_off_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(HandoverError::Llm(LlmError::Network("reset".into()))),
            Ok(r#"{"summary": "recovered"}"#.to_string()),
        ]));
        let facade = facade(Arc::clone(&provider), AuthMethod::ApiKey);
        let completion = facade
            .complete(&CompletionRequest::new("hi".into()), &schema())
            .await
            .unwrap();
        assert_eq!(completion.data["summary"], "recovered");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn subscription_rate_limit_fails_fast() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(HandoverError::Llm(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(90),
            },
        ))]));
        let facade = facade(Arc::clone(&provider), AuthMethod::Subscription);
        let err = facade
            .complete(&CompletionRequest::new("hi".into()), &schema())
            .await
            .unwrap_err();
        match err {
            HandoverError::Llm(LlmError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(90));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn auth_failure_is_terminal() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(HandoverError::Llm(
            LlmError::Auth("bad key".into()),
        ))]));
        let facade = facade(Arc::clone(&provider), AuthMethod::ApiKey);
        let err = facade
            .complete(&CompletionRequest::new("hi".into()), &schema())
            .await
            .unwrap_err();
        assert!(matches!(err, HandoverError::Llm(LlmError::Auth(_))));
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
            cache_read_tokens: 5,
        });
        total.add(&TokenUsage {
            input_tokens: 50,
            output_tokens: 10,
            cache_read_tokens: 0,
        });
        assert_eq!(total.input_tokens, 150);
        assert_eq!(total.output_tokens, 30);
        assert_eq!(total.cache_read_tokens, 5);
    }
}
