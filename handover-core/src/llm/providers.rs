// LLM provider implementations: Anthropic plus OpenAI-compatible endpoints
// (OpenAI, Azure, Ollama, Groq, Together, DeepSeek, custom).

use std::sync::Once;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{HandoverConfig, ProviderKind};
use crate::error::{CredentialError, HandoverError, LlmError};

use super::{CompletionRequest, LlmProvider, TokenUsage};

/// The "no-provider" rustls feature leaves crypto provider selection to the
/// application; reqwest panics on the first `Client::new()` otherwise.
static INSTALL_CRYPTO_PROVIDER: Once = Once::new();

fn ensure_crypto_provider() {
    INSTALL_CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Map an HTTP failure to a typed LLM error. 429 carries its retry-after
/// window so subscription mode can surface it without retrying.
fn classify_status(status: u16, retry_after: Option<u64>, body: String) -> LlmError {
    match status {
        429 => LlmError::RateLimited {
            retry_after: Duration::from_secs(retry_after.unwrap_or(60)),
        },
        401 | 403 => LlmError::Auth(body),
        _ => LlmError::Api { status, body },
    }
}

fn retry_after_header(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get("retry-after")?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

// ── Anthropic Provider ──────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        ensure_crypto_provider();
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_context_tokens(&self) -> u32 {
        200_000
    }

    async fn call(
        &self,
        request: &CompletionRequest,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        debug!(model = %self.model, "Calling Anthropic API");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| HandoverError::Llm(LlmError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = retry_after_header(&resp);
            let text = resp.text().await.unwrap_or_default();
            return Err(HandoverError::Llm(classify_status(
                status,
                retry_after,
                text,
            )));
        }

        let result: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| HandoverError::Llm(LlmError::Parse(e.to_string())))?;

        let text = result
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();

        Ok((
            text,
            TokenUsage {
                input_tokens: result.usage.input_tokens,
                output_tokens: result.usage.output_tokens,
                cache_read_tokens: result.usage.cache_read_input_tokens,
            },
        ))
    }
}

// ── OpenAI-compatible Provider ──────────────────────────────────────

/// Serves OpenAI itself and every endpoint speaking its chat-completions
/// dialect: Azure, Ollama, Groq, Together, DeepSeek, custom.
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    client: Client,
    provider_name: &'static str,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_context: u32,
}

impl OpenAiCompatProvider {
    pub fn new(
        provider_name: &'static str,
        api_key: Option<String>,
        model: String,
        base_url: String,
        max_context: u32,
    ) -> Self {
        ensure_crypto_provider();
        Self {
            client: Client::new(),
            provider_name,
            api_key,
            model,
            base_url,
            max_context,
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<OpenAiMessage>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<OpenAiPromptDetails>,
}

#[derive(Deserialize)]
struct OpenAiPromptDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.provider_name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_context_tokens(&self) -> u32 {
        self.max_context
    }

    async fn call(
        &self,
        request: &CompletionRequest,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = OpenAiRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages,
        };

        debug!(provider = self.provider_name, model = %self.model, "Calling chat completions API");

        let mut builder = self.client.post(&url).header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let resp = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| HandoverError::Llm(LlmError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = retry_after_header(&resp);
            let text = resp.text().await.unwrap_or_default();
            return Err(HandoverError::Llm(classify_status(
                status,
                retry_after,
                text,
            )));
        }

        let result: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| HandoverError::Llm(LlmError::Parse(e.to_string())))?;

        let text = result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        let cache_read = result
            .usage
            .prompt_tokens_details
            .as_ref()
            .map_or(0, |d| d.cached_tokens);

        Ok((
            text,
            TokenUsage {
                input_tokens: result.usage.prompt_tokens,
                output_tokens: result.usage.completion_tokens,
                cache_read_tokens: cache_read,
            },
        ))
    }
}

// ── Provider Factory ────────────────────────────────────────────────

struct ProviderDefaults {
    model: &'static str,
    base_url: &'static str,
    max_context: u32,
}

fn defaults_for(kind: ProviderKind) -> ProviderDefaults {
    match kind {
        ProviderKind::Anthropic => ProviderDefaults {
            model: "claude-sonnet-4-20250514",
            base_url: "https://api.anthropic.com",
            max_context: 200_000,
        },
        ProviderKind::Openai => ProviderDefaults {
            model: "gpt-4o",
            base_url: "https://api.openai.com",
            max_context: 128_000,
        },
        ProviderKind::Azure => ProviderDefaults {
            model: "gpt-4o",
            base_url: "",
            max_context: 128_000,
        },
        ProviderKind::Ollama => ProviderDefaults {
            model: "llama3.1",
            base_url: "http://localhost:11434",
            max_context: 32_768,
        },
        ProviderKind::Groq => ProviderDefaults {
            model: "llama-3.1-70b-versatile",
            base_url: "https://api.groq.com/openai",
            max_context: 128_000,
        },
        ProviderKind::Together => ProviderDefaults {
            model: "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
            base_url: "https://api.together.xyz",
            max_context: 128_000,
        },
        ProviderKind::Deepseek => ProviderDefaults {
            model: "deepseek-chat",
            base_url: "https://api.deepseek.com",
            max_context: 64_000,
        },
        ProviderKind::Custom => ProviderDefaults {
            model: "gpt-4o",
            base_url: "",
            max_context: 128_000,
        },
    }
}

/// Create a provider from configuration, resolving its API key from the
/// environment. Fails before any I/O when the credential is missing.
pub fn create_provider(
    config: &HandoverConfig,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    let kind = config.provider;
    let defaults = defaults_for(kind);
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| defaults.model.to_string());
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| defaults.base_url.to_string());

    let api_key = match config.api_key_env() {
        Some(env_name) => match std::env::var(&env_name) {
            Ok(key) if !key.is_empty() => Some(key),
            _ => {
                return Err(HandoverError::Credential(CredentialError::MissingEnv(
                    env_name,
                )));
            }
        },
        // Local providers need no key.
        None => None,
    };

    let max_context = config
        .context_window
        .max_tokens
        .unwrap_or(defaults.max_context);

    match kind {
        ProviderKind::Anthropic => {
            let key = api_key.ok_or_else(|| {
                HandoverError::Credential(CredentialError::MissingEnv(
                    "ANTHROPIC_API_KEY".to_string(),
                ))
            })?;
            let mut provider = AnthropicProvider::new(key, model);
            if config.base_url.is_some() {
                provider = provider.with_base_url(base_url);
            }
            Ok(Box::new(provider))
        }
        _ => Ok(Box::new(OpenAiCompatProvider::new(
            kind.as_str(),
            api_key,
            model,
            base_url,
            max_context,
        ))),
    }
}

/// Per-request timeout for this provider family.
pub fn default_timeout(kind: ProviderKind) -> Duration {
    if kind.is_local() {
        Duration::from_secs(300)
    } else {
        Duration::from_secs(120)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(429, Some(45), String::new()),
            LlmError::RateLimited { retry_after } if retry_after == Duration::from_secs(45)
        ));
        assert!(matches!(
            classify_status(429, None, String::new()),
            LlmError::RateLimited { retry_after } if retry_after == Duration::from_secs(60)
        ));
        assert!(matches!(
            classify_status(401, None, "bad".into()),
            LlmError::Auth(_)
        ));
        assert!(matches!(
            classify_status(503, None, String::new()),
            LlmError::Api { status: 503, .. }
        ));
    }

    #[test]
    fn factory_requires_credentials() {
        let config = HandoverConfig {
            api_key_env: Some("HANDOVER_TEST_MISSING_KEY".into()),
            ..Default::default()
        };
        let err = create_provider(&config).unwrap_err();
        assert!(matches!(
            err,
            HandoverError::Credential(CredentialError::MissingEnv(_))
        ));
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = HandoverConfig {
            provider: ProviderKind::Ollama,
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model_id(), "llama3.1");
        assert_eq!(provider.max_context_tokens(), 32_768);
    }

    #[test]
    fn context_window_override_applies() {
        let config = HandoverConfig {
            provider: ProviderKind::Ollama,
            context_window: crate::config::ContextWindowSection {
                max_tokens: Some(8_000),
                ..Default::default()
            },
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.max_context_tokens(), 8_000);
    }

    #[test]
    fn timeouts_per_provider_family() {
        assert_eq!(
            default_timeout(ProviderKind::Anthropic),
            Duration::from_secs(120)
        );
        assert_eq!(
            default_timeout(ProviderKind::Ollama),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn default_token_estimator() {
        let provider = OpenAiCompatProvider::new(
            "custom",
            None,
            "m".into(),
            "http://localhost".into(),
            1000,
        );
        assert_eq!(provider.estimate_tokens("abcdefgh"), 2);
    }
}
