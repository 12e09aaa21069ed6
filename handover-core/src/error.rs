use std::time::Duration;

/// Top-level Handover error type.
#[derive(thiserror::Error, Debug)]
pub enum HandoverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Discovery error: {0}")]
    Discover(#[from] DiscoverError),

    #[error("Analyzer error: {0}")]
    Analyze(#[from] AnalyzeError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    #[error("Provider {provider} does not support auth method {method}")]
    UnsupportedAuthMethod { provider: String, method: String },
}

#[derive(thiserror::Error, Debug)]
pub enum DiscoverError {
    #[error("Repository root does not exist: {0}")]
    RootNotFound(String),

    #[error("Walk error: {0}")]
    Walk(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum AnalyzeError {
    #[error("Git error: {0}")]
    Git(String),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Malformed manifest {path}: {message}")]
    Manifest { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Provider configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether the facade may retry this failure with backoff.
    ///
    /// Rate limits are retryable only under api-key auth; the facade handles
    /// that split itself, so `RateLimited` reports `true` here.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth(_) | Self::Parse(_) | Self::SchemaViolation(_) | Self::Config(_) => false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: String,
        source: std::io::Error,
    },

    #[error("Document {document} failed: {message}")]
    Document { document: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step {step} depends on unknown step {dep}")]
    UnknownDependency { step: String, dep: String },

    #[error("Dependency cycle involving steps: {0}")]
    Cycle(String),

    #[error("Pipeline was not validated before execution")]
    NotValidated,
}

pub type Result<T> = std::result::Result<T, HandoverError>;
