use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, HandoverError};

/// Which LLM backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    Openai,
    Azure,
    Ollama,
    Groq,
    Together,
    Deepseek,
    Custom,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::Azure => "azure",
            Self::Ollama => "ollama",
            Self::Groq => "groq",
            Self::Together => "together",
            Self::Deepseek => "deepseek",
            Self::Custom => "custom",
        }
    }

    /// Local providers get a longer per-request timeout.
    pub fn is_local(self) -> bool {
        matches!(self, Self::Ollama)
    }

    /// Default API key environment variable for this backend.
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Azure => Some("AZURE_OPENAI_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Together => Some("TOGETHER_API_KEY"),
            Self::Deepseek => Some("DEEPSEEK_API_KEY"),
            Self::Ollama => None,
            Self::Custom => Some("LLM_API_KEY"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::Openai),
            "azure" => Ok(Self::Azure),
            "ollama" => Ok(Self::Ollama),
            "groq" => Ok(Self::Groq),
            "together" => Ok(Self::Together),
            "deepseek" => Ok(Self::Deepseek),
            "custom" => Ok(Self::Custom),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Credential mode for the selected provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    #[default]
    ApiKey,
    Subscription,
}

/// Who the generated documents are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    Human,
    Ai,
}

/// Top-level Handover configuration, matching `handover.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoverConfig {
    pub provider: ProviderKind,
    /// Provider-specific model id; `None` selects the per-provider default.
    pub model: Option<String>,
    /// Environment variable holding the provider key.
    pub api_key_env: Option<String>,
    pub auth_method: AuthMethod,
    /// Base URL override for custom/compatible endpoints.
    pub base_url: Option<String>,
    /// Per-request timeout in milliseconds; `None` selects the provider default.
    pub timeout: Option<u64>,
    pub output: OutputSection,
    pub audience: Audience,
    /// Include globs applied after ignore rules; empty = everything.
    pub include: Vec<String>,
    /// Exclude globs applied after ignore rules.
    pub exclude: Vec<String>,
    /// Path to an optional user-supplied context document.
    pub context: Option<PathBuf>,
    pub analysis: AnalysisSection,
    pub project: ProjectSection,
    pub context_window: ContextWindowSection,
    pub cache: CacheSection,
    /// USD value above which a cost warning event is emitted.
    pub cost_warning_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./handover"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// Analyzer concurrency cap.
    pub concurrency: usize,
    /// Skip LLM rounds entirely.
    pub static_only: bool,
    /// Commit history depth; `full` overrides the 6-month default.
    pub git_depth: GitDepth,
    /// Maximum file size considered for content operations (bytes).
    pub max_file_size: u64,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            concurrency: 4,
            static_only: false,
            git_depth: GitDepth::default(),
            max_file_size: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GitDepth {
    /// Last six months of history.
    #[default]
    Recent,
    /// Entire history.
    Full,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub name: Option<String>,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub team_size: Option<u32>,
    pub deploy_target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWindowSection {
    /// Override for the provider context ceiling.
    pub max_tokens: Option<u32>,
    /// Always-include patterns.
    pub pin: Vec<String>,
    /// Score-boost patterns.
    pub boost: Vec<String>,
    /// Estimated-token threshold above which a high-score file is split into
    /// signatures plus sections.
    pub split_token_threshold: u32,
    /// Minimum score for section splitting.
    pub split_min_score: f64,
}

impl Default for ContextWindowSection {
    fn default() -> Self {
        Self {
            max_tokens: None,
            pin: Vec::new(),
            boost: Vec::new(),
            split_token_threshold: 8000,
            split_min_score: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Cache directory relative to the repo root.
    pub dir: PathBuf,
    /// Skip cache reads (writes still happen).
    pub no_cache: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".handover-cache"),
            no_cache: false,
        }
    }
}

impl HandoverConfig {
    /// Load configuration from `handover.toml` under the repo root, falling
    /// back to defaults when the file is absent.
    pub fn load(repo_root: &Path) -> crate::error::Result<Self> {
        let path = repo_root.join("handover.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| HandoverError::Config(ConfigError::Parse(e.to_string())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| HandoverError::Config(ConfigError::Parse(e.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation, run before any I/O.
    pub fn validate(&self) -> crate::error::Result<()> {
        if matches!(self.provider, ProviderKind::Azure | ProviderKind::Custom)
            && self.base_url.is_none()
        {
            return Err(HandoverError::Config(ConfigError::Invalid(format!(
                "provider {} requires base_url",
                self.provider.as_str()
            ))));
        }
        if self.analysis.concurrency == 0 {
            return Err(HandoverError::Config(ConfigError::Invalid(
                "analysis.concurrency must be at least 1".to_string(),
            )));
        }
        if self.context_window.split_min_score < 0.0 {
            return Err(HandoverError::Config(ConfigError::Invalid(
                "context_window.split_min_score must be non-negative".to_string(),
            )));
        }
        if self.cost_warning_threshold.is_some_and(|t| t < 0.0) {
            return Err(HandoverError::Config(ConfigError::Invalid(
                "cost_warning_threshold must be non-negative".to_string(),
            )));
        }
        Ok(())
    }

    /// Resolved API key environment variable for the selected provider.
    pub fn api_key_env(&self) -> Option<String> {
        self.api_key_env
            .clone()
            .or_else(|| self.provider.default_api_key_env().map(String::from))
    }
}
