//! LLM integration for Outreach.
//!
//! Supports:
//! - **Cohere**: direct v2 chat API over reqwest (default, `command-r-plus`)
//! - **Anthropic**: via rig-core
//! - **OpenAI**: via rig-core
//!
//! Every provider handed to the workflow is wrapped in a `RetryProvider` so
//! transient failures get bounded retries with backoff.

pub mod cohere;
pub mod provider;
pub mod retry;
mod rig_adapter;

pub use cohere::CohereProvider;
pub use provider::*;
pub use retry::{RetryPolicy, RetryProvider};
pub use rig_adapter::RigAdapter;

use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Cohere,
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Human-facing provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Cohere => "Cohere",
            Self::Anthropic => "Anthropic",
            Self::OpenAi => "OpenAI",
        }
    }

    /// Where an operator can obtain an API key.
    pub fn signup_url(&self) -> &'static str {
        match self {
            Self::Cohere => "https://cohere.com/",
            Self::Anthropic => "https://console.anthropic.com/",
            Self::OpenAi => "https://platform.openai.com/api-keys",
        }
    }

    /// Conventional environment variable holding this provider's key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Cohere => "COHERE_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Cohere => "command-r-plus",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cohere" => Ok(Self::Cohere),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "OUTREACH_LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected cohere, anthropic or openai)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Cohere => {
            tracing::info!("Using Cohere (model: {})", config.model);
            Ok(Arc::new(CohereProvider::new(
                config.api_key.clone(),
                &config.model,
            )))
        }
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "anthropic")))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "openai")))
}

/// Builds a provider once a session has supplied its credential.
pub trait ProviderFactory: Send + Sync {
    /// Which backend the credential is for.
    fn backend(&self) -> LlmBackend;

    fn create(&self, api_key: SecretString) -> Result<Arc<dyn LlmProvider>, LlmError>;
}

/// Factory for the configured backend and model, with retries applied.
pub struct ConfiguredProviderFactory {
    backend: LlmBackend,
    model: String,
    retry: RetryPolicy,
}

impl ConfiguredProviderFactory {
    pub fn new(backend: LlmBackend, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            model: model.into(),
            retry,
        }
    }
}

impl ProviderFactory for ConfiguredProviderFactory {
    fn backend(&self) -> LlmBackend {
        self.backend
    }

    fn create(&self, api_key: SecretString) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let config = LlmConfig {
            backend: self.backend,
            api_key,
            model: self.model.clone(),
        };
        let inner = create_provider(&config)?;
        Ok(Arc::new(RetryProvider::new(inner, self.retry.clone())))
    }
}
