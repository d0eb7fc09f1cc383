//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::dispatch::SmtpConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, RetryPolicy};

/// Default word budget for a generated email.
pub const DEFAULT_MAX_WORDS: usize = 50;

/// Sessions unused for this long are dropped.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(3600);

/// Settings that shape a generation pass.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Emails longer than this are kept but logged.
    pub max_words: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            temperature: 0.3,
            max_tokens: 300,
        }
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP port for the workflow API.
    pub port: u16,
    pub backend: LlmBackend,
    pub model: String,
    /// Server-side provider key. When set, sessions skip the credential step.
    pub api_key: Option<SecretString>,
    pub retry: RetryPolicy,
    pub generation: GenerationConfig,
    /// Whether a send confirmation actually dispatches mail.
    pub dispatch_enabled: bool,
    /// Idle time after which a session is pruned.
    pub session_idle: Duration,
    pub smtp: SmtpConfig,
    /// Directory for rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
    /// Tracing-service key. Trace export stays disabled regardless.
    pub telemetry_api_key: Option<SecretString>,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = match env_opt("OUTREACH_LLM_BACKEND") {
            Some(raw) => raw.parse()?,
            None => LlmBackend::Cohere,
        };

        let model =
            env_opt("OUTREACH_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let api_key = env_opt("OUTREACH_API_KEY")
            .or_else(|| env_opt(backend.env_var()))
            .map(SecretString::from);

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or("OUTREACH_LLM_MAX_ATTEMPTS", defaults.max_attempts)?,
            attempt_timeout: Duration::from_secs(parse_or(
                "OUTREACH_LLM_TIMEOUT_SECS",
                defaults.attempt_timeout.as_secs(),
            )?),
            ..defaults
        };

        let generation = GenerationConfig {
            max_words: parse_or("OUTREACH_MAX_WORDS", DEFAULT_MAX_WORDS)?,
            ..GenerationConfig::default()
        };

        Ok(Self {
            port: parse_or("OUTREACH_PORT", 8080)?,
            backend,
            model,
            api_key,
            retry,
            generation,
            dispatch_enabled: parse_bool("OUTREACH_DISPATCH_ENABLED", false)?,
            session_idle: Duration::from_secs(parse_or(
                "OUTREACH_SESSION_IDLE_SECS",
                DEFAULT_SESSION_IDLE.as_secs(),
            )?),
            smtp: SmtpConfig::from_env()?,
            log_dir: env_opt("OUTREACH_LOG_DIR").map(PathBuf::from),
            telemetry_api_key: env_opt("LANGCHAIN_API_KEY").map(SecretString::from),
        })
    }
}

/// Non-empty environment variable, trimmed.
pub(crate) fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => parse_flag(key, &raw),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_reports_key_on_failure() {
        let err = parse_value::<u16>("OUTREACH_PORT", "eighty").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("OUTREACH_PORT"));
        assert!(msg.contains("eighty"));
    }

    #[test]
    fn parse_value_accepts_numbers() {
        assert_eq!(parse_value::<u16>("OUTREACH_PORT", "9090").unwrap(), 9090);
    }

    #[test]
    fn parse_flag_variants() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(parse_flag("X", "on").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn generation_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_words, 50);
        assert!(config.max_tokens > 0);
    }
}
