//! Error types for Outreach.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Problems obtaining the provider API key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    #[error("Please add your {provider} API key to continue. Obtain your key from {signup_url}")]
    Missing {
        provider: String,
        signup_url: String,
    },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rejected the request (HTTP {status}): {reason}")]
    Rejected {
        provider: String,
        status: u16,
        reason: String,
    },
}

impl LlmError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }

    /// Server-suggested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Malformed or incomplete input file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "The CSV file must contain 'Name', 'Company' and 'Email' columns ('Description' is recommended). Missing: {}",
        .missing.join(", ")
    )]
    MissingColumns { missing: Vec<String> },

    #[error("The CSV file is empty")]
    Empty,

    #[error("The CSV file is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("Malformed CSV at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("Campaign parameters are incomplete. Missing: {}", .missing.join(", "))]
    IncompleteCampaign { missing: Vec<String> },
}

/// Failure to produce a message for one contact row.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("LLM call failed for {name}: {source}")]
    Llm {
        name: String,
        #[source]
        source: LlmError,
    },

    #[error("Unusable output for {name}: {reason}")]
    UnusableOutput { name: String, reason: String },
}

/// Per-recipient delivery failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("Sender credentials are not configured (set SMTP_USERNAME and SMTP_PASSWORD)")]
    CredentialsMissing,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP relay error: {0}")]
    Relay(String),

    #[error("SMTP send to {recipient} timed out after {timeout:?}")]
    Timeout { recipient: String, timeout: Duration },
}

/// Errors raised by the workflow state machine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    CredentialRequired(#[from] CredentialError),

    #[error("Cannot {action} while {phase}")]
    InvalidTransition { action: String, phase: String },

    #[error("Session {0} not found")]
    SessionNotFound(uuid::Uuid),

    #[error("No batch has been uploaded yet")]
    NoBatch,

    #[error("No messages have been generated yet")]
    NothingToReview,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to create LLM provider: {0}")]
    Provider(#[from] LlmError),

    #[error("Failed to encode export: {0}")]
    Export(String),
}
