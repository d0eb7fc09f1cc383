//! Credential acquisition. The provider API key gates the whole workflow.

use secrecy::{ExposeSecret, SecretString};

use crate::error::CredentialError;
use crate::llm::LlmBackend;

/// Accept an operator-entered key for `backend`.
///
/// Surrounding whitespace is stripped. An empty key is fatal for the session
/// and the error carries guidance on where to get one.
pub fn acquire(backend: LlmBackend, input: &SecretString) -> Result<SecretString, CredentialError> {
    let trimmed = input.expose_secret().trim();
    if trimmed.is_empty() {
        tracing::warn!(provider = backend.display_name(), "Empty API key submitted");
        return Err(missing(backend));
    }
    Ok(SecretString::from(trimmed.to_string()))
}

/// The error returned whenever the workflow is used without a key.
pub fn missing(backend: LlmBackend) -> CredentialError {
    CredentialError::Missing {
        provider: backend.display_name().to_string(),
        signup_url: backend.signup_url().to_string(),
    }
}
