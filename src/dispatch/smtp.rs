//! SMTP delivery via lettre (STARTTLS submission).

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::config::{env_opt, parse_or};
use crate::error::{ConfigError, DispatchError};

use super::{Mailer, OutgoingEmail};

/// Relay settings. Sender credentials ship blank; sending stays impossible
/// until an operator supplies them.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Deadline for delivering to one recipient.
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: String::new(),
            password: SecretString::from(String::new()),
            from_address: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl SmtpConfig {
    /// Build config from `SMTP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let username = env_opt("SMTP_USERNAME").unwrap_or_default();
        let from_address = env_opt("SMTP_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Ok(Self {
            host: env_opt("SMTP_HOST").unwrap_or(defaults.host),
            port: parse_or("SMTP_PORT", defaults.port)?,
            username,
            password: SecretString::from(env_opt("SMTP_PASSWORD").unwrap_or_default()),
            from_address,
            timeout: Duration::from_secs(parse_or("SMTP_TIMEOUT_SECS", defaults.timeout.as_secs())?),
        })
    }

    /// Whether both halves of the sender login are present.
    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.expose_secret().trim().is_empty()
    }
}

/// Delivers through an authenticated SMTP relay.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, DispatchError> {
        let from: Mailbox = self.config.from_address.parse().map_err(|e| DispatchError::InvalidAddress {
            address: self.config.from_address.clone(),
            reason: format!("{e}"),
        })?;
        let to: Mailbox = email.to.parse().map_err(|e| DispatchError::InvalidAddress {
            address: email.to.clone(),
            reason: format!("{e}"),
        })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| DispatchError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<SmtpTransport, DispatchError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        Ok(SmtpTransport::starttls_relay(&self.config.host)
            .map_err(|e| DispatchError::Relay(e.to_string()))?
            .port(self.config.port)
            .credentials(creds)
            .timeout(Some(self.config.timeout))
            .build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DispatchError> {
        if !self.config.has_credentials() {
            return Err(DispatchError::CredentialsMissing);
        }

        let message = self.build_message(email)?;
        let transport = self.transport()?;

        let task = tokio::task::spawn_blocking(move || transport.send(&message));
        match tokio::time::timeout(self.config.timeout, task).await {
            Ok(Ok(Ok(_response))) => Ok(()),
            Ok(Ok(Err(e))) => Err(DispatchError::Relay(format!("SMTP send failed: {e}"))),
            Ok(Err(e)) => Err(DispatchError::Relay(format!("SMTP task panicked: {e}"))),
            Err(_) => Err(DispatchError::Timeout {
                recipient: email.to.clone(),
                timeout: self.config.timeout,
            }),
        }
    }
}
