//! Delivering reviewed messages through an SMTP relay.

pub mod smtp;

pub use smtp::{SmtpConfig, SmtpMailer};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::Batch;
use crate::campaign::CampaignParameters;
use crate::error::DispatchError;

/// A fully formatted message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Something that can deliver one email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DispatchError>;
}

/// Per-recipient result of a dispatch pass.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Delivery {
    Sent { recipient: String },
    Failed { recipient: String, reason: String },
    Skipped { recipient: String, reason: String },
}

impl Delivery {
    /// Human-readable line for the session history.
    pub fn notice(&self) -> String {
        match self {
            Self::Sent { recipient } => format!("Email successfully sent to {recipient}"),
            Self::Failed { recipient, reason } => {
                format!("Failed to send email to {recipient}: {reason}")
            }
            Self::Skipped { recipient, reason } => format!("Skipped {recipient}: {reason}"),
        }
    }
}

/// All deliveries of one pass, in row order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.count(|d| matches!(d, Delivery::Sent { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|d| matches!(d, Delivery::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&Delivery) -> bool) -> usize {
        self.deliveries.iter().filter(|d| pred(d)).count()
    }
}

/// Sends each row's message, isolating failures per recipient.
pub struct Dispatcher {
    mailer: Arc<dyn Mailer>,
}

impl Dispatcher {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Attempt delivery for every row with a message, in row order.
    ///
    /// Never returns an error: each failure is recorded and the loop moves on.
    pub async fn send_batch(&self, batch: &Batch, params: &CampaignParameters) -> DispatchReport {
        let mut report = DispatchReport::default();

        for row in batch.rows() {
            let recipient = row.email.clone();
            let Some(body) = row.message.as_deref().filter(|_| row.has_message()) else {
                report.deliveries.push(Delivery::Skipped {
                    recipient,
                    reason: "no generated message".to_string(),
                });
                continue;
            };

            let email = OutgoingEmail {
                to: recipient.clone(),
                subject: params.subject_for(&row.company),
                body: body.to_string(),
            };

            match self.mailer.send(&email).await {
                Ok(()) => {
                    info!(recipient = %recipient, "Email sent");
                    report.deliveries.push(Delivery::Sent { recipient });
                }
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "Email delivery failed");
                    report.deliveries.push(Delivery::Failed {
                        recipient,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            sent = report.sent(),
            failed = report.failed(),
            total = report.deliveries.len(),
            "Dispatch pass finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::batch::ContactRow;

    /// Records every email; fails for addresses in `reject`.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
        reject: Vec<&'static str>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), DispatchError> {
            if self.reject.contains(&email.to.as_str()) {
                return Err(DispatchError::Relay("mailbox unavailable".into()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn params() -> CampaignParameters {
        CampaignParameters::new("Mentorship", "robotics", "Sam")
    }

    fn batch() -> Batch {
        let mut batch = Batch::from_rows(vec![
            ContactRow::new("A", "Acme", "a@x.com", None),
            ContactRow::new("B", "Beta", "b@x.com", None),
            ContactRow::new("C", "Gamma", "c@x.com", None),
        ]);
        batch.set_message("A", "Hi A".into());
        batch.set_message("B", "Hi B".into());
        batch.set_message("C", "Hi C".into());
        batch
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let mailer = Arc::new(RecordingMailer {
            reject: vec!["b@x.com"],
            ..Default::default()
        });
        let report = Dispatcher::new(mailer.clone())
            .send_batch(&batch(), &params())
            .await;

        assert_eq!(report.sent(), 2);
        assert_eq!(report.failed(), 1);
        assert!(report.deliveries[1].notice().contains("b@x.com"));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[1].to, "c@x.com");
        assert_eq!(
            sent[1].subject,
            "Passionate About robotics: Mentorship Inquiry for Gamma"
        );
    }

    #[tokio::test]
    async fn rows_that_failed_regeneration_are_not_sent() {
        let mut batch = batch();
        batch.set_failed("B", "model timed out".into());

        let mailer = Arc::new(RecordingMailer::default());
        let report = Dispatcher::new(mailer.clone()).send_batch(&batch, &params()).await;

        assert!(matches!(report.deliveries[1], Delivery::Skipped { .. }));
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| e.to != "b@x.com"));
    }

    #[tokio::test]
    async fn rows_without_messages_are_skipped() {
        let mut batch = Batch::from_rows(vec![
            ContactRow::new("A", "Acme", "a@x.com", None),
            ContactRow::new("B", "Beta", "b@x.com", None),
        ]);
        batch.set_message("B", "Hi B".into());

        let mailer = Arc::new(RecordingMailer::default());
        let report = Dispatcher::new(mailer.clone()).send_batch(&batch, &params()).await;

        assert!(matches!(report.deliveries[0], Delivery::Skipped { .. }));
        assert_eq!(report.sent(), 1);
        assert_eq!(mailer.sent.lock().unwrap()[0].body, "Hi B");
    }

    #[tokio::test]
    async fn blank_sender_credentials_fail_each_recipient() {
        let mailer = Arc::new(SmtpMailer::new(SmtpConfig::default()));
        let report = Dispatcher::new(mailer).send_batch(&batch(), &params()).await;

        assert_eq!(report.deliveries.len(), 3);
        assert_eq!(report.failed(), 3);
        for delivery in &report.deliveries {
            match delivery {
                Delivery::Failed { reason, .. } => {
                    assert!(reason.contains("credentials are not configured"))
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
    }
}
