//! A single operator session driving the outreach workflow.
//!
//! Each public method is one discrete user action. The `WorkflowPhase` is the
//! source of truth for what is allowed next; the `SessionStore` holds the
//! batch, the send flag and the history between actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{self, Batch, ContactRow, UploadSummary};
use crate::campaign::CampaignParameters;
use crate::config::GenerationConfig;
use crate::credential;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::WorkflowError;
use crate::generation::{GenerationEngine, GenerationReport, Scope};
use crate::llm::{LlmProvider, ProviderFactory};

use super::history::{HandlerId, Pipeline};
use super::state::WorkflowPhase;
use super::store::{SessionStore, keys};

/// The only workflow page this service hosts.
pub const PAGE: &str = "email_generator";

pub mod handlers {
    use super::{HandlerId, PAGE};

    pub const CREDENTIAL: HandlerId = HandlerId::new(PAGE, "credential");
    pub const CAMPAIGN: HandlerId = HandlerId::new(PAGE, "campaign");
    pub const UPLOAD: HandlerId = HandlerId::new(PAGE, "upload");
    pub const GENERATE: HandlerId = HandlerId::new(PAGE, "generate");
    pub const REVIEW: HandlerId = HandlerId::new(PAGE, "review");
    pub const SEND: HandlerId = HandlerId::new(PAGE, "send");
    pub const EXPORT: HandlerId = HandlerId::new(PAGE, "export");
}

/// Question shown alongside a reviewable batch.
pub const SEND_PROMPT: &str = "Do you want to send email?";

const SENDING_DISABLED: &str = "Sending is disabled on this server (set OUTREACH_DISPATCH_ENABLED)";

/// Collaborators shared by every session.
pub struct WorkflowDeps {
    pub providers: Arc<dyn ProviderFactory>,
    pub dispatcher: Arc<Dispatcher>,
    pub generation: GenerationConfig,
    pub dispatch_enabled: bool,
    /// Server-side key; sessions start past the credential step when set.
    pub server_key: Option<SecretString>,
    pub pipeline: Pipeline,
}

/// What the review surface shows.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub columns: Vec<String>,
    pub rows: Vec<ContactRow>,
    pub export_file_name: &'static str,
    pub prompt: &'static str,
    /// Present when this render consumed a pending send confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchReport>,
}

/// Result of answering the send prompt.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub confirmed: bool,
    pub dispatched: bool,
    pub notice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DispatchReport>,
}

/// Row counts for the session summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub rows: usize,
    pub generated: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub phase: WorkflowPhase,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignParameters>,
    pub send_flag: bool,
    pub history: Vec<String>,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchSummary>,
}

/// One operator's workflow state.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    phase: WorkflowPhase,
    store: SessionStore,
    llm: Option<Arc<dyn LlmProvider>>,
    campaign: Option<CampaignParameters>,
    deps: Arc<WorkflowDeps>,
}

impl Session {
    /// Start a session. With a server-side key the credential step is skipped.
    pub fn new(id: Uuid, deps: Arc<WorkflowDeps>) -> Self {
        let mut session = Self {
            id,
            created_at: Utc::now(),
            phase: WorkflowPhase::default(),
            store: SessionStore::new(),
            llm: None,
            campaign: None,
            deps,
        };

        if let Some(key) = session.deps.server_key.clone()
            && let Err(e) = session.accept_credential(key)
        {
            warn!(session_id = %id, error = %e, "Server-side API key rejected");
        }

        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn campaign(&self) -> Option<&CampaignParameters> {
        self.campaign.as_ref()
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.store.get(keys::CSV_DATA)
    }

    pub fn send_flag(&self) -> bool {
        self.store.get(keys::SEND_EMAIL_FLAG).copied().unwrap_or(false)
    }

    // ── Actions ─────────────────────────────────────────────────────

    /// Accept the operator's provider key.
    pub fn submit_credential(&mut self, api_key: SecretString) -> Result<(), WorkflowError> {
        self.begin(handlers::CREDENTIAL);
        let result = if self.phase != WorkflowPhase::AwaitingCredential {
            Err(self.invalid("submit a credential"))
        } else {
            self.accept_credential(api_key)
        };
        self.finish(handlers::CREDENTIAL, result, |_| "API key accepted".to_string())
    }

    /// Set or replace the campaign parameters.
    pub fn set_campaign(&mut self, params: CampaignParameters) -> Result<(), WorkflowError> {
        self.begin(handlers::CAMPAIGN);
        let result = self.set_campaign_inner(params);
        self.finish(handlers::CAMPAIGN, result, |_| "Campaign details saved".to_string())
    }

    /// Load an uploaded CSV as the current batch.
    ///
    /// Any upload attempt clears a pending send confirmation. A rejected file
    /// leaves the previous batch in place.
    pub fn upload(&mut self, bytes: &[u8]) -> Result<UploadSummary, WorkflowError> {
        self.begin(handlers::UPLOAD);
        let result = self.upload_inner(bytes);
        self.finish(handlers::UPLOAD, result, |_| {
            "CSV file successfully loaded.".to_string()
        })
    }

    /// Generate messages for the current batch.
    pub async fn generate(&mut self, scope: Scope) -> Result<GenerationReport, WorkflowError> {
        self.begin(handlers::GENERATE);
        let result = self.generate_inner(scope).await;
        self.finish(handlers::GENERATE, result, GenerationReport::summary)
    }

    /// Render the batch for inspection, consuming any pending send confirmation.
    pub async fn review(&mut self) -> Result<Review, WorkflowError> {
        self.begin(handlers::REVIEW);
        let result = self.review_inner().await;
        self.finish(handlers::REVIEW, result, |_| "Generated messages:".to_string())
    }

    /// Answer the "send email?" prompt.
    pub async fn answer_send_prompt(&mut self, confirm: bool) -> Result<SendOutcome, WorkflowError> {
        self.begin(handlers::SEND);
        let result = self.answer_inner(confirm).await;
        self.finish(handlers::SEND, result, |outcome| outcome.notice.clone())
    }

    /// Encode the batch for download.
    pub fn export(&mut self) -> Result<Vec<u8>, WorkflowError> {
        self.begin(handlers::EXPORT);
        let result = self.export_inner();
        self.finish(handlers::EXPORT, result, |_| String::new())
    }

    /// Switch the active page. Returns whether the page changed.
    pub fn switch_page(&mut self, page: &str) -> bool {
        self.store.enter_page(page)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let batch = self.batch().map(|b| {
            let (generated, failed, pending) = b.status_counts();
            BatchSummary {
                rows: b.len(),
                generated,
                failed,
                pending,
            }
        });

        SessionSnapshot {
            id: self.id,
            phase: self.phase,
            created_at: self.created_at,
            campaign: self.campaign.clone(),
            send_flag: self.send_flag(),
            history: self.store.get(keys::CHAT_HISTORY).cloned().unwrap_or_default(),
            messages: self.store.get(keys::MESSAGES).cloned().unwrap_or_default(),
            batch,
        }
    }

    // ── Handlers ────────────────────────────────────────────────────

    fn accept_credential(&mut self, api_key: SecretString) -> Result<(), WorkflowError> {
        let backend = self.deps.providers.backend();
        let key = credential::acquire(backend, &api_key)?;
        let llm = self.deps.providers.create(key)?;
        self.llm = Some(llm);
        self.transition(WorkflowPhase::AwaitingParameters)
    }

    fn set_campaign_inner(&mut self, params: CampaignParameters) -> Result<(), WorkflowError> {
        self.require_credential()?;
        if !self.phase.accepts_campaign() {
            return Err(self.invalid("change campaign details"));
        }
        params.validate()?;

        info!(session_id = %self.id, goal = %params.goal, field = %params.field, "Campaign parameters set");
        self.campaign = Some(params);
        if self.phase == WorkflowPhase::AwaitingParameters {
            self.transition(WorkflowPhase::AwaitingUpload)?;
        }
        Ok(())
    }

    fn upload_inner(&mut self, bytes: &[u8]) -> Result<UploadSummary, WorkflowError> {
        self.require_credential()?;
        if !self.phase.accepts_upload() {
            return Err(self.invalid("upload a file"));
        }

        self.store.set(keys::SEND_EMAIL_FLAG, false);
        let (batch, summary) = batch::load(bytes)?;
        self.store.set(keys::CSV_DATA, batch);

        if self.phase == WorkflowPhase::AwaitingUpload {
            self.transition(WorkflowPhase::Reviewing)?;
        }
        Ok(summary)
    }

    async fn generate_inner(&mut self, scope: Scope) -> Result<GenerationReport, WorkflowError> {
        self.require_credential()?;
        if self.phase != WorkflowPhase::Reviewing {
            return Err(self.invalid("generate emails"));
        }
        let (Some(llm), Some(params)) = (self.llm.clone(), self.campaign.clone()) else {
            return Err(self.invalid("generate emails"));
        };
        let Some(mut batch) = self.store.remove(keys::CSV_DATA) else {
            return Err(WorkflowError::NoBatch);
        };

        let engine = GenerationEngine::new(llm, &params, self.deps.generation.clone());
        let report = engine.generate_all(&mut batch, scope).await;

        self.store.set(keys::CSV_DATA, batch);
        self.store
            .get_or_default(keys::CHAT_HISTORY)
            .push(report.summary());
        Ok(report)
    }

    async fn review_inner(&mut self) -> Result<Review, WorkflowError> {
        self.require_credential()?;
        let dispatch = self.consume_send_confirmation().await;

        let batch = self.batch().ok_or(WorkflowError::NoBatch)?;
        if !batch.has_messages() {
            return Err(WorkflowError::NothingToReview);
        }

        Ok(Review {
            columns: batch.columns().to_vec(),
            rows: batch.rows().to_vec(),
            export_file_name: batch::EXPORT_FILE_NAME,
            prompt: SEND_PROMPT,
            dispatch,
        })
    }

    async fn answer_inner(&mut self, confirm: bool) -> Result<SendOutcome, WorkflowError> {
        self.require_credential()?;
        if self.phase != WorkflowPhase::Reviewing {
            return Err(self.invalid("answer the send prompt"));
        }
        if !self.batch().is_some_and(Batch::has_messages) {
            return Err(WorkflowError::NothingToReview);
        }

        self.store.set(keys::SEND_EMAIL_FLAG, confirm);
        if !confirm {
            return Ok(SendOutcome {
                confirmed: false,
                dispatched: false,
                notice: "Emails will not be sent".to_string(),
                report: None,
            });
        }

        let report = self.consume_send_confirmation().await;
        let notice = match &report {
            Some(r) => format!(
                "Dispatch finished: {} sent, {} failed",
                r.sent(),
                r.failed()
            ),
            None => SENDING_DISABLED.to_string(),
        };
        Ok(SendOutcome {
            confirmed: true,
            dispatched: report.is_some(),
            notice,
            report,
        })
    }

    fn export_inner(&mut self) -> Result<Vec<u8>, WorkflowError> {
        self.require_credential()?;
        let batch = self.batch().ok_or(WorkflowError::NoBatch)?;
        if !batch.has_messages() {
            return Err(WorkflowError::NothingToReview);
        }
        batch::to_csv(batch).map_err(|e| WorkflowError::Export(e.to_string()))
    }

    /// Run at most one dispatch pass for a pending confirmation.
    ///
    /// The flag is cleared before sending so a confirmation is never
    /// observed twice, whatever the outcome.
    async fn consume_send_confirmation(&mut self) -> Option<DispatchReport> {
        let pending = std::mem::replace(self.store.get_or_default(keys::SEND_EMAIL_FLAG), false);
        if !pending || self.phase != WorkflowPhase::Reviewing {
            return None;
        }

        if !self.deps.dispatch_enabled {
            info!(session_id = %self.id, "Send confirmed but dispatch is disabled");
            self.store
                .get_or_default(keys::CHAT_HISTORY)
                .push(SENDING_DISABLED.to_string());
            return None;
        }

        let params = self.campaign.clone()?;
        let batch = self.store.get(keys::CSV_DATA)?.clone();

        self.transition(WorkflowPhase::Dispatching).ok()?;
        let report = self.deps.dispatcher.send_batch(&batch, &params).await;
        if let Err(e) = self.transition(WorkflowPhase::Reviewing) {
            warn!(session_id = %self.id, error = %e, "Could not return to review after dispatch");
        }

        let history = self.store.get_or_default(keys::CHAT_HISTORY);
        history.extend(report.deliveries.iter().map(|d| d.notice()));
        Some(report)
    }

    // ── Plumbing ────────────────────────────────────────────────────

    fn begin(&mut self, handler: HandlerId) {
        let keys = self.store.resync();
        tracing::trace!(session_id = %self.id, handler = %handler, keys, "Handler start");
        self.deps.pipeline.before(handler, &mut self.store);
    }

    fn finish<T>(
        &mut self,
        handler: HandlerId,
        result: Result<T, WorkflowError>,
        notice: impl FnOnce(&T) -> String,
    ) -> Result<T, WorkflowError> {
        let line = match &result {
            Ok(value) => notice(value),
            Err(e) => e.to_string(),
        };
        self.deps.pipeline.after(handler, &mut self.store, &line);
        result
    }

    fn require_credential(&self) -> Result<(), WorkflowError> {
        if self.phase.has_credential() && self.llm.is_some() {
            Ok(())
        } else {
            Err(credential::missing(self.deps.providers.backend()).into())
        }
    }

    fn transition(&mut self, target: WorkflowPhase) -> Result<(), WorkflowError> {
        if !self.phase.can_transition_to(target) {
            return Err(WorkflowError::InvalidTransition {
                action: format!("move to {target}"),
                phase: self.phase.to_string(),
            });
        }
        info!(session_id = %self.id, from = %self.phase, to = %target, "Workflow transition");
        self.phase = target;
        Ok(())
    }

    fn invalid(&self, action: &str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            action: action.to_string(),
            phase: self.phase.to_string(),
        }
    }
}
