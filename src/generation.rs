//! Generation engine: one LLM call per contact row.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{Batch, ContactRow, RowStatus};
use crate::campaign::{CampaignParameters, PromptTemplate, RowFields};
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Which rows a pass should (re)generate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Every row, replacing earlier messages.
    #[default]
    All,
    /// Only rows that are pending or failed.
    Outstanding,
}

/// A row that could not be generated.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRow {
    pub name: String,
    pub reason: String,
}

/// Outcome of a pass over a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub attempted: usize,
    pub generated: usize,
    pub failed: Vec<FailedRow>,
}

impl GenerationReport {
    /// One-line notice for the session history.
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            return "Emails generated successfully!".to_string();
        }
        let names: Vec<&str> = self.failed.iter().map(|f| f.name.as_str()).collect();
        format!(
            "Generated {} of {} emails; failed for: {}",
            self.generated,
            self.attempted,
            names.join(", ")
        )
    }
}

/// Template slots left in model output, tolerating inner whitespace.
static UNRESOLVED_SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\s*(Name|Company|Description)\s*\}").expect("slot pattern is valid")
});

/// Renders the campaign template per row and asks the LLM for the email body.
pub struct GenerationEngine {
    llm: Arc<dyn LlmProvider>,
    template: PromptTemplate,
    config: GenerationConfig,
}

impl GenerationEngine {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        params: &CampaignParameters,
        config: GenerationConfig,
    ) -> Self {
        let template = PromptTemplate::new(params, config.max_words);
        debug!(template = %template.raw(), "Prompt template prepared");
        Self {
            llm,
            template,
            config,
        }
    }

    /// Produce the message body for one row, verbatim from the model.
    pub async fn generate(&self, row: &ContactRow) -> Result<String, GenerationError> {
        let prompt = self.template.render(RowFields {
            name: &row.name,
            company: &row.company,
            description: row.description.as_deref(),
        });
        debug!(name = %row.name, prompt_len = prompt.len(), "Rendering email prompt");

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| GenerationError::Llm {
                name: row.name.clone(),
                source,
            })?;

        let body = response.content.trim().to_string();
        if body.is_empty() {
            return Err(GenerationError::UnusableOutput {
                name: row.name.clone(),
                reason: "empty response".to_string(),
            });
        }
        if let Some(slot) = UNRESOLVED_SLOT.find(&body) {
            return Err(GenerationError::UnusableOutput {
                name: row.name.clone(),
                reason: format!("response still contains {}", slot.as_str()),
            });
        }

        let words = body.split_whitespace().count();
        if words > self.config.max_words {
            warn!(
                name = %row.name,
                words,
                max_words = self.config.max_words,
                "Generated email is over the word budget"
            );
        }

        Ok(body)
    }

    /// Run `generate` over the batch in row order, isolating failures per row.
    ///
    /// Results are written back by name; row order never changes.
    pub async fn generate_all(&self, batch: &mut Batch, scope: Scope) -> GenerationReport {
        let mut report = GenerationReport::default();

        for index in 0..batch.len() {
            let row = batch.rows()[index].clone();
            if scope == Scope::Outstanding && row.status == RowStatus::Generated {
                debug!(name = %row.name, status = row.status.label(), "Skipping row");
                continue;
            }
            report.attempted += 1;

            match self.generate(&row).await {
                Ok(message) => {
                    batch.set_message(&row.name, message);
                    report.generated += 1;
                }
                Err(e) => {
                    warn!(name = %row.name, error = %e, "Email generation failed");
                    batch.set_failed(&row.name, e.to_string());
                    report.failed.push(FailedRow {
                        name: row.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            generated = report.generated,
            failed = report.failed.len(),
            model = self.llm.model_name(),
            "Generation pass finished"
        );
        report
    }
}
