//! Session-wide campaign inputs shared by every generated email.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What the sender is asking for.
///
/// The three common purposes are named; anything else is free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Goal {
    Internship,
    Mentorship,
    Advice,
    Other(String),
}

impl Goal {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Internship => "Internship",
            Self::Mentorship => "Mentorship",
            Self::Advice => "Advice",
            Self::Other(s) => s,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<String> for Goal {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "internship" => Self::Internship,
            "mentorship" => Self::Mentorship,
            "advice" => Self::Advice,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<Goal> for String {
    fn from(goal: Goal) -> Self {
        goal.as_str().to_string()
    }
}

impl std::fmt::Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Goal, field/role and sender bio. Fixed for the duration of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignParameters {
    pub goal: Goal,
    pub field: String,
    pub sender_bio: String,
}

impl CampaignParameters {
    pub fn new(goal: impl Into<String>, field: impl Into<String>, sender_bio: impl Into<String>) -> Self {
        Self {
            goal: Goal::from(goal.into()),
            field: field.into().trim().to_string(),
            sender_bio: sender_bio.into().trim().to_string(),
        }
    }

    /// All three inputs must be non-blank before any row is processed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        if self.goal.is_blank() {
            missing.push("goal".to_string());
        }
        if self.field.trim().is_empty() {
            missing.push("field".to_string());
        }
        if self.sender_bio.trim().is_empty() {
            missing.push("sender_bio".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::IncompleteCampaign { missing })
        }
    }

    /// Subject line for a message to someone at `company`.
    pub fn subject_for(&self, company: &str) -> String {
        format!(
            "Passionate About {}: {} Inquiry for {}",
            self.field, self.goal, company
        )
    }
}
