//! Workflow state machine: which step of the outreach flow a session is in.

use serde::{Deserialize, Serialize};

/// Phases of a session.
///
/// Progresses AwaitingCredential → AwaitingParameters → AwaitingUpload →
/// Reviewing, then loops Reviewing ⇄ Dispatching for each confirmed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    AwaitingCredential,
    AwaitingParameters,
    AwaitingUpload,
    Reviewing,
    Dispatching,
}

impl WorkflowPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WorkflowPhase) -> bool {
        use WorkflowPhase::*;
        matches!(
            (self, target),
            (AwaitingCredential, AwaitingParameters)
                | (AwaitingParameters, AwaitingUpload)
                | (AwaitingUpload, Reviewing)
                | (Reviewing, Dispatching)
                | (Dispatching, Reviewing)
        )
    }

    /// Whether a provider credential has been accepted.
    pub fn has_credential(&self) -> bool {
        !matches!(self, Self::AwaitingCredential)
    }

    /// Whether campaign parameters may be (re)submitted.
    pub fn accepts_campaign(&self) -> bool {
        matches!(
            self,
            Self::AwaitingParameters | Self::AwaitingUpload | Self::Reviewing
        )
    }

    /// Whether a CSV upload is accepted.
    pub fn accepts_upload(&self) -> bool {
        matches!(self, Self::AwaitingUpload | Self::Reviewing)
    }
}

impl Default for WorkflowPhase {
    fn default() -> Self {
        Self::AwaitingCredential
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingCredential => "awaiting_credential",
            Self::AwaitingParameters => "awaiting_parameters",
            Self::AwaitingUpload => "awaiting_upload",
            Self::Reviewing => "reviewing",
            Self::Dispatching => "dispatching",
        };
        write!(f, "{s}")
    }
}
