//! Run record - Persistent execution record of one conversational turn

use serde::{Deserialize, Serialize};

/// Status of a run record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Check if the status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check whether a transition from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            Self::Created => matches!(next, Self::InProgress | Self::Failed | Self::Cancelled),
            Self::InProgress => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// Token counters of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

impl Usage {
    pub fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Structured failure attached to a failed run and to error events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub code: i32,
    pub message: String,
}

/// A persistent run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub section_id: i64,
    pub agent_id: i64,
    pub user_id: String,
    pub connector_id: i64,
    pub status: RunStatus,
    /// Final usage, attached on successful completion only
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<RunError>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub completed_at: i64,
    #[serde(default)]
    pub failed_at: i64,
}

/// Fields needed to create a run record
#[derive(Debug, Clone, Default)]
pub struct NewRunRecord {
    pub conversation_id: i64,
    pub section_id: i64,
    pub agent_id: i64,
    pub user_id: String,
    pub connector_id: i64,
}

/// Status transition written back to a run record
#[derive(Debug, Clone)]
pub struct RunRecordUpdate {
    pub id: i64,
    pub status: RunStatus,
    pub usage: Option<Usage>,
    pub error: Option<RunError>,
}

impl RunRecordUpdate {
    pub fn status(id: i64, status: RunStatus) -> Self {
        Self {
            id,
            status,
            usage: None,
            error: None,
        }
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_error(mut self, error: RunError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Filter for listing the most recent runs of a conversation section
#[derive(Debug, Clone)]
pub struct ListRunRecordMeta {
    pub conversation_id: i64,
    pub section_id: i64,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(RunStatus::Created.can_transition_to(RunStatus::InProgress));
        assert!(RunStatus::InProgress.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::InProgress.can_transition_to(RunStatus::Cancelled));
        assert!(!RunStatus::Created.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::InProgress));
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage::new(11, 19);
        assert_eq!(usage.total_tokens, 30);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&RunStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
