//! Error types for agent-runner

use thiserror::Error;

use crate::config::RunMode;

/// Result type alias for run operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Numeric codes carried by `RunError`
pub mod codes {
    /// Code of every client-facing `Error` event
    pub const AGENT_RUN: i32 = 720_701_001;
    /// Generic failure recorded on a failed run
    pub const RUN_FAILED: i32 = 720_701_002;
    pub const AGENT_NOT_FOUND: i32 = 720_701_003;
    pub const WORKFLOW_NOT_FOUND: i32 = 720_701_004;
    pub const UNKNOWN_EVENT_TYPE: i32 = 720_701_005;
    pub const UNKNOWN_INTERRUPT_TYPE: i32 = 720_701_006;
    pub const INTERRUPT_DATA_EMPTY: i32 = 720_701_007;
    pub const WORKFLOW_FAILED: i32 = 720_701_008;
    pub const CANCELLED: i32 = 720_701_009;
}

/// Message shown to clients in release mode for internal errors
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Errors that can occur while driving a run
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The agent could not be resolved for the given identity
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: i64 },

    /// A workflow-backed agent has no workflow bound
    #[error("Workflow not found for agent {agent_id}")]
    WorkflowNotFound { agent_id: i64 },

    /// The agent stream produced an event outside the closed event set
    #[error("Unknown event type: {event_type}")]
    UnknownEventType { event_type: String },

    #[error("Unknown interrupt type: {interrupt_type}")]
    UnknownInterruptType { interrupt_type: String },

    #[error("Interrupt data is empty")]
    InterruptDataEmpty,

    /// Error reported by an upstream executor stream
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// Typed error reported by the workflow engine
    #[error("Workflow error {code}: {message}")]
    Workflow { code: i64, message: String },

    #[error("Workflow reported failure without an error")]
    MissingWorkflowError,

    #[error("Workflow reported an interrupt without an interrupt event")]
    MissingInterruptEvent,

    /// The run was cancelled before it finished
    #[error("Run cancelled")]
    Cancelled,

    /// Message or run record store failure
    #[error("Store error: {0}")]
    Store(#[from] agentrun_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RunnerError {
    /// Create an Upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create an UnknownInterruptType error
    pub fn unknown_interrupt(interrupt_type: impl Into<String>) -> Self {
        Self::UnknownInterruptType {
            interrupt_type: interrupt_type.into(),
        }
    }

    /// Numeric code recorded on the failed run
    pub fn code(&self) -> i32 {
        match self {
            Self::AgentNotFound { .. } => codes::AGENT_NOT_FOUND,
            Self::WorkflowNotFound { .. } => codes::WORKFLOW_NOT_FOUND,
            Self::UnknownEventType { .. } => codes::UNKNOWN_EVENT_TYPE,
            Self::UnknownInterruptType { .. } => codes::UNKNOWN_INTERRUPT_TYPE,
            Self::InterruptDataEmpty => codes::INTERRUPT_DATA_EMPTY,
            Self::Workflow { .. } | Self::MissingWorkflowError | Self::MissingInterruptEvent => {
                codes::WORKFLOW_FAILED
            }
            Self::Cancelled => codes::CANCELLED,
            Self::Upstream { .. } | Self::Store(_) | Self::Serialization(_) => codes::RUN_FAILED,
        }
    }

    /// Whether the message is meant for end users
    pub fn is_status_error(&self) -> bool {
        matches!(
            self,
            Self::AgentNotFound { .. }
                | Self::WorkflowNotFound { .. }
                | Self::UnknownEventType { .. }
                | Self::UnknownInterruptType { .. }
                | Self::InterruptDataEmpty
                | Self::Workflow { .. }
                | Self::Cancelled
        )
    }

    /// Text surfaced to the client in an `Error` event
    ///
    /// Status errors always show their message. Everything else shows the raw
    /// error only in debug mode.
    pub fn client_message(&self, mode: RunMode) -> String {
        if self.is_status_error() || mode == RunMode::Debug {
            return self.to_string();
        }
        INTERNAL_ERROR_MESSAGE.to_string()
    }
}
