//! Collaborator traits consumed by the runner
//!
//! The model executor, the workflow engine, agent metadata and suggestion
//! generation live outside this crate. The runner only sees these traits.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::event::{AgentEvent, ModelMessage, WorkflowMessage};
use crate::interrupt::{AgentInterrupt, InterruptEvent};
use crate::stream::StreamReader;

/// How an agent produces its answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BotMode {
    #[default]
    SingleAgent,
    /// Answers come from a bound workflow (chatflow)
    Workflow,
}

/// Lookup key of an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: i64,
    pub is_draft: bool,
    pub connector_id: i64,
    pub version: Option<String>,
}

/// Resolved agent metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentInfo {
    pub agent_id: i64,
    pub name: String,
    pub mode: BotMode,
    pub workflow_id: Option<i64>,
    /// Number of past runs fed back as history
    pub history_rounds: Option<usize>,
    /// Generate follow-up suggestions after chatflow answers
    pub suggest_enabled: bool,
}

#[async_trait]
pub trait AgentResolver: Send + Sync {
    /// Resolve an agent, `None` if it does not exist for this identity
    async fn obtain_agent(&self, identity: &AgentIdentity) -> Result<Option<AgentInfo>>;
}

/// Input of a model-based agent execution
#[derive(Debug, Clone, Default)]
pub struct AgentExecuteRequest {
    pub agent_id: i64,
    pub space_id: i64,
    pub is_draft: bool,
    pub version: Option<String>,
    pub user_id: String,
    pub conversation_id: i64,
    pub connector_id: i64,
    pub custom_variables: HashMap<String, String>,
    /// The new user input, or the resume data when resuming
    pub input: ModelMessage,
    pub history: Vec<ModelMessage>,
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn stream_execute(&self, request: AgentExecuteRequest)
        -> Result<StreamReader<AgentEvent>>;

    /// Continue an interrupted execution, `request.input` carries the answer
    async fn stream_resume(
        &self,
        request: AgentExecuteRequest,
        interrupt: AgentInterrupt,
    ) -> Result<StreamReader<AgentEvent>>;
}

/// Execution settings of a workflow run
#[derive(Debug, Clone, Default)]
pub struct WorkflowExecuteConfig {
    pub workflow_id: i64,
    pub connector_id: i64,
    pub connector_uid: String,
    pub agent_id: i64,
    pub conversation_id: Option<i64>,
    pub section_id: Option<i64>,
    pub init_round_id: Option<i64>,
    pub round_id: Option<i64>,
    pub user_message: Option<ModelMessage>,
    pub max_history_rounds: Option<usize>,
}

/// Request to resume an interrupted workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowResumeRequest {
    pub resume_data: String,
    pub event_id: i64,
    pub execute_id: i64,
}

impl WorkflowResumeRequest {
    pub fn new(resume_data: String, execute_id: i64, event: &InterruptEvent) -> Self {
        Self {
            resume_data,
            event_id: event.id,
            execute_id,
        }
    }
}

#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn stream_execute(
        &self,
        config: WorkflowExecuteConfig,
        input: HashMap<String, Value>,
    ) -> Result<StreamReader<WorkflowMessage>>;

    async fn stream_resume(
        &self,
        request: WorkflowResumeRequest,
        config: WorkflowExecuteConfig,
    ) -> Result<StreamReader<WorkflowMessage>>;
}

/// Input of follow-up suggestion generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestRequest {
    pub agent_id: i64,
    pub question: String,
    pub answer: String,
}

#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    async fn suggest(&self, request: SuggestRequest) -> Result<Vec<String>>;
}
