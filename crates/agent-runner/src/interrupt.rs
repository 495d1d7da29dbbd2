//! Interrupt rendering and resume descriptor recovery
//!
//! An interrupt is rendered into a client-facing answer (plain text or a
//! card) and its descriptor is stored as JSON in the `resume_info` ext of a
//! hidden Verbose message. The next turn scans history back to the latest
//! question to find that anchor and resume instead of starting over.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use agentrun_core::message::{ext_keys, ContentType, Message, MessageType};

use crate::error::{Result, RunnerError};

/// Kind of interruption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptEventType {
    OauthPlugin,
    Question,
    InputNode,
    WorkflowLlm,
}

impl InterruptEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OauthPlugin => "oauth_plugin",
            Self::Question => "question",
            Self::InputNode => "input_node",
            Self::WorkflowLlm => "workflow_llm",
        }
    }
}

/// Interrupt raised by a workflow called as a tool inside a model turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInterruptEvent {
    pub event_type: InterruptEventType,
    pub interrupt_data: String,
}

/// Kind-specific interrupt payload of an agent interrupt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterruptPayload {
    /// A plugin needs OAuth approval, `message` is the prompt to show
    OauthPlugin { message: String },
    Question { data: String },
    InputNode { data: String },
    WorkflowLlm { event: ToolInterruptEvent },
}

impl InterruptPayload {
    pub fn kind(&self) -> InterruptEventType {
        match self {
            Self::OauthPlugin { .. } => InterruptEventType::OauthPlugin,
            Self::Question { .. } => InterruptEventType::Question,
            Self::InputNode { .. } => InterruptEventType::InputNode,
            Self::WorkflowLlm { .. } => InterruptEventType::WorkflowLlm,
        }
    }
}

/// Interrupt raised by an agent executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInterrupt {
    /// Tool call that triggered the interrupt
    pub tool_call_id: String,
    pub interrupt_id: String,
    pub payload: InterruptPayload,
}

/// Interrupt event in the workflow engine's own shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptEvent {
    pub id: i64,
    pub event_type: InterruptEventType,
    #[serde(default)]
    pub interrupt_data: String,
    #[serde(default)]
    pub tool_interrupt_event: Option<ToolInterruptEvent>,
}

/// Descriptor of a paused run, stored in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResumeInfo {
    Agent(AgentInterrupt),
    Workflow { execute_id: i64, event: InterruptEvent },
}

impl ResumeInfo {
    /// Id of the tool call or workflow event that triggered the interrupt
    pub fn trigger_id(&self) -> String {
        match self {
            Self::Agent(interrupt) => interrupt.tool_call_id.clone(),
            Self::Workflow { event, .. } => event.id.to_string(),
        }
    }

    pub fn kind(&self) -> InterruptEventType {
        match self {
            Self::Agent(interrupt) => interrupt.payload.kind(),
            Self::Workflow { event, .. } => event.event_type,
        }
    }
}

/// Client-facing form of an interrupt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedInterrupt {
    pub content: String,
    pub content_type: ContentType,
}

impl RenderedInterrupt {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Text,
        }
    }

    fn card(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Card,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuestionData {
    #[serde(default)]
    messages: Vec<QuestionMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuestionMessage {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    message_type: String,
    content_type: String,
    #[serde(default)]
    content: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
}

/// Render a question node payload
///
/// A bare text message becomes plain text; option lists and form schemas
/// are passed through as a card.
fn render_question(data: &str) -> Result<RenderedInterrupt> {
    let parsed: QuestionData = serde_json::from_str(data)?;
    let Some(first) = parsed.messages.into_iter().next() else {
        return Err(RunnerError::InterruptDataEmpty);
    };

    match first.content_type.as_str() {
        "text" => match &first.content {
            Value::String(text) => Ok(RenderedInterrupt::text(text.clone())),
            other => Ok(RenderedInterrupt::text(other.to_string())),
        },
        "option" | "form_schema" => Ok(RenderedInterrupt::card(serde_json::to_string(&first)?)),
        other => Err(RunnerError::unknown_interrupt(format!(
            "question content type {}",
            other
        ))),
    }
}

fn render_input_node(data: &str) -> RenderedInterrupt {
    RenderedInterrupt::card(data)
}

fn render_tool_interrupt(event: &ToolInterruptEvent) -> Result<RenderedInterrupt> {
    match event.event_type {
        InterruptEventType::Question => render_question(&event.interrupt_data),
        InterruptEventType::InputNode => Ok(render_input_node(&event.interrupt_data)),
        other => Err(RunnerError::unknown_interrupt(other.as_str())),
    }
}

/// Render an agent interrupt for the client
pub fn render_agent_interrupt(interrupt: &AgentInterrupt) -> Result<RenderedInterrupt> {
    match &interrupt.payload {
        InterruptPayload::OauthPlugin { message } => Ok(RenderedInterrupt::text(message.clone())),
        InterruptPayload::Question { data } => render_question(data),
        InterruptPayload::InputNode { data } => Ok(render_input_node(data)),
        InterruptPayload::WorkflowLlm { event } => render_tool_interrupt(event),
    }
}

/// Render a workflow interrupt event for the client
///
/// OAuth interrupts cannot come from a workflow directly.
pub fn render_workflow_interrupt(event: &InterruptEvent) -> Result<RenderedInterrupt> {
    match event.event_type {
        InterruptEventType::Question => render_question(&event.interrupt_data),
        InterruptEventType::InputNode => Ok(render_input_node(&event.interrupt_data)),
        InterruptEventType::WorkflowLlm => match &event.tool_interrupt_event {
            Some(tool_event) => render_tool_interrupt(tool_event),
            None => Err(RunnerError::unknown_interrupt("workflow_llm without tool event")),
        },
        InterruptEventType::OauthPlugin => Err(RunnerError::unknown_interrupt(
            InterruptEventType::OauthPlugin.as_str(),
        )),
    }
}

/// Find the resume descriptor of the previous turn
///
/// Scans `history` (oldest first) backwards and stops at the most recent
/// question. Returns `None` if no anchor sits after that question or the
/// anchor cannot be decoded.
pub fn parse_resume_info(history: &[Message]) -> Option<ResumeInfo> {
    let mut found = None;
    for message in history.iter().rev() {
        if message.message_type == MessageType::Question {
            break;
        }
        if message.message_type != MessageType::Verbose {
            continue;
        }
        let Some(raw) = message.ext_value(ext_keys::RESUME_INFO) else {
            continue;
        };
        match serde_json::from_str::<ResumeInfo>(raw) {
            Ok(info) => found = Some(info),
            Err(err) => {
                warn!("Ignoring undecodable resume info on message {}: {}", message.id, err);
                return None;
            }
        }
    }
    found
}
