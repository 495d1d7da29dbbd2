//! Upstream event types produced by agent and workflow executors

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentrun_core::message::InputPart;
use agentrun_core::run::Usage;

use crate::interrupt::{AgentInterrupt, InterruptEvent};
use crate::stream::StreamReader;

/// Extra key flagging the last chunk of a tool mid-answer segment
pub const EXTRA_IS_FINISH: &str = "is_finish";
/// Extra key carrying the name of the workflow node that produced a chunk
pub const EXTRA_NODE_NAME: &str = "workflow_node_name";

/// Role of a model-native message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    System,
    User,
    #[default]
    Assistant,
    Tool,
}

/// Function invocation inside a tool call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A tool call requested by the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    pub function: FunctionInvocation,
}

/// Model-native message, also the shape of prompt history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: ModelRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_content: Vec<InputPart>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ModelMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::Assistant,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::User,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::default()
        }
    }
}

/// One element of a nested answer stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageChunk {
    pub content: String,
    pub reasoning_content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub extra: HashMap<String, Value>,
}

impl MessageChunk {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning_content: reasoning.into(),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Whether this chunk closes the current mid-answer segment
    pub fn is_finish(&self) -> bool {
        matches!(self.extra.get(EXTRA_IS_FINISH), Some(Value::Bool(true)))
    }

    /// Name of the workflow node that produced the chunk, if any
    pub fn node_name(&self) -> Option<&str> {
        self.extra.get(EXTRA_NODE_NAME).and_then(Value::as_str)
    }
}

/// Model turn that requested tool calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallEvent {
    pub message: ModelMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A recalled knowledge slice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub meta_data: HashMap<String, Value>,
}

impl KnowledgeDocument {
    /// String metadata value, empty when absent
    pub fn meta_str(&self, key: &str) -> &str {
        self.meta_data.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

/// Events emitted by an agent executor
#[derive(Debug)]
pub enum AgentEvent {
    FunctionCall(FunctionCallEvent),
    ToolResponse(Vec<ModelMessage>),
    /// Streamed output of a tool, possibly split into finished segments
    ToolMidAnswer(StreamReader<MessageChunk>),
    /// Tool output streamed as the answer itself
    ToolAsAnswer(StreamReader<MessageChunk>),
    ModelAnswer(StreamReader<MessageChunk>),
    Knowledge(Vec<KnowledgeDocument>),
    /// Follow-up suggestion
    Suggest(String),
    Interrupt(AgentInterrupt),
    /// An event type this runner does not know
    Unrecognized { event_type: String },
}

impl AgentEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::FunctionCall(_) => "function_call",
            Self::ToolResponse(_) => "tool_response",
            Self::ToolMidAnswer(_) => "tool_mid_answer",
            Self::ToolAsAnswer(_) => "tool_as_answer",
            Self::ModelAnswer(_) => "model_answer",
            Self::Knowledge(_) => "knowledge",
            Self::Suggest(_) => "suggest",
            Self::Interrupt(_) => "interrupt",
            Self::Unrecognized { event_type } => event_type,
        }
    }
}

/// Run-level phase of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Success,
    Failed,
    Cancel,
    Interrupted,
}

/// Typed error reported by the workflow engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub code: i64,
    pub message: String,
}

/// Run-level workflow update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub execute_id: i64,
    pub space_id: i64,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub interrupt_event: Option<InterruptEvent>,
    #[serde(default)]
    pub last_error: Option<WorkflowError>,
}

impl StateMessage {
    pub fn new(execute_id: i64, status: WorkflowStatus) -> Self {
        Self {
            execute_id,
            space_id: 0,
            status,
            usage: None,
            interrupt_event: None,
            last_error: None,
        }
    }
}

/// Kind of node that produced a data message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Entry,
    Exit,
    Llm,
    OutputEmitter,
    InputReceiver,
    Question,
    SubWorkflow,
    Other,
}

impl NodeType {
    /// Nodes whose output only surfaces through interrupts
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::InputReceiver | Self::Question)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Answer,
    FunctionCall,
    ToolResponse,
}

/// Node-level content delta of a workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    pub node_type: NodeType,
    pub data_type: DataType,
    pub content: String,
    /// Last chunk of this node's answer
    pub last: bool,
    pub role: ModelRole,
}

impl DataMessage {
    pub fn answer(node_type: NodeType, content: impl Into<String>, last: bool) -> Self {
        Self {
            node_type,
            data_type: DataType::Answer,
            content: content.into(),
            last,
            role: ModelRole::Assistant,
        }
    }
}

/// Events emitted by a workflow executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowMessage {
    State(StateMessage),
    Data(DataMessage),
}
