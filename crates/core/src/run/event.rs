//! Client-facing events of a run
//!
//! These are transient projections of messages and run records. They are
//! sent to the client in production order and never persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::run_model::{RunError, RunRecord, RunStatus, Usage};
use crate::message::{ContentType, MessageRole, MessageType};

/// Wire projection of a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMessageItem {
    pub id: i64,
    pub conversation_id: i64,
    pub section_id: i64,
    pub agent_id: i64,
    pub run_id: i64,
    pub role: MessageRole,
    pub message_type: MessageType,
    pub content: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Id of the question message this item answers
    pub reply_id: i64,
    #[serde(default)]
    pub ext: HashMap<String, String>,
    pub is_finish: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Wire projection of a run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRunItem {
    pub id: i64,
    pub conversation_id: i64,
    pub section_id: i64,
    pub agent_id: i64,
    pub status: RunStatus,
    pub created_at: i64,
    #[serde(default)]
    pub completed_at: i64,
    #[serde(default)]
    pub failed_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl ChunkRunItem {
    /// Project a run record with the given status
    pub fn from_record(record: &RunRecord, status: RunStatus) -> Self {
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            section_id: record.section_id,
            agent_id: record.agent_id,
            status,
            created_at: record.created_at,
            completed_at: record.completed_at,
            failed_at: record.failed_at,
            usage: record.usage,
            error: record.error.clone(),
        }
    }
}

/// One event of the ordered client stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum AgentRunResponse {
    /// The input message was received and stored
    Ack(ChunkMessageItem),
    MessageDelta(ChunkMessageItem),
    MessageCompleted(ChunkMessageItem),
    Error(RunError),
    StreamDone,
    RunCreated(ChunkRunItem),
    RunInProgress(ChunkRunItem),
    RunCompleted(ChunkRunItem),
    RunFailed(ChunkRunItem),
    RunCancelled(ChunkRunItem),
}

impl AgentRunResponse {
    /// Event name as sent over SSE
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Ack(_) => "Ack",
            Self::MessageDelta(_) => "MessageDelta",
            Self::MessageCompleted(_) => "MessageCompleted",
            Self::Error(_) => "Error",
            Self::StreamDone => "StreamDone",
            Self::RunCreated(_) => "RunCreated",
            Self::RunInProgress(_) => "RunInProgress",
            Self::RunCompleted(_) => "RunCompleted",
            Self::RunFailed(_) => "RunFailed",
            Self::RunCancelled(_) => "RunCancelled",
        }
    }

    /// Message payload, if this is a message event
    pub fn message(&self) -> Option<&ChunkMessageItem> {
        match self {
            Self::Ack(item) | Self::MessageDelta(item) | Self::MessageCompleted(item) => Some(item),
            _ => None,
        }
    }

    /// Run payload, if this is a run event
    pub fn run(&self) -> Option<&ChunkRunItem> {
        match self {
            Self::RunCreated(item)
            | Self::RunInProgress(item)
            | Self::RunCompleted(item)
            | Self::RunFailed(item)
            | Self::RunCancelled(item) => Some(item),
            _ => None,
        }
    }
}
