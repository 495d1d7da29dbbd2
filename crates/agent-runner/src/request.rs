//! Parameters of one run

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentrun_core::message::{ContentType, InputPart, MessageType};

/// A message back-filled from an external source before the run starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalMessage {
    pub message_type: MessageType,
    #[serde(default)]
    pub content_type: ContentType,
    pub content: Vec<InputPart>,
}

impl AdditionalMessage {
    pub fn question(text: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Question,
            content_type: ContentType::Text,
            content: vec![InputPart::text(text)],
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Answer,
            content_type: ContentType::Text,
            content: vec![InputPart::text(text)],
        }
    }
}

/// Everything the caller supplies for one conversational turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunMeta {
    pub conversation_id: i64,
    pub section_id: i64,
    pub agent_id: i64,
    pub user_id: String,
    pub connector_id: i64,
    pub space_id: i64,
    /// Run the draft version of the agent instead of the published one
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub version: Option<String>,
    pub content: Vec<InputPart>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub display_content: String,
    /// Ext copied onto the question message
    #[serde(default)]
    pub ext: HashMap<String, String>,
    #[serde(default)]
    pub additional_messages: Vec<AdditionalMessage>,
    /// Extra workflow inputs for workflow-backed agents
    #[serde(default)]
    pub chatflow_parameters: HashMap<String, Value>,
    #[serde(default)]
    pub custom_variables: HashMap<String, String>,
}

impl AgentRunMeta {
    /// Text-only turn
    pub fn text(
        conversation_id: i64,
        section_id: i64,
        agent_id: i64,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            section_id,
            agent_id,
            user_id: user_id.into(),
            content: vec![InputPart::text(text)],
            ..Self::default()
        }
    }

    /// First text part of the input, empty if there is none
    pub fn first_text(&self) -> &str {
        self.content
            .iter()
            .find_map(InputPart::as_text)
            .unwrap_or("")
    }
}
