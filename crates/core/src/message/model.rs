//! Message model definitions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl Default for MessageRole {
    fn default() -> Self {
        Self::Assistant
    }
}

/// Kind of a persisted conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Question,
    Answer,
    FunctionCall,
    ToolResponse,
    ToolAsAnswer,
    Knowledge,
    #[serde(rename = "follow_up")]
    FlowUp,
    Verbose,
    Interrupt,
    Ack,
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Answer
    }
}

/// How `Message::content` should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Card,
    #[serde(rename = "object_string")]
    Mix,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Text
    }
}

/// One part of a multi-modal user input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputPart {
    Text { text: String },
    Image { url: String },
    File { url: String, name: Option<String> },
}

impl InputPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { url } | Self::File { url, .. } => Some(url),
        }
    }
}

/// A persisted conversation unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub section_id: i64,
    pub agent_id: i64,
    pub user_id: String,
    pub run_id: i64,
    pub role: MessageRole,
    pub message_type: MessageType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub reasoning_content: String,
    /// Model-native serialized form used to rebuild prompt history
    #[serde(default)]
    pub model_content: String,
    #[serde(default)]
    pub display_content: String,
    #[serde(default)]
    pub multi_content: Vec<InputPart>,
    /// Open extension map, see [`super::ext_keys`] for the reserved keys
    #[serde(default)]
    pub ext: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Message {
    /// Create an empty message scoped to a run
    pub fn new(conversation_id: i64, section_id: i64, agent_id: i64, run_id: i64) -> Self {
        Self {
            conversation_id,
            section_id,
            agent_id,
            run_id,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_ext(mut self, key: &str, value: impl Into<String>) -> Self {
        self.ext.insert(key.to_string(), value.into());
        self
    }

    /// Look up a non-empty extension value
    pub fn ext_value(&self, key: &str) -> Option<&str> {
        self.ext
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Partial update applied by id
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub id: i64,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub content_type: Option<ContentType>,
    pub model_content: Option<String>,
    /// Replaces the whole extension map when set
    pub ext: Option<HashMap<String, String>>,
}

impl MessagePatch {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn reasoning_content(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning_content = Some(reasoning.into());
        self
    }

    pub fn ext(mut self, ext: HashMap<String, String>) -> Self {
        self.ext = Some(ext);
        self
    }

    /// Apply the patch onto a stored message
    pub fn apply(self, message: &mut Message) {
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(reasoning) = self.reasoning_content {
            message.reasoning_content = reasoning;
        }
        if let Some(content_type) = self.content_type {
            message.content_type = content_type;
        }
        if let Some(model_content) = self.model_content {
            message.model_content = model_content;
        }
        if let Some(ext) = self.ext {
            message.ext = ext;
        }
    }
}
