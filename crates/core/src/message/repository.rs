//! Message repository trait
//!
//! Defines the interface for message storage operations.

use async_trait::async_trait;

use super::model::{Message, MessagePatch};
use crate::Result;

/// Repository interface for conversation messages
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Reserve an id and timestamps for a message whose content is not known yet.
    ///
    /// Nothing becomes visible until the returned message is passed to `create`.
    async fn pre_create(&self, message: Message) -> Result<Message>;

    /// Persist a message.
    ///
    /// A message carrying a reserved id overwrites the row with that id.
    async fn create(&self, message: Message) -> Result<Message>;

    /// Persist several messages in order
    async fn batch_create(&self, messages: Vec<Message>) -> Result<Vec<Message>>;

    /// Update selected fields of an existing message
    async fn edit(&self, patch: MessagePatch) -> Result<Message>;

    /// Get all messages of the given runs, oldest first
    async fn get_by_run_ids(&self, conversation_id: i64, run_ids: &[i64]) -> Result<Vec<Message>>;
}
