//! File-based message storage implementation
//!
//! Stores messages as JSON in a file on disk, or purely in memory.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::model::{Message, MessagePatch};
use super::repository::MessageRepository;
use crate::clock::now_millis;
use crate::{Error, Result};

/// Message store keyed by id
///
/// Ids are allocated from a monotonically increasing counter, so id order
/// is also reservation order.
pub struct FileMessageStore {
    /// Path to the JSON file, `None` keeps everything in memory
    path: Option<PathBuf>,
    /// Rows by id
    cache: RwLock<BTreeMap<i64, Message>>,
    /// Next id to hand out
    next_id: AtomicI64,
}

impl FileMessageStore {
    /// Create a store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cache: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Open a store backed by a JSON file
    ///
    /// If the file doesn't exist, it will be created on first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache: BTreeMap<i64, Message> = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let messages: Vec<Message> = serde_json::from_str(&content)?;
            messages.into_iter().map(|m| (m.id, m)).collect()
        } else {
            BTreeMap::new()
        };
        let next_id = cache.keys().next_back().copied().unwrap_or(0) + 1;

        Ok(Self {
            path: Some(path),
            cache: RwLock::new(cache),
            next_id: AtomicI64::new(next_id),
        })
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Persist the cache to disk
    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = {
            let cache = self.cache.read().await;
            let messages: Vec<&Message> = cache.values().collect();
            serde_json::to_string_pretty(&messages)?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        debug!("Persisted messages to {}", path.display());
        Ok(())
    }

    fn stamp(&self, mut message: Message) -> Message {
        let now = now_millis();
        if message.id == 0 {
            message.id = self.allocate_id();
        }
        if message.created_at == 0 {
            message.created_at = now;
        }
        message.updated_at = now;
        message
    }
}

#[async_trait]
impl MessageRepository for FileMessageStore {
    async fn pre_create(&self, mut message: Message) -> Result<Message> {
        message.id = 0;
        message.created_at = 0;
        Ok(self.stamp(message))
    }

    async fn create(&self, message: Message) -> Result<Message> {
        let message = self.stamp(message);
        {
            let mut cache = self.cache.write().await;
            cache.insert(message.id, message.clone());
        }
        self.persist().await?;
        Ok(message)
    }

    async fn batch_create(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let stamped: Vec<Message> = messages.into_iter().map(|m| self.stamp(m)).collect();
        {
            let mut cache = self.cache.write().await;
            for message in &stamped {
                cache.insert(message.id, message.clone());
            }
        }
        self.persist().await?;
        Ok(stamped)
    }

    async fn edit(&self, patch: MessagePatch) -> Result<Message> {
        let updated = {
            let mut cache = self.cache.write().await;
            let message = cache
                .get_mut(&patch.id)
                .ok_or(Error::MessageNotFound(patch.id))?;
            patch.apply(message);
            message.updated_at = now_millis();
            message.clone()
        };
        self.persist().await?;
        Ok(updated)
    }

    async fn get_by_run_ids(&self, conversation_id: i64, run_ids: &[i64]) -> Result<Vec<Message>> {
        let cache = self.cache.read().await;
        Ok(cache
            .values()
            .filter(|m| m.conversation_id == conversation_id && run_ids.contains(&m.run_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageRole, MessageType};
    use tempfile::TempDir;

    async fn create_test_store() -> (FileMessageStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("messages.json");
        let store = FileMessageStore::open(&path).await.unwrap();
        (store, temp_dir)
    }

    fn answer(run_id: i64) -> Message {
        Message::new(7, 1, 1, run_id)
            .with_role(MessageRole::Assistant)
            .with_type(MessageType::Answer)
    }

    #[tokio::test]
    async fn test_pre_create_reserves_id_without_row() {
        let store = FileMessageStore::in_memory();

        let draft = store.pre_create(answer(1)).await.unwrap();
        assert!(draft.id > 0);
        assert!(draft.created_at > 0);

        let rows = store.get_by_run_ids(7, &[1]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_create_overwrites_reserved_row() {
        let store = FileMessageStore::in_memory();

        let draft = store.pre_create(answer(1)).await.unwrap();
        store
            .create(draft.clone().with_content("partial"))
            .await
            .unwrap();
        store.create(draft.clone().with_content("full")).await.unwrap();

        let rows = store.get_by_run_ids(7, &[1]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, draft.id);
        assert_eq!(rows[0].content, "full");
        assert_eq!(rows[0].created_at, draft.created_at);
    }

    #[tokio::test]
    async fn test_edit_missing_message() {
        let store = FileMessageStore::in_memory();

        let result = store.edit(MessagePatch::new(42).reasoning_content("x")).await;
        match result {
            Err(Error::MessageNotFound(id)) => assert_eq!(id, 42),
            other => panic!("Expected MessageNotFound, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_by_run_ids_filters_and_orders() {
        let store = FileMessageStore::in_memory();

        let late = store.pre_create(answer(1)).await.unwrap();
        store.create(answer(2).with_content("other run")).await.unwrap();
        store.create(answer(1).with_content("first")).await.unwrap();
        store.create(late.with_content("reserved earlier")).await.unwrap();
        store
            .create(Message::new(99, 1, 1, 1).with_content("other conversation"))
            .await
            .unwrap();

        let rows = store.get_by_run_ids(7, &[1]).await.unwrap();
        let contents: Vec<&str> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["reserved earlier", "first"]);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("messages.json");

        let first_id;
        {
            let store = FileMessageStore::open(&path).await.unwrap();
            let saved = store
                .batch_create(vec![answer(1).with_content("a"), answer(1).with_content("b")])
                .await
                .unwrap();
            first_id = saved[0].id;
        }

        {
            let store = FileMessageStore::open(&path).await.unwrap();
            let rows = store.get_by_run_ids(7, &[1]).await.unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].id, first_id);

            let next = store.create(answer(1)).await.unwrap();
            assert!(next.id > rows[1].id);
        }
    }

    #[tokio::test]
    async fn test_file_store_edit_persists() {
        let (store, _temp) = create_test_store().await;

        let saved = store.create(answer(3).with_content("hi")).await.unwrap();
        let edited = store
            .edit(MessagePatch::new(saved.id).reasoning_content("because"))
            .await
            .unwrap();

        assert_eq!(edited.content, "hi");
        assert_eq!(edited.reasoning_content, "because");
    }
}
