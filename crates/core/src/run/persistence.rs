//! Run record persistence - Store run records as JSON on disk or in memory

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::repository::RunRecordRepository;
use super::run_model::{ListRunRecordMeta, NewRunRecord, RunRecord, RunRecordUpdate, RunStatus};
use crate::clock::now_millis;
use crate::{Error, Result};

/// Run record store keyed by id
pub struct FileRunRecordStore {
    /// Path to the JSON file, `None` keeps everything in memory
    path: Option<PathBuf>,
    cache: RwLock<BTreeMap<i64, RunRecord>>,
    next_id: AtomicI64,
}

impl FileRunRecordStore {
    /// Create a store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cache: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Open a store backed by a JSON file
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache: BTreeMap<i64, RunRecord> = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let records: Vec<RunRecord> = serde_json::from_str(&content)?;
            records.into_iter().map(|r| (r.id, r)).collect()
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

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = {
            let cache = self.cache.read().await;
            let records: Vec<&RunRecord> = cache.values().collect();
            serde_json::to_string_pretty(&records)?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        debug!("Persisted run records to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl RunRecordRepository for FileRunRecordStore {
    async fn create(&self, record: NewRunRecord) -> Result<RunRecord> {
        let now = now_millis();
        let record = RunRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            conversation_id: record.conversation_id,
            section_id: record.section_id,
            agent_id: record.agent_id,
            user_id: record.user_id,
            connector_id: record.connector_id,
            status: RunStatus::Created,
            usage: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: 0,
            failed_at: 0,
        };
        {
            let mut cache = self.cache.write().await;
            cache.insert(record.id, record.clone());
        }
        self.persist().await?;
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<RunRecord>> {
        let cache = self.cache.read().await;
        Ok(cache.get(&id).cloned())
    }

    async fn list(&self, filter: &ListRunRecordMeta) -> Result<Vec<RunRecord>> {
        if filter.limit == 0 {
            return Ok(Vec::new());
        }
        let cache = self.cache.read().await;
        // Ids are allocated in creation order, so reverse id order is newest first
        Ok(cache
            .values()
            .rev()
            .filter(|r| {
                r.conversation_id == filter.conversation_id && r.section_id == filter.section_id
            })
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn update(&self, update: RunRecordUpdate) -> Result<RunRecord> {
        let updated = {
            let mut cache = self.cache.write().await;
            let record = cache
                .get_mut(&update.id)
                .ok_or(Error::RunRecordNotFound(update.id))?;

            if !record.status.can_transition_to(update.status) {
                return Err(Error::InvalidInput(format!(
                    "Run {} cannot move from {:?} to {:?}",
                    record.id, record.status, update.status
                )));
            }

            let now = now_millis();
            record.status = update.status;
            record.updated_at = now;
            match update.status {
                RunStatus::Completed => {
                    record.completed_at = now;
                    record.usage = update.usage;
                }
                RunStatus::Failed | RunStatus::Cancelled => {
                    record.failed_at = now;
                    record.error = update.error;
                }
                RunStatus::Created | RunStatus::InProgress => {}
            }
            record.clone()
        };
        self.persist().await?;
        Ok(updated)
    }

    async fn delete(&self, ids: &[i64]) -> Result<usize> {
        let removed = {
            let mut cache = self.cache.write().await;
            ids.iter().filter(|id| cache.remove(*id).is_some()).count()
        };
        if removed < ids.len() {
            warn!("Deleted {} of {} requested run records", removed, ids.len());
        }
        self.persist().await?;
        Ok(removed)
    }
}
