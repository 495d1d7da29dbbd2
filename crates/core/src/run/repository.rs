//! Run record repository trait

use async_trait::async_trait;

use super::run_model::{ListRunRecordMeta, NewRunRecord, RunRecord, RunRecordUpdate};
use crate::Result;

/// Repository interface for run records
#[async_trait]
pub trait RunRecordRepository: Send + Sync {
    /// Create a run record in `Created` status
    async fn create(&self, record: NewRunRecord) -> Result<RunRecord>;

    /// Get a run record by ID
    async fn get(&self, id: i64) -> Result<Option<RunRecord>>;

    /// List run records of a conversation section, most recent first, at most `limit`
    async fn list(&self, filter: &ListRunRecordMeta) -> Result<Vec<RunRecord>>;

    /// Apply a status transition
    async fn update(&self, update: RunRecordUpdate) -> Result<RunRecord>;

    /// Delete run records, returning how many existed
    async fn delete(&self, ids: &[i64]) -> Result<usize>;
}
