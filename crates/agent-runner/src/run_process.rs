//! Run record status transitions and their client events

use std::sync::Arc;

use tracing::{error, info};

use agentrun_core::run::{
    AgentRunResponse, ChunkRunItem, RunError, RunRecord, RunRecordRepository, RunRecordUpdate,
    RunStatus, Usage,
};

use crate::error::Result;
use crate::sink::EventSink;

/// Moves a run record through its lifecycle and reports each step
pub struct RunProcess {
    runs: Arc<dyn RunRecordRepository>,
    sink: EventSink,
}

impl RunProcess {
    pub fn new(runs: Arc<dyn RunRecordRepository>, sink: EventSink) -> Self {
        Self { runs, sink }
    }

    /// Start a freshly created run
    ///
    /// Nothing reaches the client unless the record made it to `InProgress`;
    /// `RunCreated` and `RunInProgress` are then sent back to back.
    pub async fn step_to_in_progress(&self, record: &RunRecord) -> Result<RunRecord> {
        let updated = self
            .runs
            .update(RunRecordUpdate::status(record.id, RunStatus::InProgress))
            .await?;
        info!("Run {} in progress", updated.id);
        self.sink
            .run_event(
                AgentRunResponse::RunCreated,
                ChunkRunItem::from_record(record, RunStatus::Created),
            )
            .await;
        self.sink
            .run_event(
                AgentRunResponse::RunInProgress,
                ChunkRunItem::from_record(&updated, RunStatus::InProgress),
            )
            .await;
        Ok(updated)
    }

    /// Mark the run completed, attaching the final usage
    pub async fn step_to_complete(&self, record: &RunRecord, usage: Option<Usage>) {
        let update = RunRecordUpdate::status(record.id, RunStatus::Completed).with_usage(usage);
        self.finish(record, update, AgentRunResponse::RunCompleted)
            .await;
    }

    pub async fn step_to_failed(&self, record: &RunRecord, run_error: RunError) {
        let update = RunRecordUpdate::status(record.id, RunStatus::Failed).with_error(run_error);
        self.finish(record, update, AgentRunResponse::RunFailed).await;
    }

    pub async fn step_to_cancelled(&self, record: &RunRecord) {
        let update = RunRecordUpdate::status(record.id, RunStatus::Cancelled);
        self.finish(record, update, AgentRunResponse::RunCancelled)
            .await;
    }

    async fn finish(
        &self,
        record: &RunRecord,
        update: RunRecordUpdate,
        event: fn(ChunkRunItem) -> AgentRunResponse,
    ) {
        let status = update.status;
        let item = match self.runs.update(update.clone()).await {
            Ok(updated) => {
                info!("Run {} finished as {:?}", updated.id, status);
                ChunkRunItem::from_record(&updated, status)
            }
            Err(err) => {
                // Still report the outcome, the record keeps its previous state
                error!("Failed to mark run {} as {:?}: {}", record.id, status, err);
                let mut item = ChunkRunItem::from_record(record, status);
                item.usage = update.usage;
                item.error = update.error;
                item
            }
        };
        self.sink.run_event(event, item).await;
    }
}
