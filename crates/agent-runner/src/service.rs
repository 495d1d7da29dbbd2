//! Entry point for callers starting and inspecting runs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use agentrun_core::message::MessageRepository;
use agentrun_core::run::{ListRunRecordMeta, RunRecord, RunRecordRepository};

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::executor::{AgentExecutor, AgentResolver, SuggestionGenerator, WorkflowExecutor};
use crate::request::AgentRunMeta;
use crate::runtime::AgentRuntime;
use crate::sink::{event_channel, RunEventStream};

/// Collaborators shared by every run
#[derive(Clone)]
pub struct RunnerDeps {
    pub agents: Arc<dyn AgentResolver>,
    pub agent_executor: Arc<dyn AgentExecutor>,
    pub workflow_executor: Arc<dyn WorkflowExecutor>,
    /// Follow-up question generator for chatflows, if any
    pub suggester: Option<Arc<dyn SuggestionGenerator>>,
    pub messages: Arc<dyn MessageRepository>,
    pub runs: Arc<dyn RunRecordRepository>,
}

pub struct AgentRunService {
    deps: RunnerDeps,
    config: RunnerConfig,
}

impl AgentRunService {
    pub fn new(deps: RunnerDeps, config: RunnerConfig) -> Self {
        Self { deps, config }
    }

    /// Start a run in the background and return its client event stream
    ///
    /// The stream ends after `StreamDone`. Cancelling `cancel` stops the run
    /// at its next suspension point and marks it cancelled.
    pub fn agent_run(&self, meta: AgentRunMeta, cancel: CancellationToken) -> RunEventStream {
        let (sink, stream) = event_channel(self.config.output_capacity, cancel.clone());
        info!(
            "Starting run for agent {} in conversation {}",
            meta.agent_id, meta.conversation_id
        );
        let runtime = AgentRuntime::new(
            self.deps.clone(),
            self.config.clone(),
            meta,
            sink,
            cancel,
        );
        tokio::spawn(runtime.run());
        stream
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>> {
        Ok(self.deps.runs.get(run_id).await?)
    }

    /// Most recent runs of a conversation section
    pub async fn list_runs(&self, filter: &ListRunRecordMeta) -> Result<Vec<RunRecord>> {
        Ok(self.deps.runs.list(filter).await?)
    }

    pub async fn delete_runs(&self, run_ids: &[i64]) -> Result<usize> {
        let deleted = self.deps.runs.delete(run_ids).await?;
        info!("Deleted {} run records", deleted);
        Ok(deleted)
    }
}
