//! Per-run state shared by the codec and the handler

use std::sync::Arc;
use std::time::Instant;

use agentrun_core::run::RunRecord;

use crate::config::RunMode;
use crate::executor::AgentInfo;
use crate::request::AgentRunMeta;

/// Immutable facts about the run being driven
#[derive(Debug, Clone)]
pub struct RunContext {
    pub meta: Arc<AgentRunMeta>,
    pub agent: Arc<AgentInfo>,
    pub run: RunRecord,
    /// Id of the persisted question, 0 until the input is stored
    pub question_id: i64,
    pub started: Instant,
    pub run_mode: RunMode,
}

impl RunContext {
    pub fn new(
        meta: Arc<AgentRunMeta>,
        agent: Arc<AgentInfo>,
        run: RunRecord,
        started: Instant,
        run_mode: RunMode,
    ) -> Self {
        Self {
            meta,
            agent,
            run,
            question_id: 0,
            started,
            run_mode,
        }
    }

    /// Seconds since the run started, one decimal
    pub fn time_cost(&self) -> String {
        format!("{:.1}", self.started.elapsed().as_millis() as f64 / 1000.0)
    }
}
