//! Run lifecycle controller
//!
//! Prepares a run (agent, back-filled messages, history, run record), hands
//! it to the agent pump or the chatflow driver and always finalizes the run
//! record once either returns.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agentrun_core::message::Message;
use agentrun_core::run::{
    ListRunRecordMeta, NewRunRecord, RunError, RunRecord, RunRecordUpdate, RunStatus,
};

use crate::builder;
use crate::chatflow;
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::error::{Result, RunnerError};
use crate::executor::{AgentExecuteRequest, AgentIdentity, AgentInfo, BotMode};
use crate::handler::MessageEventHandler;
use crate::interrupt::{parse_resume_info, ResumeInfo};
use crate::pump;
use crate::request::AgentRunMeta;
use crate::run_process::RunProcess;
use crate::service::RunnerDeps;
use crate::sink::EventSink;

/// State gathered before anything is streamed
struct PreparedRun {
    agent: Arc<AgentInfo>,
    history: Vec<Message>,
    record: RunRecord,
}

/// One conversational turn
pub struct AgentRuntime {
    deps: RunnerDeps,
    config: RunnerConfig,
    meta: Arc<AgentRunMeta>,
    sink: EventSink,
    cancel: CancellationToken,
    started: Instant,
}

impl AgentRuntime {
    pub fn new(
        deps: RunnerDeps,
        config: RunnerConfig,
        meta: AgentRunMeta,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            deps,
            config,
            meta: Arc::new(meta),
            sink,
            cancel,
            started: Instant::now(),
        }
    }

    /// Drive the run to a terminal state, ending the client stream with `StreamDone`
    pub async fn run(self) {
        let process = RunProcess::new(self.deps.runs.clone(), self.sink.clone());
        match self.prepare(&process).await {
            Ok(prepared) => self.execute(&process, prepared).await,
            Err(err) => {
                error!(
                    "Failed to start run for agent {} in conversation {}: {}",
                    self.meta.agent_id, self.meta.conversation_id, err
                );
                self.sink.error(&err, self.config.run_mode).await;
            }
        }
        self.sink.stream_done().await;
    }

    async fn prepare(&self, process: &RunProcess) -> Result<PreparedRun> {
        let agent = self.resolve_agent().await?;
        self.insert_additional_messages().await?;
        let history = self.history(&agent).await?;

        let record = self
            .deps
            .runs
            .create(NewRunRecord {
                conversation_id: self.meta.conversation_id,
                section_id: self.meta.section_id,
                agent_id: self.meta.agent_id,
                user_id: self.meta.user_id.clone(),
                connector_id: self.meta.connector_id,
            })
            .await?;
        info!(
            "Created run {} for agent {} in conversation {}",
            record.id, agent.agent_id, record.conversation_id
        );
        let record = match process.step_to_in_progress(&record).await {
            Ok(record) => record,
            Err(err) => {
                self.abandon(&record, &err).await;
                return Err(err);
            }
        };

        Ok(PreparedRun {
            agent: Arc::new(agent),
            history,
            record,
        })
    }

    /// Close out a record that never started so it is not left `Created`
    async fn abandon(&self, record: &RunRecord, err: &RunnerError) {
        let run_error = RunError {
            code: err.code(),
            message: err.to_string(),
        };
        let update = RunRecordUpdate::status(record.id, RunStatus::Failed).with_error(run_error);
        if let Err(update_err) = self.deps.runs.update(update).await {
            warn!(
                "Failed to mark unstarted run {} as failed: {}",
                record.id, update_err
            );
        }
    }

    async fn resolve_agent(&self) -> Result<AgentInfo> {
        let identity = AgentIdentity {
            agent_id: self.meta.agent_id,
            is_draft: self.meta.is_draft,
            connector_id: self.meta.connector_id,
            version: self.meta.version.clone(),
        };
        self.deps
            .agents
            .obtain_agent(&identity)
            .await?
            .ok_or(RunnerError::AgentNotFound {
                agent_id: self.meta.agent_id,
            })
    }

    /// Back-fill caller supplied messages under a run record of their own
    async fn insert_additional_messages(&self) -> Result<()> {
        if self.meta.additional_messages.is_empty() {
            return Ok(());
        }
        let record = self
            .deps
            .runs
            .create(NewRunRecord {
                conversation_id: self.meta.conversation_id,
                section_id: self.meta.section_id,
                agent_id: self.meta.agent_id,
                user_id: self.meta.user_id.clone(),
                connector_id: self.meta.connector_id,
            })
            .await?;

        let mut messages = Vec::with_capacity(self.meta.additional_messages.len());
        for additional in &self.meta.additional_messages {
            if let Some(message) =
                builder::build_additional_message(&record, additional, &self.meta.user_id)?
            {
                messages.push(message);
            }
        }
        let saved = self.deps.messages.batch_create(messages).await?;
        info!(
            "Back-filled {} messages under run {}",
            saved.len(),
            record.id
        );
        Ok(())
    }

    /// Messages of the most recent runs, oldest first
    async fn history(&self, agent: &AgentInfo) -> Result<Vec<Message>> {
        let rounds = self.history_rounds(agent);
        let records = self
            .deps
            .runs
            .list(&ListRunRecordMeta {
                conversation_id: self.meta.conversation_id,
                section_id: self.meta.section_id,
                limit: rounds,
            })
            .await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let run_ids: Vec<i64> = records.iter().map(|record| record.id).collect();
        let history = self
            .deps
            .messages
            .get_by_run_ids(self.meta.conversation_id, &run_ids)
            .await?;
        debug!(
            "Loaded {} history messages from {} runs",
            history.len(),
            run_ids.len()
        );
        Ok(history)
    }

    fn history_rounds(&self, agent: &AgentInfo) -> usize {
        agent
            .history_rounds
            .unwrap_or(self.config.default_history_rounds)
    }

    async fn execute(&self, process: &RunProcess, prepared: PreparedRun) {
        let PreparedRun {
            agent,
            history,
            record,
        } = prepared;
        let rounds = self.history_rounds(&agent);
        let ctx = RunContext::new(
            self.meta.clone(),
            agent,
            record.clone(),
            self.started,
            self.config.run_mode,
        );
        let handler = MessageEventHandler::new(
            ctx,
            self.deps.messages.clone(),
            self.sink.clone(),
            self.cancel.clone(),
            self.deps.suggester.clone(),
        );

        match self.dispatch(handler, &history, rounds).await {
            Ok(handler) => match handler.workflow_failure() {
                Some(failure) => process.step_to_failed(&record, failure.clone()).await,
                None => process.step_to_complete(&record, handler.usage()).await,
            },
            Err(RunnerError::Cancelled) => {
                warn!("Run {} cancelled", record.id);
                process.step_to_cancelled(&record).await;
            }
            Err(err) => {
                error!("Run {} failed: {}", record.id, err);
                self.sink.error(&err, self.config.run_mode).await;
                let run_error = RunError {
                    code: err.code(),
                    message: err.to_string(),
                };
                process.step_to_failed(&record, run_error).await;
            }
        }
    }

    async fn dispatch(
        &self,
        mut handler: MessageEventHandler,
        history: &[Message],
        rounds: usize,
    ) -> Result<MessageEventHandler> {
        handler.handle_input().await?;
        let agent = handler.context().agent.clone();
        let run_id = handler.context().run.id;

        if agent.mode == BotMode::Workflow {
            info!("Dispatching run {} to workflow of agent {}", run_id, agent.agent_id);
            return chatflow::run(
                handler,
                self.deps.workflow_executor.as_ref(),
                history,
                rounds,
            )
            .await;
        }

        let meta = &self.meta;
        let request = AgentExecuteRequest {
            agent_id: agent.agent_id,
            space_id: meta.space_id,
            is_draft: meta.is_draft,
            version: meta.version.clone(),
            user_id: meta.user_id.clone(),
            conversation_id: meta.conversation_id,
            connector_id: meta.connector_id,
            custom_variables: meta.custom_variables.clone(),
            input: builder::input_model_message(meta),
            history: builder::to_model_messages(&builder::history_pairs(history)),
        };

        let executor = &self.deps.agent_executor;
        let upstream = match parse_resume_info(history) {
            Some(ResumeInfo::Agent(interrupt)) => {
                info!(
                    "Resuming run {} from interrupt {} of tool call {}",
                    run_id, interrupt.interrupt_id, interrupt.tool_call_id
                );
                executor.stream_resume(request, interrupt).await?
            }
            _ => {
                info!("Executing agent {} for run {}", agent.agent_id, run_id);
                executor.stream_execute(request).await?
            }
        };
        pump::drive(handler, upstream, self.config.pump_capacity).await
    }
}
