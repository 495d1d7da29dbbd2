//! Workflow-backed agents
//!
//! The workflow stream is consumed by one task that owns the handler, so the
//! single-consumer rule of the agent pump holds here as well.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use agentrun_core::message::Message;

use crate::builder;
use crate::error::{Result, RunnerError};
use crate::event::WorkflowMessage;
use crate::executor::{WorkflowExecuteConfig, WorkflowExecutor, WorkflowResumeRequest};
use crate::handler::MessageEventHandler;
use crate::interrupt::{parse_resume_info, ResumeInfo};
use crate::pump::joined;
use crate::stream::StreamReader;

/// Workflow input key holding the user's message
pub const USER_INPUT: &str = "USER_INPUT";

/// Run the agent's workflow, resuming it when the previous turn paused it
pub async fn run(
    handler: MessageEventHandler,
    executor: &dyn WorkflowExecutor,
    history: &[Message],
    max_history_rounds: usize,
) -> Result<MessageEventHandler> {
    let ctx = handler.context();
    let agent_id = ctx.agent.agent_id;
    let workflow_id = ctx
        .agent
        .workflow_id
        .filter(|id| *id > 0)
        .ok_or(RunnerError::WorkflowNotFound { agent_id })?;

    let meta = &ctx.meta;
    let user_input = builder::concat_workflow_input(&meta.content);
    let mut config = WorkflowExecuteConfig {
        workflow_id,
        connector_id: meta.connector_id,
        connector_uid: meta.user_id.clone(),
        agent_id,
        ..WorkflowExecuteConfig::default()
    };

    let stream = match parse_resume_info(history) {
        Some(ResumeInfo::Workflow { execute_id, event }) => {
            info!(
                "Resuming workflow {} execution {} at event {} for run {}",
                workflow_id, execute_id, event.id, ctx.run.id
            );
            let request = WorkflowResumeRequest::new(user_input, execute_id, &event);
            executor.stream_resume(request, config).await?
        }
        resume => {
            if let Some(other) = resume {
                debug!(
                    "Ignoring {} resume anchor, agent {} runs a workflow",
                    other.kind().as_str(),
                    agent_id
                );
            }
            config.conversation_id = Some(meta.conversation_id);
            config.section_id = Some(meta.section_id);
            config.init_round_id = Some(ctx.run.id);
            config.round_id = Some(ctx.run.id);
            config.user_message = Some(builder::input_model_message(meta));
            config.max_history_rounds = Some(max_history_rounds);

            let mut input: HashMap<String, Value> = meta.chatflow_parameters.clone();
            input.insert(USER_INPUT.to_string(), Value::String(user_input));
            info!("Executing workflow {} for run {}", workflow_id, ctx.run.id);
            executor.stream_execute(config, input).await?
        }
    };

    let (handler, result) = joined(tokio::spawn(consume(handler, stream)).await)?;
    result.map(|_| handler)
}

async fn consume(
    mut handler: MessageEventHandler,
    mut stream: StreamReader<WorkflowMessage>,
) -> (MessageEventHandler, Result<()>) {
    let cancel = handler.cancel_token().clone();
    let result = loop {
        let step = match stream.recv(&cancel).await {
            Ok(Some(WorkflowMessage::State(state))) => handler.handle_workflow_state(state).await,
            Ok(Some(WorkflowMessage::Data(data))) => handler.handle_workflow_data(data).await,
            Ok(None) => {
                // A failed workflow was already reported, it gets no finish marker
                if handler.workflow_failure().is_some() {
                    break Ok(());
                }
                break handler.finish_workflow().await;
            }
            Err(err) => Err(err),
        };
        if let Err(err) = step {
            break Err(err);
        }
    };
    (handler, result)
}
