//! Event pump between an agent stream and the message event handler
//!
//! A pull task reads the upstream stream and enqueues events on a bounded
//! queue; a push task is the only consumer and feeds them to the handler in
//! order. A full queue blocks the pull task, so nothing is ever dropped.

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Result, RunnerError};
use crate::event::AgentEvent;
use crate::handler::MessageEventHandler;
use crate::stream::StreamReader;

/// Element of the pump queue
#[derive(Debug)]
enum PumpItem {
    Event(AgentEvent),
    /// Upstream reached end of stream
    End,
    /// Upstream failed, nothing follows
    Failed(RunnerError),
}

impl PumpItem {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Event(_))
    }
}

/// Drain `upstream` through the handler, returning it once the run's
/// stream is fully consumed
pub async fn drive(
    handler: MessageEventHandler,
    upstream: StreamReader<AgentEvent>,
    capacity: usize,
) -> Result<MessageEventHandler> {
    let run_id = handler.context().run.id;
    // Stops the pull side when the push side exits early
    let pump_cancel = handler.cancel_token().child_token();
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let pull_task = tokio::spawn(pull(upstream, tx, pump_cancel.clone()));
    let push_task = tokio::spawn(push(handler, rx, pump_cancel));
    let (pulled, pushed) = tokio::join!(pull_task, push_task);

    joined(pulled)?;
    let (handler, result) = joined(pushed)?;
    match &result {
        Ok(()) => info!("Event pump of run {} finished", run_id),
        Err(err) => error!("Event pump of run {} stopped: {}", run_id, err),
    }
    result.map(|_| handler)
}

/// Re-raise task panics, treat an aborted task as cancellation
pub(crate) fn joined<T>(outcome: std::result::Result<T, JoinError>) -> Result<T> {
    match outcome {
        Ok(value) => Ok(value),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(RunnerError::Cancelled),
    }
}

async fn pull(
    mut upstream: StreamReader<AgentEvent>,
    tx: mpsc::Sender<PumpItem>,
    cancel: CancellationToken,
) {
    loop {
        let item = match upstream.recv(&cancel).await {
            Ok(Some(AgentEvent::Unrecognized { event_type })) => {
                PumpItem::Failed(RunnerError::UnknownEventType { event_type })
            }
            Ok(Some(event)) => PumpItem::Event(event),
            Ok(None) => PumpItem::End,
            Err(RunnerError::Cancelled) => {
                debug!("Pull task cancelled");
                return;
            }
            Err(err) => PumpItem::Failed(err),
        };
        let terminal = item.is_terminal();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = tx.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
        }
        if terminal {
            return;
        }
    }
}

async fn push(
    mut handler: MessageEventHandler,
    mut rx: mpsc::Receiver<PumpItem>,
    pump_cancel: CancellationToken,
) -> (MessageEventHandler, Result<()>) {
    let _stop_pull = pump_cancel.drop_guard();
    let result = consume(&mut handler, &mut rx).await;
    (handler, result)
}

async fn consume(
    handler: &mut MessageEventHandler,
    rx: &mut mpsc::Receiver<PumpItem>,
) -> Result<()> {
    while let Some(item) = rx.recv().await {
        match item {
            PumpItem::Event(event) => dispatch(handler, event).await?,
            PumpItem::End => return handler.handle_end().await,
            PumpItem::Failed(err) => return Err(err),
        }
    }
    // The queue only closes without a terminal item when pulling was cancelled
    Err(RunnerError::Cancelled)
}

async fn dispatch(handler: &mut MessageEventHandler, event: AgentEvent) -> Result<()> {
    debug!("Handling {} event", event.name());
    match event {
        AgentEvent::FunctionCall(call) => handler.handle_function_call(call).await,
        AgentEvent::ToolResponse(responses) => handler.handle_tool_response(responses).await,
        AgentEvent::ToolMidAnswer(stream) => handler.handle_tool_mid_answer(stream).await,
        AgentEvent::ToolAsAnswer(stream) => handler.handle_tool_as_answer(stream).await,
        AgentEvent::ModelAnswer(stream) => handler.handle_model_answer(stream).await,
        AgentEvent::Knowledge(documents) => handler.handle_knowledge(documents).await,
        AgentEvent::Suggest(suggestion) => handler.handle_suggest(suggestion).await,
        AgentEvent::Interrupt(interrupt) => handler.handle_interrupt(interrupt).await,
        AgentEvent::Unrecognized { event_type } => {
            Err(RunnerError::UnknownEventType { event_type })
        }
    }
}
