//! Ordered client event stream

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use agentrun_core::run::{AgentRunResponse, ChunkMessageItem, ChunkRunItem, RunError};

use crate::config::RunMode;
use crate::error::{codes, RunnerError};

/// Create the client event channel of one run
///
/// Once `cancel` fires, sends stop waiting for a slow client.
pub fn event_channel(
    capacity: usize,
    cancel: CancellationToken,
) -> (EventSink, RunEventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSink { tx, cancel },
        RunEventStream {
            inner: ReceiverStream::new(rx),
        },
    )
}

/// Writer of client events
///
/// Sends are best effort: once the client is gone events are dropped and
/// the run carries on, persistence being the durability boundary. After
/// cancellation an event is only delivered if the channel has room.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AgentRunResponse>,
    cancel: CancellationToken,
}

impl EventSink {
    pub async fn send(&self, event: AgentRunResponse) {
        if self.cancel.is_cancelled() {
            self.try_deliver(event);
            return;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => self.try_deliver(event),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => permit.send(event),
                Err(_) => debug!("Client stream closed, dropping {} event", event.event_name()),
            },
        }
    }

    fn try_deliver(&self, event: AgentRunResponse) {
        let name = event.event_name();
        if self.tx.try_send(event).is_err() {
            debug!("Run cancelled and client not reading, dropping {} event", name);
        }
    }

    pub async fn message_delta(&self, item: ChunkMessageItem) {
        self.send(AgentRunResponse::MessageDelta(item)).await;
    }

    pub async fn message_completed(&self, item: ChunkMessageItem) {
        self.send(AgentRunResponse::MessageCompleted(item)).await;
    }

    pub async fn run_event(&self, event: fn(ChunkRunItem) -> AgentRunResponse, item: ChunkRunItem) {
        self.send(event(item)).await;
    }

    /// Surface an error to the client
    pub async fn error(&self, err: &RunnerError, mode: RunMode) {
        self.send(AgentRunResponse::Error(RunError {
            code: codes::AGENT_RUN,
            message: err.client_message(mode),
        }))
        .await;
    }

    pub async fn stream_done(&self) {
        self.send(AgentRunResponse::StreamDone).await;
    }
}

/// Client side of a run's events, ends when the run finishes
#[derive(Debug)]
pub struct RunEventStream {
    inner: ReceiverStream<AgentRunResponse>,
}

impl Stream for RunEventStream {
    type Item = AgentRunResponse;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
