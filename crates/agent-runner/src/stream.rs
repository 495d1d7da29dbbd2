//! Bounded, cancellable streams between executors and the runner

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RunnerError};

/// Create a bounded stream pair
pub fn pipe<T>(capacity: usize) -> (StreamWriter<T>, StreamReader<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (StreamWriter { tx }, StreamReader { rx })
}

/// Producing half of a stream
///
/// Dropping every writer ends the stream.
#[derive(Debug)]
pub struct StreamWriter<T> {
    tx: mpsc::Sender<Result<T>>,
}

impl<T> Clone for StreamWriter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> StreamWriter<T> {
    /// Send an item, returning `false` once the reader is gone
    pub async fn send(&self, item: T) -> bool {
        self.tx.send(Ok(item)).await.is_ok()
    }

    /// Send a terminal error to the reader
    pub async fn send_err(&self, err: RunnerError) -> bool {
        self.tx.send(Err(err)).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of a stream
#[derive(Debug)]
pub struct StreamReader<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> StreamReader<T> {
    /// Build an already-finished stream from a list of items
    pub fn from_items(items: Vec<Result<T>>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity covers every item, so this cannot fail
            let _ = tx.try_send(item);
        }
        Self { rx }
    }

    /// Receive the next item
    ///
    /// Returns `Ok(None)` at end of stream and `Err(RunnerError::Cancelled)`
    /// as soon as `cancel` fires, even while waiting on a slow producer.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Result<Option<T>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
            item = self.rx.recv() => match item {
                Some(Ok(item)) => Ok(Some(item)),
                Some(Err(err)) => Err(err),
                None => Ok(None),
            },
        }
    }
}
