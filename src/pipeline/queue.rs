//! Inter-stage buffer queue.
//!
//! A FIFO owned by the consuming stage. Producers hold cloneable
//! [`QueueWriter`]s and only ever append. Built on a crossbeam channel, so
//! the queue lock and the consumer wakeup come from the channel itself.

use crate::pipeline::types::Buffer;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;
use thiserror::Error;

/// Rejected enqueue. The buffer is handed back to the producer.
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("Inter-stage queue is full")]
    Full(Buffer),

    #[error("Inter-stage queue is closed")]
    Closed(Buffer),
}

impl EnqueueError {
    /// Recovers the rejected buffer.
    pub fn into_buffer(self) -> Buffer {
        match self {
            EnqueueError::Full(buffer) | EnqueueError::Closed(buffer) => buffer,
        }
    }
}

/// Result of a bounded-wait dequeue.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    Item(Buffer),
    /// Nothing arrived within the timeout.
    Empty,
    /// The queue is empty and no producer can ever append again.
    Closed,
}

/// Producer side of an [`InterStageQueue`].
#[derive(Debug, Clone)]
pub struct QueueWriter {
    tx: Sender<Buffer>,
}

impl QueueWriter {
    /// Appends a buffer. Never blocks.
    ///
    /// Fails with `Full` when the queue is bounded and at capacity, and
    /// with `Closed` once the consumer has released the queue.
    pub fn enqueue(&self, buffer: Buffer) -> Result<(), EnqueueError> {
        self.tx.try_send(buffer).map_err(|e| match e {
            TrySendError::Full(buffer) => EnqueueError::Full(buffer),
            TrySendError::Disconnected(buffer) => EnqueueError::Closed(buffer),
        })
    }
}

/// Consumer side: a FIFO of buffers with bounded-wait dequeue.
#[derive(Debug)]
pub struct InterStageQueue {
    rx: Receiver<Buffer>,
    /// Kept until the queue is sealed so writers can still be handed out.
    tx: Option<Sender<Buffer>>,
    capacity: Option<usize>,
}

impl InterStageQueue {
    /// Creates a queue. `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(cap) => crossbeam_channel::bounded(cap.max(1)),
            None => crossbeam_channel::unbounded(),
        };
        Self {
            rx,
            tx: Some(tx),
            capacity: capacity.map(|cap| cap.max(1)),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    /// Builds a queue from a config value where 0 means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            Self::unbounded()
        } else {
            Self::bounded(capacity)
        }
    }

    /// Returns a new producer handle, or `None` once sealed.
    pub fn writer(&self) -> Option<QueueWriter> {
        self.tx.as_ref().map(|tx| QueueWriter { tx: tx.clone() })
    }

    /// Stops handing out writers.
    ///
    /// After sealing, the queue reports `Closed` as soon as it is empty and
    /// every outstanding writer has been dropped.
    pub fn seal(&mut self) {
        self.tx = None;
    }

    pub fn is_sealed(&self) -> bool {
        self.tx.is_none()
    }

    /// Appends through the queue's own sender (unsealed queues only).
    pub fn enqueue(&self, buffer: Buffer) -> Result<(), EnqueueError> {
        match &self.tx {
            Some(tx) => QueueWriter { tx: tx.clone() }.enqueue(buffer),
            None => Err(EnqueueError::Closed(buffer)),
        }
    }

    /// Waits up to `timeout` for the next buffer.
    pub fn dequeue(&self, timeout: Duration) -> Dequeued {
        match self.rx.recv_timeout(timeout) {
            Ok(buffer) => Dequeued::Item(buffer),
            Err(RecvTimeoutError::Timeout) => Dequeued::Empty,
            Err(RecvTimeoutError::Disconnected) => Dequeued::Closed,
        }
    }

    /// Takes the next buffer if one is already queued.
    pub fn try_dequeue(&self) -> Option<Buffer> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Drops every queued buffer and returns how many were discarded.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}
