//! Frame ring buffer shared between the acquisition thread and the delivery task
//!
//! A bounded FIFO of [`RawFrame`]s with drop-oldest backpressure: inserting into
//! a full buffer never blocks, it evicts the oldest frame instead and hands it
//! back so the caller can count the drop. Async readers wait for a frame with a
//! timeout through `tokio::sync::Notify`.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use super::RawFrame;

/// Error type for ring buffer read operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferReadError {
    /// No frames available to read
    NoFramesAvailable,
    /// Timeout waiting for readable frame
    Timeout,
}

impl fmt::Display for BufferReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BufferReadError::NoFramesAvailable => {
                write!(f, "No frames available to read")
            }
            BufferReadError::Timeout => {
                write!(f, "Timeout waiting for readable frame")
            }
        }
    }
}

impl Error for BufferReadError {}

/// Result type for ring buffer read operations
pub type BufferReadResult<T> = Result<T, BufferReadError>;

/// Bounded frame queue with drop-oldest eviction
///
/// Invariant: `len() <= capacity()` at all times. Frames come out in the order
/// they went in; evicted frames simply leave a gap in the sequence.
#[derive(Debug)]
pub struct FrameRingBuffer {
    /// Queued frames, oldest at the front
    frames: Mutex<VecDeque<RawFrame>>,
    /// Maximum number of queued frames
    capacity: usize,
    /// Wakes async readers
    notify: Notify,
}

impl FrameRingBuffer {
    /// Create an empty buffer holding at most `capacity` frames
    ///
    /// # Panics
    /// Panics if capacity is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be greater than 0");

        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RawFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a frame, evicting the oldest one if the buffer is full
    ///
    /// Never blocks on readers. Returns the evicted frame, if any.
    pub fn push(&self, frame: RawFrame) -> Option<RawFrame> {
        let evicted = {
            let mut frames = self.lock();
            let evicted = if frames.len() >= self.capacity {
                frames.pop_front()
            } else {
                None
            };
            frames.push_back(frame);
            evicted
        };

        self.notify.notify_one();

        evicted
    }

    /// Take the oldest frame without waiting
    pub fn try_pop(&self) -> BufferReadResult<RawFrame> {
        self.lock()
            .pop_front()
            .ok_or(BufferReadError::NoFramesAvailable)
    }

    /// Wait up to `timeout` for a frame from an async context
    ///
    /// Only suspends the calling task; cancelling the returned future is safe
    /// and never loses a frame.
    pub async fn recv_timeout(&self, timeout: Duration) -> BufferReadResult<RawFrame> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();

            if let Ok(frame) = self.try_pop() {
                return Ok(frame);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop().map_err(|_| BufferReadError::Timeout);
            }
        }
    }

    /// Discard all queued frames, returning how many were removed
    pub fn drain(&self) -> usize {
        let mut frames = self.lock();
        let count = frames.len();
        frames.clear();
        count
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
