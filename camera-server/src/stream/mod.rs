//! Frame streaming pipeline.
//!
//! A streaming session runs two workers:
//!
//! - the producer, a dedicated OS thread that makes blocking acquisition
//!   calls and pushes into a drop-oldest [`FrameRingBuffer`]
//! - the consumer, a tokio task that drains the buffer, paces delivery to the
//!   sensor frame rate and sends encoded frames to the client
//!
//! Both observe one [`StopSignal`]. The consumer owns the producer's
//! [`ProducerHandle`] and joins it with a bounded timeout when it exits.

pub mod consumer;
pub mod producer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use shared::camera_interface::{FrameRingBuffer, SensorInterface};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::session::SessionContext;

pub use producer::ProducerStats;

/// Hardware handle shared by the command path and the producer thread.
///
/// Every hardware call goes through this one lock.
pub type SharedSensor = Arc<tokio::sync::Mutex<Box<dyn SensorInterface>>>;

/// Stop flag observable from both plain threads and async tasks.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
    notify: Notify,
    /// Set when the session reports the resulting status itself
    skip_final_status: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the flag and wake every waiter. Idempotent.
    pub fn request_stop(&self) {
        *self.lock() = true;
        self.condvar.notify_all();
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Whether the consumer should send its closing status update.
    pub fn reports_final_status(&self) -> bool {
        !self.skip_final_status.load(Ordering::SeqCst)
    }

    /// Resolve once a stop has been requested.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep the calling thread for `duration`, returning early on stop.
    ///
    /// Returns true if a stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Completion handle for the producer thread.
pub struct ProducerHandle {
    done: Receiver<()>,
    thread: thread::JoinHandle<ProducerStats>,
}

impl ProducerHandle {
    /// Wait up to `timeout` for the producer to exit.
    ///
    /// Returns `None` if it did not finish in time (the thread is left
    /// detached) or if it panicked.
    pub async fn join(self, timeout: Duration) -> Option<ProducerStats> {
        let ProducerHandle { done, thread } = self;
        let joined = tokio::task::spawn_blocking(move || match done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => thread.join().ok(),
            Err(RecvTimeoutError::Timeout) => None,
        })
        .await;

        match joined {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Producer join task failed: {}", e);
                None
            }
        }
    }
}

/// Running producer/consumer pair for one stream.
pub struct StreamHandle {
    stop: Arc<StopSignal>,
    consumer: JoinHandle<()>,
}

impl StreamHandle {
    /// Launch the producer thread and the delivery task.
    pub fn spawn(ctx: Arc<SessionContext>) -> std::io::Result<Self> {
        let stop = StopSignal::new();
        let buffer = Arc::new(FrameRingBuffer::new(ctx.config.buffer_capacity));
        let producer = producer::spawn_producer(&ctx, buffer.clone(), stop.clone())?;
        let consumer = tokio::spawn(consumer::run_consumer(
            ctx,
            buffer,
            stop.clone(),
            producer,
        ));

        Ok(Self { stop, consumer })
    }

    /// Signal both workers and wait for the consumer to wind down.
    ///
    /// The consumer joins the producer (bounded) and, when `report_status`
    /// is set, sends the final status.
    pub async fn stop(self, report_status: bool) {
        if !report_status {
            self.stop.skip_final_status.store(true, Ordering::SeqCst);
        }
        self.stop.request_stop();
        if let Err(e) = self.consumer.await {
            warn!("Frame delivery task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_sleep_runs_full_duration_without_stop() {
        let stop = StopSignal::new();
        let start = Instant::now();
        assert!(!stop.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_wakes_on_stop() {
        let stop = StopSignal::new();
        let other = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            other.request_stop();
        });

        let start = Instant::now();
        assert!(stop.sleep(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_async_wait_observes_stop() {
        let stop = StopSignal::new();
        let other = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            other.request_stop();
        });
        tokio::time::timeout(Duration::from_secs(2), stop.wait())
            .await
            .expect("stop should be observed");

        // Already stopped resolves immediately
        stop.wait().await;
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_final_status_reported_by_default() {
        let stop = StopSignal::new();
        assert!(stop.reports_final_status());
        stop.skip_final_status.store(true, Ordering::SeqCst);
        assert!(!stop.reports_final_status());
    }
}
