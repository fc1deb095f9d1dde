//! Acquisition thread.
//!
//! Pulls one frame at a time from the sensor and pushes it into the frame
//! buffer. Capture failures never leave this thread: they are counted, backed
//! off, optionally answered with `prepare_read`, and after enough consecutive
//! failures the hardware stream is cycled with a stop/start.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use shared::camera_interface::{CameraError, FrameRingBuffer, RawFrame, SensorCapabilities};
use tracing::{debug, error, info, warn};

use super::{ProducerHandle, SharedSensor, StopSignal};
use crate::config::StreamTuning;
use crate::metrics::ServerMetrics;
use crate::session::SessionContext;

/// Counters reported by the producer when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub frames: u64,
    pub failures: u64,
    pub restarts: u32,
}

pub(crate) fn spawn_producer(
    ctx: &SessionContext,
    buffer: Arc<FrameRingBuffer>,
    stop: Arc<StopSignal>,
) -> std::io::Result<ProducerHandle> {
    let mut producer = FrameProducer {
        sensor: ctx.sensor.clone(),
        capabilities: ctx.capabilities,
        buffer,
        stop,
        tuning: ctx.config.tuning.clone(),
        metrics: ctx.metrics.clone(),
        stats: ProducerStats::default(),
    };
    let (done_tx, done) = bounded(1);

    let thread = thread::Builder::new()
        .name("frame-producer".to_string())
        .spawn(move || {
            let stats = producer.run();
            let _ = done_tx.send(());
            stats
        })?;

    Ok(ProducerHandle { done, thread })
}

struct FrameProducer {
    sensor: SharedSensor,
    capabilities: SensorCapabilities,
    buffer: Arc<FrameRingBuffer>,
    stop: Arc<StopSignal>,
    tuning: StreamTuning,
    metrics: ServerMetrics,
    stats: ProducerStats,
}

enum Acquisition {
    NotRunning,
    Captured(Vec<RawFrame>),
    Failed(CameraError),
}

impl FrameProducer {
    fn run(&mut self) -> ProducerStats {
        info!("Frame producer started.");
        let mut consecutive_failures = 0u32;
        let mut restart_pending = false;

        while !self.stop.is_stopped() {
            match self.acquire() {
                Acquisition::NotRunning => {
                    if restart_pending {
                        restart_pending = !self.restart_stream();
                    } else {
                        self.stop.sleep(self.tuning.idle_poll);
                    }
                }
                Acquisition::Captured(frames) => {
                    consecutive_failures = 0;
                    self.publish(frames);
                }
                Acquisition::Failed(e) => {
                    consecutive_failures += 1;
                    self.stats.failures += 1;
                    self.metrics.capture_failures.inc();
                    warn!(
                        "Frame capture failed ({}/{}): {}",
                        consecutive_failures, self.tuning.failure_threshold, e
                    );

                    if e.requires_reinit() {
                        self.prepare_read();
                    }

                    if consecutive_failures >= self.tuning.failure_threshold {
                        consecutive_failures = 0;
                        restart_pending = !self.restart_stream();
                    } else {
                        self.stop.sleep(self.tuning.failure_backoff);
                    }
                }
            }
        }

        info!(
            "Frame producer stopped: {} frames, {} failures, {} restarts.",
            self.stats.frames, self.stats.failures, self.stats.restarts
        );
        self.stats
    }

    /// One acquisition with the hardware lock held only for the call itself.
    fn acquire(&self) -> Acquisition {
        let mut sensor = self.sensor.blocking_lock();
        if !sensor.is_running() {
            return Acquisition::NotRunning;
        }
        match sensor.get_frames(1) {
            Ok(frames) => Acquisition::Captured(frames),
            Err(e) => Acquisition::Failed(e),
        }
    }

    fn publish(&mut self, frames: Vec<RawFrame>) {
        for frame in frames {
            self.stats.frames += 1;
            self.metrics.frames_captured.inc();
            if let Some(evicted) = self.buffer.push(frame) {
                self.metrics.frames_dropped.inc();
                debug!("Frame buffer full, dropped frame {}", evicted.sequence());
            }
        }
    }

    fn prepare_read(&self) {
        if !self.capabilities.contains(SensorCapabilities::PREPARE_READ) {
            debug!("Driver asked for reinitialization but has no prepare_read hook");
            return;
        }
        match self.sensor.blocking_lock().prepare_read() {
            Ok(()) => info!("Driver re-armed with prepare_read."),
            Err(e) => warn!("prepare_read failed: {}", e),
        }
    }

    /// Stop the hardware stream, pause, start it again.
    ///
    /// Returns true if the stream is running again or a stop was requested
    /// during the pause.
    fn restart_stream(&mut self) -> bool {
        self.stats.restarts += 1;
        self.metrics.stream_restarts.inc();
        warn!(
            "Restarting hardware stream after {} consecutive failures.",
            self.tuning.failure_threshold
        );

        if let Err(e) = self.sensor.blocking_lock().stop() {
            warn!("Stream stop during restart failed: {}", e);
        }
        if self.stop.sleep(self.tuning.restart_pause) {
            return true;
        }

        match self.sensor.blocking_lock().start() {
            Ok(()) => {
                info!("Hardware stream restarted.");
                true
            }
            Err(e) => {
                error!("Hardware stream restart failed: {}", e);
                false
            }
        }
    }
}
