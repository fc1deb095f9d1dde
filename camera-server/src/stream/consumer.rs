//! Frame delivery task.
//!
//! Drains the frame buffer and sends one `image_frame` per frame, never faster
//! than the sensor frame rate. Waits on the buffer with a short timeout so a
//! stop request is seen promptly even when no frames arrive.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use shared::camera_interface::{FrameRingBuffer, RawFrame, SensorCapabilities};
use shared::image_proc::{EncodingError, FrameEncoder};
use shared_wasm::{CameraInfo, FrameSource, ServerMessage};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ProducerHandle, StopSignal};
use crate::error::CommandError;
use crate::session::SessionContext;

/// Build the `image_frame` message for one raw frame.
pub(crate) fn image_message(
    encoder: &FrameEncoder,
    source: FrameSource,
    frame: &RawFrame,
    camera_info: CameraInfo,
) -> Result<ServerMessage, EncodingError> {
    let encoded = encoder.encode(frame)?;
    Ok(ServerMessage::ImageFrame {
        data: BASE64.encode(&encoded.jpeg),
        source,
        histogram: encoded.histogram,
        stats: encoded.stats,
        camera_info,
    })
}

/// Pacing rate: the sensor's reported rate, or the fallback when unknown.
async fn target_frame_rate(ctx: &SessionContext) -> f64 {
    let reported = if ctx.capabilities.contains(SensorCapabilities::FRAME_RATE) {
        ctx.sensor.lock().await.frame_rate().ok()
    } else {
        None
    };
    reported
        .filter(|rate| rate.is_finite() && *rate > 0.0)
        .unwrap_or(ctx.config.tuning.fallback_frame_rate)
}

pub(crate) async fn run_consumer(
    ctx: Arc<SessionContext>,
    buffer: Arc<FrameRingBuffer>,
    stop: Arc<StopSignal>,
    producer: ProducerHandle,
) {
    let tuning = &ctx.config.tuning;
    let frame_rate = target_frame_rate(&ctx).await;
    let target_interval = Duration::from_secs_f64(1.0 / frame_rate);
    info!("Streaming task started at {:.1} fps.", frame_rate);

    let mut transport_open = ctx
        .outbox
        .log(format!("Streaming frames at {frame_rate:.1} fps."))
        .await
        .is_ok();
    let mut last_emit: Option<Instant> = None;

    while transport_open && !stop.is_stopped() {
        let frame = tokio::select! {
            _ = stop.wait() => break,
            received = buffer.recv_timeout(tuning.consumer_wait) => match received {
                Ok(frame) => frame,
                Err(_) => continue,
            },
        };

        if let Some(last) = last_emit {
            let next_slot = last + target_interval;
            if next_slot > Instant::now() {
                tokio::select! {
                    _ = stop.wait() => break,
                    _ = tokio::time::sleep_until(next_slot) => {}
                }
            }
        }
        last_emit = Some(Instant::now());

        match deliver(&ctx, &frame).await {
            Ok(()) => ctx.metrics.frames_delivered.inc(),
            Err(CommandError::TransportClosed) => {
                warn!("Connection closed during streaming.");
                transport_open = false;
            }
            Err(e) => {
                ctx.metrics.encoding_failures.inc();
                warn!("Dropping frame {}: {}", frame.sequence(), e);
            }
        }
    }

    stop.request_stop();
    match producer.join(tuning.join_timeout).await {
        Some(stats) => debug!("Producer joined: {:?}", stats),
        None => warn!(
            "Frame producer did not exit within {:?}, continuing shutdown.",
            tuning.join_timeout
        ),
    }

    let discarded = buffer.drain();
    if discarded > 0 {
        debug!("Discarded {} buffered frames.", discarded);
    }

    if transport_open && stop.reports_final_status() {
        // Best effort, the client may already be gone
        if ctx.send_status().await.is_err() {
            debug!("Final status update not delivered.");
        }
    }
    info!("Streaming task stopped.");
}

async fn deliver(ctx: &SessionContext, frame: &RawFrame) -> Result<(), CommandError> {
    let camera_info = ctx.camera_info().await;
    let message = image_message(&ctx.encoder, ctx.source, frame, camera_info)?;
    ctx.outbox.send(message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use shared_wasm::HISTOGRAM_BUCKETS;

    #[test]
    fn test_image_message_fields() {
        let frame = RawFrame::now(Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as u16), 3);
        let message = image_message(
            &FrameEncoder::default(),
            FrameSource::Live,
            &frame,
            CameraInfo::unknown(),
        )
        .unwrap();

        match message {
            ServerMessage::ImageFrame {
                data,
                source,
                histogram,
                stats,
                ..
            } => {
                let jpeg = BASE64.decode(data).unwrap();
                assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
                assert_eq!(source, FrameSource::Live);
                assert_eq!(histogram.len(), HISTOGRAM_BUCKETS);
                assert_eq!(stats.max, 63);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
