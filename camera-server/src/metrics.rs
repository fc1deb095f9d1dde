//! Prometheus counters for the streaming pipeline.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct ServerMetrics {
    registry: Registry,
    pub frames_captured: IntCounter,
    pub frames_dropped: IntCounter,
    pub capture_failures: IntCounter,
    pub stream_restarts: IntCounter,
    pub frames_delivered: IntCounter,
    pub encoding_failures: IntCounter,
    pub active_sessions: IntGauge,
}

impl ServerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("swir_camera".to_string()), None)?;

        let frames_captured =
            IntCounter::new("frames_captured_total", "Frames acquired from the sensor")?;
        let frames_dropped = IntCounter::new(
            "frames_dropped_total",
            "Frames evicted from a full frame buffer",
        )?;
        let capture_failures =
            IntCounter::new("capture_failures_total", "Failed frame acquisitions")?;
        let stream_restarts = IntCounter::new(
            "stream_restarts_total",
            "Stop/start cycles after repeated capture failures",
        )?;
        let frames_delivered =
            IntCounter::new("frames_delivered_total", "Image frames sent to clients")?;
        let encoding_failures =
            IntCounter::new("encoding_failures_total", "Frames dropped by the encoder")?;
        let active_sessions = IntGauge::new("active_sessions", "Connected client sessions")?;

        registry.register(Box::new(frames_captured.clone()))?;
        registry.register(Box::new(frames_dropped.clone()))?;
        registry.register(Box::new(capture_failures.clone()))?;
        registry.register(Box::new(stream_restarts.clone()))?;
        registry.register(Box::new(frames_delivered.clone()))?;
        registry.register(Box::new(encoding_failures.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;

        Ok(Self {
            registry,
            frames_captured,
            frames_dropped,
            capture_failures,
            stream_restarts,
            frames_delivered,
            encoding_failures,
            active_sessions,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = ServerMetrics::new().unwrap();
        metrics.frames_captured.inc_by(3);
        metrics.stream_restarts.inc();

        let text = metrics.render();
        assert!(text.contains("swir_camera_frames_captured_total 3"));
        assert!(text.contains("swir_camera_stream_restarts_total 1"));
    }
}
