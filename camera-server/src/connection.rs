//! Lifecycle of one client connection, independent of the transport.

use futures::{Stream, StreamExt};
use shared::camera_interface::SensorInterface;
use tracing::{error, info};

use crate::commands::handle_text;
use crate::config::SessionConfig;
use crate::error::{CommandResult, HardwareInitError};
use crate::metrics::ServerMetrics;
use crate::outbox::Outbox;
use crate::session::Session;

/// Drive a session from a stream of inbound text frames until it ends.
///
/// A failed sensor open is reported once and ends the connection. On exit any
/// running stream is torn down.
pub async fn run_connection<S>(
    sensor: Result<Box<dyn SensorInterface>, HardwareInitError>,
    outbox: Outbox,
    mut incoming: S,
    config: SessionConfig,
    metrics: ServerMetrics,
) where
    S: Stream<Item = String> + Unpin,
{
    let sensor = match sensor {
        Ok(sensor) => sensor,
        Err(e) => {
            error!("Failed to initialize sensor: {}", e);
            let _ = outbox.error(format!("Hardware Error: {e}")).await;
            return;
        }
    };

    metrics.active_sessions.inc();
    let mut session = Session::new(sensor, outbox, config, metrics.clone());

    let result: CommandResult = async {
        session
            .outbox()
            .log("Connection established. Welcome!")
            .await?;
        session.get_status().await?;
        while let Some(text) = incoming.next().await {
            handle_text(&mut session, &text).await?;
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => info!("Client closed the connection."),
        Err(e) => info!("Client disconnected: {}", e),
    }

    session.shutdown().await;
    metrics.active_sessions.dec();
    info!("Connection handler finished.");
}
