//! Outbound message queue for one client connection.
//!
//! Handlers and the delivery task push [`ServerMessage`]s here; a writer task
//! owns the websocket sink and drains the receiver. A dropped receiver means
//! the transport is gone.

use shared_wasm::{CameraInfo, CameraStatus, ServerMessage};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::{CommandError, CommandResult};

/// Messages queued before senders wait on the writer
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<ServerMessage>,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a message, waiting for room if the writer is behind.
    pub async fn send(&self, message: ServerMessage) -> CommandResult {
        self.tx
            .send(message)
            .await
            .map_err(|_| CommandError::TransportClosed)
    }

    pub async fn log(&self, message: impl Into<String>) -> CommandResult {
        let message = message.into();
        info!("Sending log to client: {}", message);
        self.send(ServerMessage::log(message)).await
    }

    pub async fn error(&self, message: impl Into<String>) -> CommandResult {
        let message = message.into();
        error!("Sending error to client: {}", message);
        self.send(ServerMessage::error(message)).await
    }

    pub async fn status(&self, status: CameraStatus, camera_info: CameraInfo) -> CommandResult {
        info!("State changed to: {}", status);
        self.send(ServerMessage::status(status, camera_info)).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (outbox, mut rx) = Outbox::channel(8);
        outbox.log("one").await.unwrap();
        outbox.error("two").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), ServerMessage::log("one"));
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::error("two"));
    }

    #[tokio::test]
    async fn test_closed_receiver_is_transport_closed() {
        let (outbox, rx) = Outbox::channel(1);
        drop(rx);
        assert!(outbox.is_closed());
        let err = outbox.log("lost").await.unwrap_err();
        assert!(err.is_transport_closed());
    }

    #[test]
    fn test_send_waits_for_room() {
        let (outbox, mut rx) = Outbox::channel(1);
        tokio_test::block_on(outbox.log("first")).unwrap();

        let mut pending = tokio_test::task::spawn(outbox.log("second"));
        tokio_test::assert_pending!(pending.poll());

        assert_eq!(rx.try_recv().unwrap(), ServerMessage::log("first"));
        assert!(pending.is_woken());
        tokio_test::assert_ready_ok!(pending.poll());
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::log("second"));
    }
}
