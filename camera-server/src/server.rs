//! HTTP surfaces: the command websocket, metrics and the static UI.

use std::path::PathBuf;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    handler::HandlerWithoutStateExt,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{future, SinkExt, StreamExt};
use hardware::{open_sensor, SensorKind};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::config::{CommonServerArgs, SessionConfig};
use crate::connection::run_connection;
use crate::metrics::ServerMetrics;
use crate::outbox::{Outbox, DEFAULT_OUTBOX_CAPACITY};

#[derive(Clone)]
pub struct AppState {
    pub sensor_kind: SensorKind,
    pub session_config: SessionConfig,
    pub metrics: ServerMetrics,
}

/// Router for the command port: `/ws` (also `/`) and `/metrics`.
pub fn command_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Static UI router with SPA fallback.
///
/// Existing files are served as-is. Missing paths with a file extension are
/// 404; anything else gets `index.html` so client-side routes work.
pub fn static_router(static_dir: PathBuf) -> Router {
    let index = static_dir.join("index.html");
    let fallback = move |uri: Uri| spa_fallback(uri, index.clone());
    Router::new().fallback_service(ServeDir::new(static_dir).fallback(fallback.into_service()))
}

async fn spa_fallback(uri: Uri, index: PathBuf) -> Response {
    let last_segment = uri.path().rsplit('/').next().unwrap_or_default();
    if last_segment.contains('.') {
        return (StatusCode::NOT_FOUND, "Asset not found").into_response();
    }

    match tokio::fs::read(&index).await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "index.html not found").into_response(),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("Client connected");
    let (mut sink, receiver) = socket.split();
    let (outbox, mut outgoing) = Outbox::channel(DEFAULT_OUTBOX_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize {} message: {}", message.kind(), e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Websocket send failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let incoming = receiver
        .take_while(|message| {
            future::ready(matches!(message, Ok(m) if !matches!(m, Message::Close(_))))
        })
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(text),
                _ => None,
            })
        });

    let sensor = open_sensor(state.sensor_kind);
    run_connection(
        sensor,
        outbox,
        Box::pin(incoming),
        state.session_config.clone(),
        state.metrics.clone(),
    )
    .await;

    if let Err(e) = writer.await {
        warn!("Websocket writer task failed: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        future::pending::<()>().await;
    }
    info!("Server shutting down.");
}

/// Bind both listeners and serve until Ctrl-C.
pub async fn run_server(args: CommonServerArgs) -> anyhow::Result<()> {
    let metrics = ServerMetrics::new().context("Failed to register metrics")?;
    let state = AppState {
        sensor_kind: args.sensor,
        session_config: args.session_config(),
        metrics,
    };

    let command_addr = format!("{}:{}", args.host, args.port);
    let http_addr = format!("{}:{}", args.host, args.http_port);

    let command_listener = TcpListener::bind(&command_addr)
        .await
        .with_context(|| format!("Failed to bind command port {command_addr}"))?;
    let http_listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind UI port {http_addr}"))?;

    info!("Server started on ws://{}/ws", command_addr);
    info!(
        "Serving UI from {} on http://{}",
        args.static_dir.display(),
        http_addr
    );

    let command_server = axum::serve(command_listener, command_router(state))
        .with_graceful_shutdown(shutdown_signal());
    let ui_server = axum::serve(http_listener, static_router(args.static_dir.clone()))
        .with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(
        async { command_server.await.context("Command server failed") },
        async { ui_server.await.context("UI server failed") },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn ui_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>camera</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        dir
    }

    async fn get(router: Router, path: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = ui_dir();
        let (status, body) = get(static_router(dir.path().to_path_buf()), "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1)");
    }

    #[tokio::test]
    async fn test_spa_route_falls_back_to_index() {
        let dir = ui_dir();
        let (status, body) = get(static_router(dir.path().to_path_buf()), "/settings/sensor").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("camera"));
    }

    #[tokio::test]
    async fn test_missing_asset_is_404() {
        let dir = ui_dir();
        let (status, _) = get(static_router(dir.path().to_path_buf()), "/missing.wasm").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = AppState {
            sensor_kind: SensorKind::Simulated,
            session_config: SessionConfig::default(),
            metrics: ServerMetrics::new().unwrap(),
        };
        state.metrics.frames_delivered.inc();
        let (status, body) = get(command_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("swir_camera_frames_delivered_total 1"));
    }
}
