use crate::app::{App, StatusResponse, UploadResponse};
use crate::protocol::{ClientEvent, ServerEvent};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use rollcall_core::AttendanceRecord;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/upload_attendance", post(upload))
        .route("/status", get(status))
        .route("/health", get(|| async { "OK" }))
        .with_state(app)
}

/// Serve until `shutdown` resolves, then drain open connections.
pub async fn serve(
    listener: TcpListener,
    app: Arc<App>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("ctrl-c received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(app): State<Arc<App>>) -> Response {
    let client = Uuid::new_v4();
    ws.on_upgrade(move |socket| {
        client_session(socket, app).instrument(tracing::info_span!("client", id = %client))
    })
}

/// One capture client, from connect to disconnect.
async fn client_session(socket: WebSocket, app: Arc<App>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (recognized_tx, mut recognized_rx) = mpsc::unbounded_channel::<AttendanceRecord>();

    app.on_connect();

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(ClientEvent::Frame { image }) = ClientEvent::parse(&text) {
                        // Rejections are logged by the app.
                        let _ = app.on_frame(image, recognized_tx.clone());
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "websocket receive failed");
                    break;
                }
            },
            Some(record) = recognized_rx.recv() => {
                let event = ServerEvent::Recognized { name: record.name };
                match event.to_json() {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "cannot encode recognized event"),
                }
            }
        }
    }

    app.on_disconnect().await;
}

async fn upload(State(app): State<Arc<App>>) -> Json<UploadResponse> {
    Json(app.upload().await)
}

async fn status(State(app): State<Arc<App>>) -> Result<Json<StatusResponse>, StatusCode> {
    app.status().await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "status unavailable");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
