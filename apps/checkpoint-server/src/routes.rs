use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path as UrlPath, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{ClientFrame, ServerFrame};
use crate::session::{SessionHandle, DEFAULT_CHANNEL_DEPTH};
use crate::terminal::TerminalHub;

pub struct AppState {
    pub session: SessionHandle,
    pub terminal: TerminalHub,
}

impl AppState {
    /// Hands keystrokes to the session loop, then to the pty. The session
    /// must see the input before any echo the pty produces for it.
    pub fn relay_stdin(&self, payload: String) -> Result<()> {
        self.session.input(payload.as_str());
        self.terminal.write_input(&payload)
    }
}

pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/healthz", get(health_handler))
        .route("/terminals/:name", get(terminal_handler))
        .route("/missions", get(mission_handler))
        .with_state(state);
    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn terminal_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(name): UrlPath<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_terminal(socket, state, name))
}

async fn mission_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_missions(socket, state))
}

async fn handle_terminal(socket: WebSocket, state: Arc<AppState>, name: String) {
    if let Err(err) = serve_terminal(socket, &state, &name).await {
        warn!(terminal = %name, error = %err, "terminal connection ended with error");
    }
    state.session.terminal_closed();
    info!(terminal = %name, "terminal connection closed");
}

async fn serve_terminal(socket: WebSocket, state: &AppState, name: &str) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let attachment = state.terminal.attach();
    ws_tx
        .send(Message::Text(ServerFrame::Setup.to_json()))
        .await?;
    for frame in attachment.catch_up() {
        ws_tx.send(Message::Text(frame.to_json())).await?;
    }
    let mut frames = attachment.frames;
    info!(terminal = %name, "terminal connection established");

    let writer_name = name.to_string();
    let writer = tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    if ws_tx.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(terminal = %writer_name, skipped, "terminal view lagging; frames skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(terminal = %writer_name, "terminal writer finished");
    });

    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                writer.abort();
                return Err(err.into());
            }
        };
        match ClientFrame::parse(&text) {
            Ok(ClientFrame::Stdin(payload)) => {
                if let Err(err) = state.relay_stdin(payload) {
                    warn!(terminal = %name, error = %err, "failed to write to pty");
                }
            }
            Ok(ClientFrame::SetSize { rows, cols }) => {
                if let Err(err) = state.terminal.resize(cols, rows) {
                    warn!(terminal = %name, error = %err, rows, cols, "failed to resize pty");
                }
            }
            Ok(ClientFrame::Unknown(tag)) => {
                debug!(terminal = %name, tag = %tag, "ignoring terminal frame");
            }
            Err(err) => {
                warn!(terminal = %name, error = %err, "malformed terminal frame");
            }
        }
    }

    writer.abort();
    Ok(())
}

async fn handle_missions(socket: WebSocket, state: Arc<AppState>) {
    let id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel(DEFAULT_CHANNEL_DEPTH);
    state.session.subscribe(id, tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(subscriber_id = %id, error = %err, "mission channel receive failed");
                break;
            }
        }
    }

    state.session.unsubscribe(id);
    writer.abort();
}
