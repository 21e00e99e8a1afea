use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;

/// Ping interval: server sends a WebSocket ping every 30 seconds so dead
/// peers are noticed instead of leaking registry entries.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if no pong arrives within 10 seconds after a ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the socket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from the mpsc channel
/// - Reader loop: watches for close/error and answers keepalive traffic
///
/// The fan-out hub holds the sender half of the channel (inside the
/// connection's handle), so any committed message mutation can reach this
/// client without touching the socket directly.
pub async fn run_connection(
    socket: WebSocket,
    state: AppState,
    chat_id: i64,
    user_id: i64,
    username: String,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Register with the fan-out hub; events for this chat flow through tx
    let handle = state.hub.connect(chat_id, tx.clone());

    tracing::info!(
        user_id,
        chat_id,
        conn_id = handle.id(),
        username = %username,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!(user_id, chat_id, "Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop. The live channel is delivery-only: history and sends go
    // through the HTTP API, so inbound data frames are ignored.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    tracing::debug!(
                        user_id,
                        chat_id,
                        "Ignoring inbound text frame on delivery-only socket: {}",
                        text.chars().take(100).collect::<String>()
                    );
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id,
                        chat_id,
                        "Ignoring inbound binary frame on delivery-only socket"
                    );
                }
                Message::Pong(_) => {
                    // Pong received, notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(user_id, chat_id, reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(user_id, chat_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                // Stream ended: client disconnected
                tracing::info!(user_id, chat_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks, then drop out of the hub.
    // Every exit path funnels through this single disconnect.
    writer_handle.abort();
    ping_handle.abort();
    state.hub.disconnect(&handle);

    tracing::info!(
        user_id,
        chat_id,
        conn_id = handle.id(),
        "WebSocket actor stopped"
    );
}

/// Writer task: receives frames from the mpsc channel and forwards them to
/// the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}
