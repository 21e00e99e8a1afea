use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for the WebSocket handshake. Browser clients cannot
/// attach headers to an upgrade request, so auth rides in ?token=JWT.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Application close codes used when a handshake is refused:
/// 4001 = token expired
/// 4002 = token invalid
/// 4003 = caller is not a participant of the chat
/// 4004 = chat does not exist
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;
const CLOSE_NOT_PARTICIPANT: u16 = 4003;
const CLOSE_CHAT_NOT_FOUND: u16 = 4004;
/// Standard "internal error" close code, for failures of the check itself.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Why a WebSocket connect was refused.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("chat not found")]
    ChatNotFound,
    #[error("not a participant of this chat")]
    NotParticipant,
    #[error("connect check failed")]
    Internal,
}

impl ConnectError {
    fn close_code(&self) -> u16 {
        match self {
            ConnectError::TokenExpired => CLOSE_TOKEN_EXPIRED,
            ConnectError::TokenInvalid => CLOSE_TOKEN_INVALID,
            ConnectError::ChatNotFound => CLOSE_CHAT_NOT_FOUND,
            ConnectError::NotParticipant => CLOSE_NOT_PARTICIPANT,
            ConnectError::Internal => CLOSE_INTERNAL_ERROR,
        }
    }
}

/// GET /ws/chat/{chat_id}?token=JWT
/// WebSocket upgrade endpoint for one chat. On a policy failure the
/// request is still upgraded, then immediately closed with an application
/// close code, so browser clients can read the reason.
/// An accepted connection is handed off to its own actor task.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match authorize_connect(&state, chat_id, &params.token).await {
        Ok((user_id, username)) => {
            tracing::info!(user_id, chat_id, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| {
                actor::run_connection(socket, state, chat_id, user_id, username)
            })
        }
        Err(err) => {
            let close_code = err.close_code();
            tracing::warn!(chat_id, close_code, reason = %err, "WebSocket connect refused");

            // Upgrade the connection, then immediately close with the code
            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: err.to_string().into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

/// Connect-time policy: the token must validate and the caller must be a
/// participant of an existing chat.
async fn authorize_connect(
    state: &AppState,
    chat_id: i64,
    token: &str,
) -> Result<(i64, String), ConnectError> {
    let claims =
        jwt::validate_access_token(&state.jwt_secret, token).map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ConnectError::TokenExpired,
            _ => ConnectError::TokenInvalid,
        })?;
    let user_id: i64 = claims.sub.parse().map_err(|_| ConnectError::TokenInvalid)?;

    let db = state.db.clone();
    let membership = tokio::task::spawn_blocking(move || {
        let conn = db.lock().ok()?;

        let chat_exists = conn
            .query_row(
                "SELECT COUNT(*) FROM chats WHERE id = ?1",
                rusqlite::params![chat_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .ok()?;
        if !chat_exists {
            return Some((false, false));
        }

        let is_participant = conn
            .query_row(
                "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .ok()?;
        Some((true, is_participant))
    })
    .await
    .ok()
    .flatten();

    match membership {
        Some((true, true)) => Ok((user_id, claims.username)),
        Some((false, _)) => Err(ConnectError::ChatNotFound),
        Some((true, false)) => Err(ConnectError::NotParticipant),
        None => Err(ConnectError::Internal),
    }
}
