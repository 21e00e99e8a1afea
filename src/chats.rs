//! REST endpoints for direct-message chat management.
//!
//! Chats are one-to-one between two users. Creating a chat for a pair that
//! already has one returns the existing chat instead of a duplicate.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    /// Username of the other participant
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct ParticipantInfo {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<ParticipantInfo>>,
}

#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub chat_id: i64,
    pub participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Serialize)]
pub struct ChatsResponse {
    pub chats: Vec<ChatSummary>,
}

/// POST /chats: create or get the DM chat with another user.
/// JWT auth required. Body: { "username": "<other user>" }.
/// Returns the existing chat if one already exists between the two users.
pub async fn create_chat(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<CreateChatResponse>), StatusCode> {
    let caller_id = claims.user_id()?;
    let db = state.db.clone();
    let other_username = body.username.clone();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let caller_username: String = conn
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                rusqlite::params![caller_id],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        let other_id: i64 = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                rusqlite::params![other_username],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::NOT_FOUND)?;

        // Cannot chat with yourself
        if other_id == caller_id {
            return Err(StatusCode::BAD_REQUEST);
        }

        // A chat containing both users with exactly two participant rows
        let existing: Option<i64> = conn
            .query_row(
                "SELECT a.chat_id
                 FROM chat_participants a
                 JOIN chat_participants b ON a.chat_id = b.chat_id
                 WHERE a.user_id = ?1 AND b.user_id = ?2
                   AND (SELECT COUNT(*) FROM chat_participants c
                        WHERE c.chat_id = a.chat_id) = 2
                 LIMIT 1",
                rusqlite::params![caller_id, other_id],
                |row| row.get(0),
            )
            .ok();

        if let Some(chat_id) = existing {
            return Ok((
                false,
                CreateChatResponse {
                    chat_id,
                    message: Some("Chat already exists".to_string()),
                    participants: None,
                },
            ));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chats (created_at) VALUES (?1)",
            rusqlite::params![now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let chat_id = conn.last_insert_rowid();

        for user_id in [caller_id, other_id] {
            conn.execute(
                "INSERT INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![chat_id, user_id],
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        }

        Ok((
            true,
            CreateChatResponse {
                chat_id,
                message: None,
                participants: Some(vec![
                    ParticipantInfo {
                        id: caller_id,
                        username: caller_username,
                        display_name: None,
                    },
                    ParticipantInfo {
                        id: other_id,
                        username: other_username,
                        display_name: None,
                    },
                ]),
            },
        ))
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let (is_new, response) = result;
    if is_new {
        tracing::info!(chat_id = response.chat_id, user_id = caller_id, "Chat created");
        Ok((StatusCode::CREATED, Json(response)))
    } else {
        Ok((StatusCode::OK, Json(response)))
    }
}

/// GET /chats: list the authenticated user's chats with their participants.
pub async fn list_chats(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<ChatsResponse>, StatusCode> {
    let user_id = claims.user_id()?;
    let db = state.db.clone();

    let chats = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(
                "SELECT chat_id FROM chat_participants WHERE user_id = ?1 ORDER BY chat_id",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let chat_ids: Vec<i64> = stmt
            .query_map(rusqlite::params![user_id], |row| row.get(0))
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        let mut chats = Vec::with_capacity(chat_ids.len());
        for chat_id in chat_ids {
            let mut pstmt = conn
                .prepare(
                    "SELECT u.id, u.username, u.display_name
                     FROM users u
                     JOIN chat_participants cp ON cp.user_id = u.id
                     WHERE cp.chat_id = ?1
                     ORDER BY u.id",
                )
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let participants: Vec<ParticipantInfo> = pstmt
                .query_map(rusqlite::params![chat_id], |row| {
                    Ok(ParticipantInfo {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                })
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .filter_map(|r| r.ok())
                .collect();

            chats.push(ChatSummary {
                chat_id,
                participants,
            });
        }

        Ok::<_, StatusCode>(chats)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(ChatsResponse { chats }))
}
