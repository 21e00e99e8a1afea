//! REST endpoints for message CRUD.
//!
//! Every mutation publishes its event to the fan-out hub after the commit,
//! so all live connections on the chat converge on the same history.

pub mod events;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::models::Message;
use crate::state::AppState;
use crate::uploads;

/// Longest accepted message body, in characters.
const MAX_CONTENT_LENGTH: usize = 4000;

// --- Request / Response types ---

#[derive(Debug, Serialize)]
pub struct MessageDetails {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub content: Option<String>,
    pub reply_content: Option<String>,
    pub image_url: Option<String>,
    pub sent_time: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: String,
    pub message_details: MessageDetails,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub chat_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SenderInfo {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageItem {
    pub id: i64,
    pub chat_id: i64,
    pub content: Option<String>,
    pub reply_content: Option<String>,
    pub sent_time: String,
    pub image_url: Option<String>,
    pub sender: SenderInfo,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageItem>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub new_content: String,
}

#[derive(Debug, Serialize)]
pub struct EditedMessage {
    pub message_id: i64,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct EditMessageResponse {
    pub message: String,
    pub edit_message: EditedMessage,
}

#[derive(Debug, Serialize)]
pub struct DeletedMessage {
    pub message_id: i64,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub message: String,
    pub deleted_message: DeletedMessage,
}

// --- Handlers ---

/// POST /messages
/// Send a message into a chat. Multipart form: `chat_id` (required),
/// `content`, `reply_content` and an `image` file, each optional, but a
/// message needs content or an image. Publishes `message_created` after
/// the row is committed.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    mut multipart: Multipart,
) -> Result<Json<SendMessageResponse>, (StatusCode, String)> {
    let user_id = claims
        .user_id()
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let mut chat_id: Option<i64> = None;
    let mut content: Option<String> = None;
    let mut reply_content: Option<String> = None;
    let mut image: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body".to_string()))?
    {
        match field.name() {
            Some("chat_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid chat_id field".to_string()))?;
                let parsed = text.trim().parse().map_err(|_| {
                    (StatusCode::BAD_REQUEST, "chat_id must be an integer".to_string())
                })?;
                chat_id = Some(parsed);
            }
            Some("content") => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid content field".to_string()))?;
                content = Some(text);
            }
            Some("reply_content") => {
                let text = field.text().await.map_err(|_| {
                    (StatusCode::BAD_REQUEST, "Invalid reply_content field".to_string())
                })?;
                reply_content = Some(text);
            }
            Some("image") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|_| {
                    (StatusCode::PAYLOAD_TOO_LARGE, "Image exceeds the upload limit".to_string())
                })?;
                image = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let chat_id =
        chat_id.ok_or((StatusCode::BAD_REQUEST, "chat_id is required".to_string()))?;

    // Empty content behaves like no content at all
    let content = content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(ref c) = content {
        if c.len() > MAX_CONTENT_LENGTH {
            return Err((StatusCode::PAYLOAD_TOO_LARGE, "Message too long".to_string()));
        }
    }
    if content.is_none() && image.is_none() {
        return Err((StatusCode::BAD_REQUEST, "Message cannot be empty".to_string()));
    }

    let db = state.db.clone();
    let data_dir = state.data_dir.clone();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let chat_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM chats WHERE id = ?1",
                rusqlite::params![chat_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if !chat_exists {
            return Err((StatusCode::NOT_FOUND, "Chat not found".to_string()));
        }

        let is_participant: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if !is_participant {
            return Err((
                StatusCode::FORBIDDEN,
                "User not a participant of the chat".to_string(),
            ));
        }

        let sender_username: String = conn
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                rusqlite::params![user_id],
                |row| row.get(0),
            )
            .map_err(|_| (StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

        // File write happens only after the policy checks pass
        let image_url = match image {
            Some((filename, data)) => Some(
                uploads::store_attachment(&data_dir, &filename, &data)
                    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))?,
            ),
            None => None,
        };

        let sent_time = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages (chat_id, sender_id, content, reply_content, image_url, sent_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![chat_id, user_id, content, reply_content, image_url, sent_time],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert message: {}", e)))?;

        let row = Message {
            id: conn.last_insert_rowid(),
            chat_id,
            sender_id: user_id,
            content,
            reply_content,
            image_url,
            sent_time,
        };
        Ok((row, sender_username))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    let (row, sender_username) = result;

    // The commit is final; fan-out is best-effort on top of it
    events::publish_message_created(&state.hub, &row, &sender_username);

    tracing::debug!(
        message_id = row.id,
        chat_id = row.chat_id,
        sender_id = row.sender_id,
        "Message created"
    );

    Ok(Json(SendMessageResponse {
        message: "Message sent successfully".to_string(),
        message_details: MessageDetails {
            id: row.id,
            chat_id: row.chat_id,
            sender_id: row.sender_id,
            sender_username,
            content: row.content,
            reply_content: row.reply_content,
            image_url: row.image_url,
            sent_time: row.sent_time,
        },
    }))
}

/// GET /messages?chat_id={id}
/// Full message history of a chat in sent order, with sender info embedded.
/// Caller must be a participant.
pub async fn get_messages(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, StatusCode> {
    let user_id = claims.user_id()?;
    let chat_id = query.chat_id;
    let db = state.db.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let chat_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM chats WHERE id = ?1",
                rusqlite::params![chat_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if !chat_exists {
            return Err(StatusCode::NOT_FOUND);
        }

        let is_participant: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if !is_participant {
            return Err(StatusCode::FORBIDDEN);
        }

        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.chat_id, m.content, m.reply_content, m.sent_time, m.image_url,
                        m.sender_id, u.username, u.display_name
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.chat_id = ?1
                 ORDER BY m.sent_time, m.id",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let messages: Vec<MessageItem> = stmt
            .query_map(rusqlite::params![chat_id], |row| {
                let username: Option<String> = row.get(7)?;
                Ok(MessageItem {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    content: row.get(2)?,
                    reply_content: row.get(3)?,
                    sent_time: row.get(4)?,
                    image_url: row.get(5)?,
                    sender: SenderInfo {
                        id: row.get(6)?,
                        // Sender rows can disappear when accounts are deleted
                        username: username.unwrap_or_else(|| "Unknown".to_string()),
                        display_name: row.get(8)?,
                    },
                })
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, StatusCode>(messages)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(MessagesResponse { messages }))
}

/// PATCH /messages/{message_id}
/// Replace a message's content. Only the sender may edit. Publishes
/// `message_edited` after the update commits.
pub async fn edit_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<i64>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<EditMessageResponse>, StatusCode> {
    let user_id = claims.user_id()?;

    let new_content = body.new_content.trim().to_string();
    if new_content.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if new_content.len() > MAX_CONTENT_LENGTH {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let db = state.db.clone();
    let content_for_update = new_content.clone();

    let chat_id = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let (chat_id, sender_id): (i64, i64) = conn
            .query_row(
                "SELECT chat_id, sender_id FROM messages WHERE id = ?1",
                rusqlite::params![message_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|_| StatusCode::NOT_FOUND)?;

        if sender_id != user_id {
            return Err(StatusCode::FORBIDDEN);
        }

        conn.execute(
            "UPDATE messages SET content = ?1 WHERE id = ?2",
            rusqlite::params![content_for_update, message_id],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(chat_id)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    events::publish_message_edited(&state.hub, chat_id, message_id, &new_content);

    tracing::debug!(message_id, chat_id, "Message edited");

    Ok(Json(EditMessageResponse {
        message: "Message edited successfully".to_string(),
        edit_message: EditedMessage {
            message_id,
            content: new_content,
        },
    }))
}

/// DELETE /messages/{message_id}
/// Remove a message. Only the sender may delete. Publishes
/// `message_deleted` after the row is gone.
pub async fn delete_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<i64>,
) -> Result<Json<DeleteMessageResponse>, StatusCode> {
    let user_id = claims.user_id()?;
    let db = state.db.clone();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let (chat_id, sender_id, content): (i64, i64, Option<String>) = conn
            .query_row(
                "SELECT chat_id, sender_id, content FROM messages WHERE id = ?1",
                rusqlite::params![message_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|_| StatusCode::NOT_FOUND)?;

        if sender_id != user_id {
            return Err(StatusCode::FORBIDDEN);
        }

        conn.execute(
            "DELETE FROM messages WHERE id = ?1",
            rusqlite::params![message_id],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>((chat_id, content))
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let (chat_id, content) = result;
    events::publish_message_deleted(&state.hub, chat_id, message_id);

    tracing::debug!(message_id, chat_id, "Message deleted");

    Ok(Json(DeleteMessageResponse {
        message: "Message deleted successfully".to_string(),
        deleted_message: DeletedMessage {
            message_id,
            content,
        },
    }))
}
