/// Row types mirroring the SQLite schema in migrations.rs.

/// Account row
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

/// Two-party chat. Membership lives in chat_participants.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: i64,
    pub created_at: String,
}

/// Membership row linking a user to a chat
#[derive(Debug, Clone)]
pub struct ChatParticipant {
    pub id: i64,
    pub chat_id: i64,
    pub user_id: i64,
}

/// Persisted chat message. content and image_url are individually optional;
/// the send endpoint rejects a message with neither.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub reply_content: Option<String>,
    pub image_url: Option<String>,
    pub sent_time: String,
}
