//! Live chat event types and their wire representation.
//!
//! An event is an immutable snapshot of a committed message mutation; it
//! carries no ownership relation to the persisted row. The transport layer
//! serializes events as JSON tagged by `"type"`:
//! `message_created` | `message_edited` | `message_deleted`.

use serde::Serialize;

/// One message mutation, ready for fan-out to a chat's live connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A new message was persisted in the chat.
    MessageCreated {
        id: i64,
        chat_id: i64,
        sender_id: i64,
        sender_username: String,
        content: Option<String>,
        reply_content: Option<String>,
        image_url: Option<String>,
        sent_time: String,
    },
    /// An existing message's content was replaced by its sender.
    MessageEdited { message_id: i64, new_content: String },
    /// A message was removed by its sender.
    MessageDeleted { message_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_wire_format() {
        let event = ChatEvent::MessageCreated {
            id: 7,
            chat_id: 42,
            sender_id: 3,
            sender_username: "ada".to_string(),
            content: Some("hello".to_string()),
            reply_content: None,
            image_url: None,
            sent_time: "2026-01-01T00:00:00+00:00".to_string(),
        };

        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "message_created");
        assert_eq!(value["id"], 7);
        assert_eq!(value["chat_id"], 42);
        assert_eq!(value["sender_username"], "ada");
        assert!(value["image_url"].is_null());
    }

    #[test]
    fn edited_and_deleted_discriminators() {
        let edited = ChatEvent::MessageEdited {
            message_id: 9,
            new_content: "fixed".to_string(),
        };
        let deleted = ChatEvent::MessageDeleted { message_id: 9 };

        let edited: serde_json::Value = serde_json::to_value(&edited).unwrap();
        let deleted: serde_json::Value = serde_json::to_value(&deleted).unwrap();
        assert_eq!(edited["type"], "message_edited");
        assert_eq!(edited["new_content"], "fixed");
        assert_eq!(deleted["type"], "message_deleted");
        assert_eq!(deleted["message_id"], 9);
    }
}
