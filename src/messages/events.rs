//! Fan-out publishing for committed message mutations.
//!
//! Each helper builds the wire event for one mutation and hands it to the
//! hub. Handlers call these strictly after the database commit succeeds;
//! a failed or partial fan-out never fails the originating request.

use crate::db::models::Message;
use crate::ws::{ChatEvent, FanoutHub};

/// Publish `message_created` to the message's chat.
pub fn publish_message_created(hub: &FanoutHub, message: &Message, sender_username: &str) {
    hub.broadcast(
        message.chat_id,
        ChatEvent::MessageCreated {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            sender_username: sender_username.to_string(),
            content: message.content.clone(),
            reply_content: message.reply_content.clone(),
            image_url: message.image_url.clone(),
            sent_time: message.sent_time.clone(),
        },
    );
}

/// Publish `message_edited` to the chat the message belongs to.
pub fn publish_message_edited(hub: &FanoutHub, chat_id: i64, message_id: i64, new_content: &str) {
    hub.broadcast(
        chat_id,
        ChatEvent::MessageEdited {
            message_id,
            new_content: new_content.to_string(),
        },
    );
}

/// Publish `message_deleted` to the chat the message belonged to.
pub fn publish_message_deleted(hub: &FanoutHub, chat_id: i64, message_id: i64) {
    hub.broadcast(chat_id, ChatEvent::MessageDeleted { message_id });
}
