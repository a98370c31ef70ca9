use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use time::macros::format_description;

use crate::types::User;

/// A chat message as delivered by the service.
///
/// Ids are assigned by the service and increase monotonically; they are the
/// basis of the incremental fetch cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned message id.
    pub id: u64,

    /// The sender.
    pub user: User,

    /// The message body.
    pub message_text: String,

    /// Server timestamp, `YYYY-MM-DD HH:MM:SS`.
    #[serde(default)]
    pub timestamp: String,
}

impl Message {
    /// Create a new message.
    pub fn new(
        id: u64,
        user: User,
        message_text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user,
            message_text: message_text.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Parse the server timestamp.
    pub fn sent_at(&self) -> Option<PrimitiveDateTime> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        PrimitiveDateTime::parse(self.timestamp.trim(), &format).ok()
    }

    /// The `HH:MM` part of the timestamp, if it parses.
    pub fn time_of_day(&self) -> Option<String> {
        let format = format_description!("[hour]:[minute]");
        self.sent_at().and_then(|at| at.format(&format).ok())
    }
}

/// Body of `GET /api/messages` and `GET /api/messages/new`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageList {
    /// Messages in server order, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Body of `POST /api/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageParams {
    /// The text to post.
    pub message_text: String,
}

impl SendMessageParams {
    /// Create new send parameters.
    pub fn new(message_text: impl Into<String>) -> Self {
        Self {
            message_text: message_text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn message_list_deserialization() {
        let list: MessageList = serde_json::from_value(json!({
            "messages": [
                {
                    "id": 7,
                    "user": {"id": 1, "login": "ivan_p", "first_name": "Ivan", "last_name": "Petrov"},
                    "message_text": "hi",
                    "timestamp": "2025-03-01 14:05:09"
                }
            ]
        }))
        .unwrap();
        assert_eq!(list.messages.len(), 1);
        assert_eq!(list.messages[0].id, 7);
        assert_eq!(list.messages[0].user.login, "ivan_p");
        assert_eq!(list.messages[0].time_of_day().as_deref(), Some("14:05"));
    }

    #[test]
    fn message_list_missing_field_is_empty() {
        let list: MessageList = serde_json::from_value(json!({})).unwrap();
        assert!(list.messages.is_empty());
    }

    #[test]
    fn unparseable_timestamp() {
        let msg = Message::new(1, User::default(), "x", "yesterday");
        assert!(msg.sent_at().is_none());
        assert!(msg.time_of_day().is_none());
    }

    #[test]
    fn send_params_serialization() {
        let json = to_value(SendMessageParams::new("hello")).unwrap();
        assert_eq!(json, json!({"message_text": "hello"}));
    }
}
