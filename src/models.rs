//! Wire models for the chat backend

use crate::attachment::{AttachmentKind, MessageContent};
use chrono::{DateTime, Datelike, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Messages
// ============================================================================

/// A message as delivered by the history endpoint and the realtime topics.
///
/// Messages carry no server-assigned id on the wire; the (timeStamp, sender,
/// content) triple is the only identity available for deduplication. Two
/// genuinely distinct messages with the same sender, text and millisecond
/// would collide under this rule - a known limitation of the backend
/// contract, kept for compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub room_id: String,
    pub time_stamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl ChatMessage {
    /// Identity check used for deduplication across delivery topics.
    pub fn same_event(&self, other: &ChatMessage) -> bool {
        self.time_stamp == other.time_stamp
            && self.sender == other.sender
            && self.content == other.content
    }

    pub fn has_attachment(&self) -> bool {
        self.file_url.is_some()
    }

    /// Render-time view of the message body, dispatched over the attachment
    /// kind. Text messages map to `Text`; anything with a file URL maps to
    /// the variant for its MIME category.
    pub fn body(&self) -> MessageContent<'_> {
        let Some(url) = self.file_url.as_deref() else {
            return MessageContent::Text(&self.content);
        };
        let name = self
            .original_file_name
            .as_deref()
            .or(self.file_name.as_deref())
            .unwrap_or(&self.content);
        match AttachmentKind::of_message(self) {
            AttachmentKind::Image => MessageContent::Image { url, name },
            AttachmentKind::Video => MessageContent::Video { url, name },
            AttachmentKind::Audio => MessageContent::Audio { url, name },
            AttachmentKind::File => MessageContent::File { url, name },
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<chrono::FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.time_stamp).ok()
    }

    /// Whether two messages fall on the same calendar day, for day-separator
    /// grouping. Unparseable timestamps never group.
    pub fn same_day(&self, other: &ChatMessage) -> bool {
        match (self.timestamp(), other.timestamp()) {
            (Some(a), Some(b)) => a.date_naive() == b.date_naive(),
            _ => false,
        }
    }

    /// Day separator label: "Today", "Yesterday", or the date.
    pub fn day_label(&self) -> String {
        let Some(ts) = self.timestamp() else {
            return String::new();
        };
        let local = ts.with_timezone(&Local);
        let today = Local::now().date_naive();
        if local.date_naive() == today {
            "Today".to_string()
        } else if local.date_naive() == today.pred_opt().unwrap_or(today) {
            "Yesterday".to_string()
        } else if local.year() == today.year() {
            local.format("%d %b").to_string()
        } else {
            local.format("%d.%m.%Y").to_string()
        }
    }

    /// Clock label for the message row.
    pub fn time_label(&self) -> String {
        self.timestamp()
            .map(|ts| ts.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

/// Outbound publish body for the `/app/chat.sendMessage` destination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender: String,
    pub content: String,
    pub room_id: String,
    pub time_stamp: String,
    pub sender_full_name: String,
}

/// Current instant in the wire's timestamp format (UTC, millisecond
/// precision, `Z` suffix).
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl AuthUser {
    /// Name shown for the user's own messages; falls back to the username.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    #[serde(default)]
    pub valid: bool,
}

// ============================================================================
// Rooms
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    #[serde(default, alias = "name")]
    pub room_name: Option<String>,
    #[serde(default, alias = "onlineCount")]
    pub active_users: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub room: Option<RoomRef>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(time_stamp: &str, sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            sender: sender.to_string(),
            content: content.to_string(),
            room_id: "room-1".to_string(),
            time_stamp: time_stamp.to_string(),
            sender_full_name: None,
            file_url: None,
            file_type: None,
            file_name: None,
            original_file_name: None,
            file_size: None,
            message_type: None,
        }
    }

    #[test]
    fn history_item_deserializes_wire_names() {
        let raw = r#"{
            "sender": "alice",
            "content": "hello",
            "roomId": "room-1",
            "timeStamp": "2025-03-01T10:15:00.000Z",
            "senderFullName": "Alice Smith",
            "messageType": "text"
        }"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.room_id, "room-1");
        assert_eq!(msg.time_stamp, "2025-03-01T10:15:00.000Z");
        assert_eq!(msg.sender_full_name.as_deref(), Some("Alice Smith"));
        assert!(!msg.has_attachment());
    }

    #[test]
    fn file_message_deserializes_attachment_fields() {
        let raw = r#"{
            "sender": "bob",
            "content": "photo.png",
            "roomId": "room-1",
            "timeStamp": "2025-03-01T10:16:00.000Z",
            "fileUrl": "/api/v1/files/abc123",
            "fileType": "image/png",
            "originalFileName": "photo.png",
            "fileSize": 52413,
            "messageType": "image"
        }"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.file_url.as_deref(), Some("/api/v1/files/abc123"));
        assert_eq!(msg.file_size, Some(52413));
        match msg.body() {
            MessageContent::Image { url, name } => {
                assert_eq!(url, "/api/v1/files/abc123");
                assert_eq!(name, "photo.png");
            }
            other => panic!("expected image body, got {:?}", other),
        }
    }

    #[test]
    fn outgoing_message_serializes_exactly_five_keys() {
        let msg = OutgoingMessage {
            sender: "alice".to_string(),
            content: "hi".to_string(),
            room_id: "room-1".to_string(),
            time_stamp: "2025-03-01T10:15:00.000Z".to_string(),
            sender_full_name: "Alice Smith".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        for key in ["sender", "content", "roomId", "timeStamp", "senderFullName"] {
            assert!(obj.contains_key(key), "missing key {}", key);
        }
    }

    #[test]
    fn same_event_matches_on_the_identity_triple() {
        let a = text_message("2025-03-01T10:15:00.000Z", "alice", "hi");
        let mut b = a.clone();
        b.sender_full_name = Some("Alice Smith".to_string());
        assert!(a.same_event(&b));

        let mut c = a.clone();
        c.content = "hi!".to_string();
        assert!(!a.same_event(&c));
    }

    #[test]
    fn same_day_detects_calendar_boundaries() {
        let a = text_message("2025-03-01T10:00:00.000Z", "alice", "a");
        let b = text_message("2025-03-01T12:00:00.000Z", "alice", "b");
        let c = text_message("2025-03-02T12:00:00.000Z", "alice", "c");
        assert!(a.same_day(&b));
        assert!(!b.same_day(&c));
    }

    #[test]
    fn unparseable_timestamps_never_group() {
        let a = text_message("not-a-date", "alice", "a");
        let b = text_message("not-a-date", "alice", "b");
        assert!(!a.same_day(&b));
    }

    #[test]
    fn now_timestamp_is_rfc3339_utc() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
