//! JSON payloads exchanged with clients.
//!
//! The same types are returned by the REST API, pushed over the live
//! channel and decoded by the client crate, so the three always agree on
//! the wire format.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a user, embedded in messages and conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Kind of media carried by an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
}

impl MediaKind {
    /// Classify a MIME type; anything that is neither image nor video is `None`.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let lower = content_type.trim().to_ascii_lowercase();
        if lower.starts_with("image/") {
            Some(Self::Image)
        } else if lower.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Attachment as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub id: String,
    pub kind: MediaKind,
    pub url: String,
    pub content_type: String,
    pub size: i64,
}

/// A fully populated message: sender summary and attachments included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender: Option<UserSummary>,
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    pub created_at: DateTime<Utc>,
}

/// Conversation with its members and latest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub id: String,
    /// `None` for direct (1:1) conversations.
    pub name: Option<String>,
    pub is_direct: bool,
    pub members: Vec<UserSummary>,
    pub last_message: Option<MessagePayload>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Event pushed to a live connection.
///
/// Serialized as `{"type": "newMessage", "message": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LiveEvent {
    /// A message was posted to one of the user's conversations.
    NewMessage { message: MessagePayload },
}
