use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation between accounts. Group conversations are tied 1:1 to a
/// crew and managed by the roster synchronizer; private ones hold an
/// arbitrary participant set.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub conversation_id: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub crew_id: Option<String>,
    pub participants: Vec<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

pub mod message_type {
    pub const TEXT: &str = "text";
    pub const REQUEST: &str = "request";
    pub const INCIDENT: &str = "incident";

    pub const ALL: [&str; 3] = [TEXT, REQUEST, INCIDENT];
}

/// A message in a conversation. `sender_id = None` marks a system message.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: Option<String>,
    pub content: String,
    pub message_type: String,
    pub read_by: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One entry of the `messages_json` snapshot inside an `ArchivedChat`.
/// The shape round-trips: it is read back for display after the live
/// conversation is gone.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub sender_id: Option<String>,
    pub sender_username: String,
    pub content: String,
    pub message_type: String,
    /// ISO-8601 timestamp.
    pub created_at: String,
}

/// Point-in-time snapshot of a conversation, written exactly once when the
/// conversation is archived and kept even if the live row is later deleted.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ArchivedChat {
    pub archive_id: String,
    pub conversation_id: String,
    /// JSON array of `MessageSnapshot`, chronological.
    pub messages_json: String,
    /// JSON array of participant user ids.
    pub participants_json: String,
    pub reason: String,
    pub archived_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ArchivedChat {
    pub fn messages(&self) -> Vec<MessageSnapshot> {
        serde_json::from_str(&self.messages_json).unwrap_or_default()
    }

    pub fn participant_ids(&self) -> Vec<String> {
        serde_json::from_str(&self.participants_json).unwrap_or_default()
    }
}
