//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be
//! returned directly from an API handler.

use chrono::{DateTime, Utc};
use duet_shared::{ChatId, MessageKind, MessageStatus, NotificationType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message in the append-only log.
///
/// Rows are immutable after insertion except for `status` (advanced
/// only through the forward-only state machine in
/// [`crate::messages`]) and the two per-participant deletion flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// Chat this message belongs to; always `ChatId::resolve(sender, receiver)`.
    pub chat_id: ChatId,
    pub sender_id: String,
    pub receiver_id: String,
    /// Message body. May be empty for non-text kinds.
    pub body: String,
    pub kind: MessageKind,
    /// Reference to an uploaded media object, if any.
    pub media_ref: Option<String>,
    /// Delivery lifecycle state, starts at `sent`.
    pub status: MessageStatus,
    pub deleted_by_sender: bool,
    pub deleted_by_receiver: bool,
    /// Log-assigned insertion sequence. The authoritative per-chat
    /// display order; wall-clock ties between concurrent writers are
    /// broken by this value.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether `user_id` is one of the two participants.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// Whether this message is still visible to `user_id` (their own
    /// soft-delete flag is clear).
    pub fn visible_to(&self, user_id: &str) -> bool {
        if self.sender_id == user_id {
            !self.deleted_by_sender
        } else if self.receiver_id == user_id {
            !self.deleted_by_receiver
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// ChatHead
// ---------------------------------------------------------------------------

/// Denormalized per-conversation summary, one row per chat id.
///
/// A disposable read-optimization over the message log: it can be
/// rebuilt from the log at any time and holds nothing that is not
/// recoverable from it. The participant pair is immutable after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatHead {
    pub chat_id: ChatId,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_snippet: String,
    pub last_sender_id: String,
    pub last_message_kind: MessageKind,
    pub last_updated: DateTime<Utc>,
    /// Sequence number of the message this head reflects. Backs the
    /// last-write-wins upsert under concurrent appends.
    pub last_seq: i64,
    pub unread: bool,
}

impl ChatHead {
    pub fn participants(&self) -> [&str; 2] {
        [&self.participant_a, &self.participant_b]
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A persisted notification, exclusively owned by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    /// Entity that triggered the notification, e.g. a message or
    /// application id.
    pub related_entity_id: Option<String>,
    /// e.g. "Message", "Application", "JobPost".
    pub related_entity_type: Option<String>,
    /// Frontend navigation target.
    pub action_url: Option<String>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub high_priority: bool,
    pub created_at: DateTime<Utc>,
}
