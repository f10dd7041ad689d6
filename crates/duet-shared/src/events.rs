//! Transient payloads carried on the live channels.
//!
//! These records exist only on the wire; none of them is persisted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChatId, MessageStatus};

// The broadcast envelope that wraps these lives in `duet-chat`, next to
// the fan-out hub, because it also carries full persisted messages.

/// Typing indicator for a chat room side-channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingIndicator {
    pub chat_id: ChatId,
    pub user_id: String,
    pub user_name: String,
    pub is_typing: bool,
}

/// A delivery/read acknowledgement broadcast to the chat room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusUpdate {
    pub message_id: Uuid,
    pub chat_id: ChatId,
    pub status: MessageStatus,
    pub user_id: String,
}
