use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MessagingError;

// ---------------------------------------------------------------------------
// ChatId
// ---------------------------------------------------------------------------

/// Deterministic identity of a two-party chat.
///
/// Derived from the participant pair, independent of call order:
/// `resolve(a, b) == resolve(b, a)`. Both the lookup path and the
/// creation path go through [`ChatId::resolve`], so two concurrent
/// callers creating the same chat always race on a single key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Derive the chat id for a participant pair.
    ///
    /// Pure and total over all distinct, non-empty id pairs. Self-chats
    /// and empty ids are rejected.
    pub fn resolve(id_a: &str, id_b: &str) -> Result<Self, MessagingError> {
        if id_a.is_empty() || id_b.is_empty() {
            return Err(MessagingError::Validation(
                "participant ids must be non-empty".into(),
            ));
        }
        if id_a == id_b {
            return Err(MessagingError::Validation(
                "cannot open a chat with yourself".into(),
            ));
        }

        let (lo, hi) = if id_a < id_b { (id_a, id_b) } else { (id_b, id_a) };
        Ok(Self(format!("{lo}_{hi}")))
    }

    /// Wrap an already-derived chat id (e.g. from a request path).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Topic carrying the chat room message stream: `chat/{chatId}`.
    pub fn chat_topic(&self) -> String {
        format!("chat/{}", self.0)
    }

    /// Topic carrying typing indicators: `chat/{chatId}/typing`.
    pub fn typing_topic(&self) -> String {
        format!("chat/{}/typing", self.0)
    }

    /// Topic carrying message status updates: `chat/{chatId}/status`.
    pub fn status_topic(&self) -> String {
        format!("chat/{}/status", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Topic carrying a user's cross-chat inbox stream: `inbox/{userId}`.
pub fn inbox_topic(user_id: &str) -> String {
    format!("inbox/{user_id}")
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Payload kind of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

impl FromStr for MessageKind {
    type Err = MessagingError;

    /// Strict parse: an unrecognized kind is a validation error, never
    /// silently coerced to a default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "system" => Ok(Self::System),
            other => Err(MessagingError::Validation(format!(
                "unknown message kind: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MessageStatus
// ---------------------------------------------------------------------------

/// Delivery lifecycle of a message: `sent -> delivered -> read`.
///
/// The status only ever advances; `Read` is terminal. Out-of-order or
/// duplicate updates must be treated as no-ops by callers, which
/// [`MessageStatus::is_advance_from`] makes cheap to check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    /// Position in the forward-only lifecycle (0, 1, 2).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Read => 2,
        }
    }

    /// Whether moving to `self` from `current` is a strict advance.
    /// `sent -> read` is a legal direct jump.
    pub fn is_advance_from(&self, current: MessageStatus) -> bool {
        self.rank() > current.rank()
    }
}

impl FromStr for MessageStatus {
    type Err = MessagingError;

    /// Strict parse: an unrecognized status is a validation error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(MessagingError::Validation(format!(
                "unknown message status: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NotificationType
// ---------------------------------------------------------------------------

/// Domain event categories that produce persisted notifications.
///
/// Most of these originate in the job/application services; the
/// messaging core itself only emits [`NotificationType::MessageReceived`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApplicationSubmitted,
    ApplicationAccepted,
    ApplicationRejected,
    ApplicationShortlisted,
    MessageReceived,
    JobPostClosed,
    CollaborationCompleted,
    SystemAnnouncement,
    AccountSuspended,
    AccountWarning,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationSubmitted => "application_submitted",
            Self::ApplicationAccepted => "application_accepted",
            Self::ApplicationRejected => "application_rejected",
            Self::ApplicationShortlisted => "application_shortlisted",
            Self::MessageReceived => "message_received",
            Self::JobPostClosed => "job_post_closed",
            Self::CollaborationCompleted => "collaboration_completed",
            Self::SystemAnnouncement => "system_announcement",
            Self::AccountSuspended => "account_suspended",
            Self::AccountWarning => "account_warning",
        }
    }

    /// Default human-readable description for the event.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ApplicationSubmitted => "New application received",
            Self::ApplicationAccepted => "Your application was accepted",
            Self::ApplicationRejected => "Your application was rejected",
            Self::ApplicationShortlisted => "You've been shortlisted",
            Self::MessageReceived => "New message received",
            Self::JobPostClosed => "Job post was closed",
            Self::CollaborationCompleted => "Collaboration completed",
            Self::SystemAnnouncement => "System announcement",
            Self::AccountSuspended => "Account suspended",
            Self::AccountWarning => "Account warning",
        }
    }
}

impl FromStr for NotificationType {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application_submitted" => Ok(Self::ApplicationSubmitted),
            "application_accepted" => Ok(Self::ApplicationAccepted),
            "application_rejected" => Ok(Self::ApplicationRejected),
            "application_shortlisted" => Ok(Self::ApplicationShortlisted),
            "message_received" => Ok(Self::MessageReceived),
            "job_post_closed" => Ok(Self::JobPostClosed),
            "collaboration_completed" => Ok(Self::CollaborationCompleted),
            "system_announcement" => Ok(Self::SystemAnnouncement),
            "account_suspended" => Ok(Self::AccountSuspended),
            "account_warning" => Ok(Self::AccountWarning),
            other => Err(MessagingError::Validation(format!(
                "unknown notification type: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_commutative() {
        let ab = ChatId::resolve("alice", "bob").unwrap();
        let ba = ChatId::resolve("bob", "alice").unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.as_str(), "alice_bob");
    }

    #[test]
    fn resolve_distinct_pairs_differ() {
        let ab = ChatId::resolve("alice", "bob").unwrap();
        let ac = ChatId::resolve("alice", "carol").unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn resolve_rejects_self_chat() {
        assert!(ChatId::resolve("alice", "alice").is_err());
    }

    #[test]
    fn resolve_rejects_empty_ids() {
        assert!(ChatId::resolve("", "bob").is_err());
        assert!(ChatId::resolve("alice", "").is_err());
    }

    #[test]
    fn topics_follow_contract() {
        let id = ChatId::resolve("u1", "u2").unwrap();
        assert_eq!(id.chat_topic(), "chat/u1_u2");
        assert_eq!(id.typing_topic(), "chat/u1_u2/typing");
        assert_eq!(id.status_topic(), "chat/u1_u2/status");
        assert_eq!(inbox_topic("u2"), "inbox/u2");
    }

    #[test]
    fn status_advances_forward_only() {
        use MessageStatus::*;
        assert!(Delivered.is_advance_from(Sent));
        assert!(Read.is_advance_from(Sent));
        assert!(Read.is_advance_from(Delivered));
        assert!(!Sent.is_advance_from(Delivered));
        assert!(!Delivered.is_advance_from(Read));
        assert!(!Read.is_advance_from(Read));
    }

    #[test]
    fn unknown_kind_is_rejected_not_defaulted() {
        assert!("audio".parse::<MessageKind>().is_err());
        assert!("READ".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn kind_round_trips_as_str() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::System,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
    }
}
