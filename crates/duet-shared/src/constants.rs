//! Stable contract constants: live channel topic naming and defaults.

/// Default number of messages returned by a history query.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Default page size for notification listings.
pub const DEFAULT_NOTIFICATION_LIMIT: u32 = 20;

/// Snippet seeded into a chat head created without an initial message
/// (e.g. when a collaboration request is accepted).
pub const CHAT_SEED_SNIPPET: &str = "Chat initiated via collaboration request.";

/// Bound on a single subscriber's in-flight event queue. A subscriber
/// that falls further behind than this starts losing events.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 256;
