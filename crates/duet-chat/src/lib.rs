//! # duet-chat
//!
//! The real-time messaging core: message send orchestration over the
//! append-only log, the chat-head projection policy, live fan-out to
//! subscribers, and the notification dispatch boundary.
//!
//! Consistency contract, in one place: the message log is the source
//! of truth. The chat head is a disposable projection updated
//! best-effort after a durable append; a failed head update leaves a
//! stale-but-safe summary that the next append repairs. Live broadcast
//! is fire-and-forget on top of the log; a subscriber that misses an
//! event catches up through history.

pub mod broadcast;
pub mod notifier;
pub mod service;

pub use broadcast::{BroadcastEvent, Broadcaster};
pub use notifier::Notifier;
pub use service::ChatService;
