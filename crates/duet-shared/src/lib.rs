//! # duet-shared
//!
//! Plain data types and pure logic shared by the duet messaging core:
//! chat identity resolution, message kind/status enums, notification
//! types, transient broadcast payloads, and the common error taxonomy.
//!
//! Nothing in this crate touches storage or the network.

pub mod constants;
pub mod events;
pub mod types;

mod error;

pub use error::MessagingError;
pub use types::{ChatId, MessageKind, MessageStatus, NotificationType};
