//! # duet-store
//!
//! Persistence layer for the duet messaging core, backed by SQLite.
//!
//! Three stores live here, deliberately loosely coupled:
//! - the append-only **message log** (source of truth),
//! - the denormalized **chat head** projection (disposable cache,
//!   rebuildable from the log),
//! - the per-user **notification feed**.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed helpers for every store.

pub mod chat_heads;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
