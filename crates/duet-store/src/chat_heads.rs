//! The denormalized chat-head projection.
//!
//! One row per chat id, summarizing the most recent message for the
//! conversation list. The message log is the source of truth; these
//! rows are a disposable cache kept eventually consistent by
//! last-write-wins upserts keyed on the log sequence.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChatHead, Message};

const HEAD_COLUMNS: &str = "chat_id, participant_a, participant_b, last_message_snippet, \
     last_sender_id, last_message_kind, last_updated, last_seq, unread";

impl Database {
    // ------------------------------------------------------------------
    // Upsert
    // ------------------------------------------------------------------

    /// Fold an appended message into its chat head, creating the head
    /// lazily on first message.
    ///
    /// The update is guarded by `last_seq`: when two appends to the
    /// same chat race, whichever carries the greater log sequence wins
    /// regardless of arrival order, so the head never goes backwards.
    /// This is the per-chat write serialization point.
    pub fn upsert_chat_head_from_message(&self, message: &Message) -> Result<()> {
        let (a, b) = sorted_pair(&message.sender_id, &message.receiver_id);

        self.conn().execute(
            "INSERT INTO chat_heads (chat_id, participant_a, participant_b,
                                     last_message_snippet, last_sender_id, last_message_kind,
                                     last_updated, last_seq, unread)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
             ON CONFLICT(chat_id) DO UPDATE SET
                 last_message_snippet = excluded.last_message_snippet,
                 last_sender_id       = excluded.last_sender_id,
                 last_message_kind    = excluded.last_message_kind,
                 last_updated         = excluded.last_updated,
                 last_seq             = excluded.last_seq,
                 unread               = 1
             WHERE excluded.last_seq > chat_heads.last_seq",
            params![
                message.chat_id.as_str(),
                a,
                b,
                message.body,
                message.sender_id,
                message.kind.as_str(),
                message.created_at.to_rfc3339(),
                message.seq,
            ],
        )?;
        Ok(())
    }

    /// Create a chat head with a seed snippet if none exists yet.
    ///
    /// Idempotent: concurrent callers race on the single `chat_id` key
    /// and every caller reads back the same row.
    pub fn create_chat_head_if_absent(
        &self,
        chat_id: &str,
        user_a: &str,
        user_b: &str,
        seed_snippet: &str,
    ) -> Result<ChatHead> {
        let (a, b) = sorted_pair(user_a, user_b);

        self.conn().execute(
            "INSERT OR IGNORE INTO chat_heads
                 (chat_id, participant_a, participant_b, last_message_snippet,
                  last_sender_id, last_message_kind, last_updated, last_seq, unread)
             VALUES (?1, ?2, ?3, ?4, ?5, 'text', ?6, 0, 0)",
            params![chat_id, a, b, seed_snippet, user_a, Utc::now().to_rfc3339()],
        )?;

        self.get_chat_head(chat_id)
    }

    /// Clear the unread flag for a chat (receiver opened it).
    pub fn clear_chat_unread(&self, chat_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE chat_heads SET unread = 0 WHERE chat_id = ?1",
            params![chat_id],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat head.
    pub fn get_chat_head(&self, chat_id: &str) -> Result<ChatHead> {
        self.conn()
            .query_row(
                &format!("SELECT {HEAD_COLUMNS} FROM chat_heads WHERE chat_id = ?1"),
                params![chat_id],
                row_to_chat_head,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All chats a user participates in, most recently active first.
    pub fn list_chat_heads_for_user(&self, user_id: &str) -> Result<Vec<ChatHead>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {HEAD_COLUMNS} FROM chat_heads
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY last_updated DESC"
        ))?;

        let rows = stmt.query_map(params![user_id], row_to_chat_head)?;

        let mut heads = Vec::new();
        for row in rows {
            heads.push(row?);
        }
        Ok(heads)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a chat head. Returns `true` if a row was deleted.
    pub fn delete_chat_head(&self, chat_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM chat_heads WHERE chat_id = ?1",
            params![chat_id],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sorted_pair<'a>(x: &'a str, y: &'a str) -> (&'a str, &'a str) {
    if x < y {
        (x, y)
    } else {
        (y, x)
    }
}

/// Map a `rusqlite::Row` to a [`ChatHead`].
fn row_to_chat_head(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatHead> {
    let chat_id: String = row.get(0)?;
    let participant_a: String = row.get(1)?;
    let participant_b: String = row.get(2)?;
    let last_message_snippet: String = row.get(3)?;
    let last_sender_id: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;
    let last_seq: i64 = row.get(7)?;
    let unread: bool = row.get(8)?;

    let last_message_kind = kind_str.parse().map_err(|e: duet_shared::MessagingError| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let last_updated: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ChatHead {
        chat_id: duet_shared::ChatId::from_raw(chat_id),
        participant_a,
        participant_b,
        last_message_snippet,
        last_sender_id,
        last_message_kind,
        last_updated,
        last_seq,
        unread,
    })
}

#[cfg(test)]
mod tests {
    use duet_shared::{ChatId, MessageKind, MessageStatus};
    use uuid::Uuid;

    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn message_with_seq(sender: &str, receiver: &str, body: &str, seq: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            chat_id: ChatId::resolve(sender, receiver).unwrap(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            body: body.to_string(),
            kind: MessageKind::Text,
            media_ref: None,
            status: MessageStatus::Sent,
            deleted_by_sender: false,
            deleted_by_receiver: false,
            seq,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }

    #[test]
    fn upsert_creates_head_lazily() {
        let db = test_db();
        let msg = message_with_seq("u1", "u2", "hi", 1);
        db.upsert_chat_head_from_message(&msg).unwrap();

        let head = db.get_chat_head("u1_u2").unwrap();
        assert_eq!(head.last_message_snippet, "hi");
        assert_eq!(head.last_sender_id, "u1");
        assert!(head.unread);
        assert_eq!(head.participants(), ["u1", "u2"]);
    }

    #[test]
    fn upsert_out_of_order_keeps_highest_seq() {
        let db = test_db();
        // The later append (seq 2) lands first; the straggler (seq 1)
        // must not overwrite it.
        db.upsert_chat_head_from_message(&message_with_seq("u1", "u2", "second", 2))
            .unwrap();
        db.upsert_chat_head_from_message(&message_with_seq("u2", "u1", "first", 1))
            .unwrap();

        let head = db.get_chat_head("u1_u2").unwrap();
        assert_eq!(head.last_message_snippet, "second");
        assert_eq!(head.last_seq, 2);
    }

    #[test]
    fn create_if_absent_is_idempotent() {
        let db = test_db();
        let first = db
            .create_chat_head_if_absent("u1_u2", "u1", "u2", "seeded")
            .unwrap();
        let second = db
            .create_chat_head_if_absent("u1_u2", "u2", "u1", "ignored")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.last_message_snippet, "seeded");
    }

    #[test]
    fn list_for_user_is_sorted_by_recency() {
        let db = test_db();
        let mut old = message_with_seq("u1", "u2", "old", 1);
        old.created_at = Utc::now() - chrono::Duration::minutes(5);
        db.upsert_chat_head_from_message(&old).unwrap();
        db.upsert_chat_head_from_message(&message_with_seq("u1", "u3", "new", 2))
            .unwrap();

        let heads = db.list_chat_heads_for_user("u1").unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].last_message_snippet, "new");

        // Non-participants see nothing.
        assert!(db.list_chat_heads_for_user("u9").unwrap().is_empty());
    }

    #[test]
    fn delete_removes_head() {
        let db = test_db();
        db.create_chat_head_if_absent("u1_u2", "u1", "u2", "x").unwrap();

        assert!(db.delete_chat_head("u1_u2").unwrap());
        assert!(!db.delete_chat_head("u1_u2").unwrap());
        assert!(db.list_chat_heads_for_user("u1").unwrap().is_empty());
    }

    #[test]
    fn clear_unread_flag() {
        let db = test_db();
        db.upsert_chat_head_from_message(&message_with_seq("u1", "u2", "hi", 1))
            .unwrap();
        db.clear_chat_unread("u1_u2").unwrap();
        assert!(!db.get_chat_head("u1_u2").unwrap().unread);
    }
}
