//! The append-only message log and the per-message status machine.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::MessageStatus;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

const MESSAGE_COLUMNS: &str = "seq, id, chat_id, sender_id, receiver_id, body, kind, media_ref, \
     status, deleted_by_sender, deleted_by_receiver, created_at, delivered_at, read_at";

impl Database {
    // ------------------------------------------------------------------
    // Append
    // ------------------------------------------------------------------

    /// Append a message to the log and return its assigned sequence
    /// number.
    ///
    /// The sequence is allocated by SQLite at insert time and is the
    /// authoritative display order within a chat; `message.seq` is
    /// ignored on the way in.
    pub fn insert_message(&self, message: &Message) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO messages (id, chat_id, sender_id, receiver_id, body, kind, media_ref,
                                   status, deleted_by_sender, deleted_by_receiver, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                message.id.to_string(),
                message.chat_id.as_str(),
                message.sender_id,
                message.receiver_id,
                message.body,
                message.kind.as_str(),
                message.media_ref,
                message.status.as_str(),
                message.deleted_by_sender,
                message.deleted_by_receiver,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by UUID.
    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The most recent `limit` messages for a chat, newest first,
    /// excluding rows the viewer has soft-deleted.
    ///
    /// Ordered by the log-assigned sequence, not wall-clock time, so
    /// concurrent appends with tied timestamps still read back in
    /// insertion order.
    pub fn recent_messages(
        &self,
        chat_id: &str,
        viewer_id: &str,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1
               AND NOT (sender_id = ?2 AND deleted_by_sender = 1)
               AND NOT (receiver_id = ?2 AND deleted_by_receiver = 1)
             ORDER BY seq DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![chat_id, viewer_id, limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    // ------------------------------------------------------------------
    // Status machine
    // ------------------------------------------------------------------

    /// Advance a message's status, atomically enforcing the
    /// forward-only rule (`sent -> delivered -> read`).
    ///
    /// The rank comparison happens inside the UPDATE, so two
    /// concurrent status writers cannot regress each other. Returns
    /// `true` if the row changed; a stale or duplicate update is a
    /// silent no-op returning `false`.
    pub fn advance_message_status(&self, id: Uuid, new_status: MessageStatus) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = self.conn().execute(
            "UPDATE messages SET
                 status = ?1,
                 delivered_at = CASE WHEN ?1 = 'delivered' THEN ?2 ELSE delivered_at END,
                 read_at      = CASE WHEN ?1 = 'read'      THEN ?2 ELSE read_at      END
             WHERE id = ?3
               AND (CASE status WHEN 'sent' THEN 0 WHEN 'delivered' THEN 1 ELSE 2 END) < ?4",
            params![new_status.as_str(), now, id.to_string(), new_status.rank()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Set the caller's own soft-delete flag on a message.
    ///
    /// The other participant's view is unaffected. Returns `true` if a
    /// row matched (i.e. the user is a participant of the message).
    pub fn mark_message_deleted(&self, id: Uuid, user_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET
                 deleted_by_sender   = CASE WHEN sender_id   = ?2 THEN 1 ELSE deleted_by_sender   END,
                 deleted_by_receiver = CASE WHEN receiver_id = ?2 THEN 1 ELSE deleted_by_receiver END
             WHERE id = ?1 AND (sender_id = ?2 OR receiver_id = ?2)",
            params![id.to_string(), user_id],
        )?;
        Ok(affected > 0)
    }

    /// Hard-delete every message of a chat. Returns the number of rows
    /// removed. Callers must also drop the chat head.
    pub fn delete_chat_messages(&self, chat_id: &str) -> Result<usize> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let seq: i64 = row.get(0)?;
    let id_str: String = row.get(1)?;
    let chat_id: String = row.get(2)?;
    let sender_id: String = row.get(3)?;
    let receiver_id: String = row.get(4)?;
    let body: String = row.get(5)?;
    let kind_str: String = row.get(6)?;
    let media_ref: Option<String> = row.get(7)?;
    let status_str: String = row.get(8)?;
    let deleted_by_sender: bool = row.get(9)?;
    let deleted_by_receiver: bool = row.get(10)?;
    let created_str: String = row.get(11)?;
    let delivered_str: Option<String> = row.get(12)?;
    let read_str: Option<String> = row.get(13)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let kind = kind_str.parse().map_err(|e: duet_shared::MessagingError| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status = status_str.parse().map_err(|e: duet_shared::MessagingError| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id,
        chat_id: duet_shared::ChatId::from_raw(chat_id),
        sender_id,
        receiver_id,
        body,
        kind,
        media_ref,
        status,
        deleted_by_sender,
        deleted_by_receiver,
        seq,
        created_at: parse_ts(&created_str, 11)?,
        delivered_at: delivered_str.as_deref().map(|s| parse_ts(s, 12)).transpose()?,
        read_at: read_str.as_deref().map(|s| parse_ts(s, 13)).transpose()?,
    })
}

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use duet_shared::{ChatId, MessageKind};

    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn sample_message(sender: &str, receiver: &str, body: &str) -> Message {
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
            seq: 0,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }

    #[test]
    fn insert_assigns_increasing_seq() {
        let db = test_db();
        let first = db.insert_message(&sample_message("u1", "u2", "one")).unwrap();
        let second = db.insert_message(&sample_message("u1", "u2", "two")).unwrap();
        assert!(second > first);
    }

    #[test]
    fn recent_messages_read_back_in_insertion_order() {
        let db = test_db();
        for i in 0..5 {
            db.insert_message(&sample_message("u1", "u2", &format!("m{i}")))
                .unwrap();
        }
        // Interleave an unrelated chat; it must not leak into u1_u2.
        db.insert_message(&sample_message("u1", "u3", "other")).unwrap();

        let history = db.recent_messages("u1_u2", "u1", 50).unwrap();
        let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["m4", "m3", "m2", "m1", "m0"]);
    }

    #[test]
    fn recent_messages_honors_limit() {
        let db = test_db();
        for i in 0..10 {
            db.insert_message(&sample_message("u1", "u2", &format!("m{i}")))
                .unwrap();
        }
        let history = db.recent_messages("u1_u2", "u1", 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].body, "m9");
    }

    #[test]
    fn status_advances_and_never_regresses() {
        let db = test_db();
        let msg = sample_message("u1", "u2", "hi");
        db.insert_message(&msg).unwrap();

        assert!(db.advance_message_status(msg.id, MessageStatus::Delivered).unwrap());
        // Regression attempt is a silent no-op.
        assert!(!db.advance_message_status(msg.id, MessageStatus::Sent).unwrap());
        assert_eq!(db.get_message(msg.id).unwrap().status, MessageStatus::Delivered);

        assert!(db.advance_message_status(msg.id, MessageStatus::Read).unwrap());
        // Duplicate delivery of the same ack changes nothing.
        assert!(!db.advance_message_status(msg.id, MessageStatus::Read).unwrap());

        let stored = db.get_message(msg.id).unwrap();
        assert_eq!(stored.status, MessageStatus::Read);
        assert!(stored.delivered_at.is_some());
        assert!(stored.read_at.is_some());
    }

    #[test]
    fn status_can_jump_straight_to_read() {
        let db = test_db();
        let msg = sample_message("u1", "u2", "hi");
        db.insert_message(&msg).unwrap();

        assert!(db.advance_message_status(msg.id, MessageStatus::Read).unwrap());
        assert_eq!(db.get_message(msg.id).unwrap().status, MessageStatus::Read);
    }

    #[test]
    fn soft_delete_hides_only_the_deleting_side() {
        let db = test_db();
        let msg = sample_message("u1", "u2", "hi");
        db.insert_message(&msg).unwrap();

        assert!(db.mark_message_deleted(msg.id, "u1").unwrap());

        assert!(db.recent_messages("u1_u2", "u1", 50).unwrap().is_empty());
        assert_eq!(db.recent_messages("u1_u2", "u2", 50).unwrap().len(), 1);
    }

    #[test]
    fn soft_delete_by_stranger_matches_nothing() {
        let db = test_db();
        let msg = sample_message("u1", "u2", "hi");
        db.insert_message(&msg).unwrap();

        assert!(!db.mark_message_deleted(msg.id, "intruder").unwrap());
    }

    #[test]
    fn delete_chat_messages_is_scoped_to_the_chat() {
        let db = test_db();
        db.insert_message(&sample_message("u1", "u2", "a")).unwrap();
        db.insert_message(&sample_message("u1", "u2", "b")).unwrap();
        db.insert_message(&sample_message("u1", "u3", "keep")).unwrap();

        assert_eq!(db.delete_chat_messages("u1_u2").unwrap(), 2);
        assert_eq!(db.recent_messages("u1_u3", "u1", 50).unwrap().len(), 1);
    }

    #[test]
    fn get_missing_message_is_not_found() {
        let db = test_db();
        assert!(matches!(
            db.get_message(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }
}
