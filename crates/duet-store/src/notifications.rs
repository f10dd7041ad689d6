//! CRUD operations for [`Notification`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Notification;

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, related_entity_id, \
     related_entity_type, action_url, read, read_at, high_priority, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new notification.
    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications (id, user_id, kind, title, body, related_entity_id,
                                        related_entity_type, action_url, read, read_at,
                                        high_priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                notification.id.to_string(),
                notification.user_id,
                notification.kind.as_str(),
                notification.title,
                notification.body,
                notification.related_entity_id,
                notification.related_entity_type,
                notification.action_url,
                notification.read,
                notification.read_at.map(|t| t.to_rfc3339()),
                notification.high_priority,
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single notification by UUID.
    pub fn get_notification(&self, id: Uuid) -> Result<Notification> {
        self.conn()
            .query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                params![id.to_string()],
                row_to_notification,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// A user's notifications, newest first, optionally unread only.
    pub fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
             ORDER BY created_at DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![user_id, unread_only, limit], row_to_notification)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    /// Count of unread notifications for the badge counter.
    pub fn unread_notification_count(&self, user_id: &str) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Mutation (read tracking)
    // ------------------------------------------------------------------

    /// Mark a notification read, stamping `read_at`.
    ///
    /// Idempotent: an already-read notification is left untouched.
    pub fn mark_notification_read(&self, id: Uuid) -> Result<Notification> {
        self.conn().execute(
            "UPDATE notifications SET read = 1, read_at = ?2 WHERE id = ?1 AND read = 0",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        self.get_notification(id)
    }

    /// Mark everything unread for a user as read. Returns the number of
    /// rows changed.
    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE notifications SET read = 1, read_at = ?2 WHERE user_id = ?1 AND read = 0",
            params![user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------

    /// Delete a user's read notifications (retention sweep). Unread
    /// rows are never removed here.
    pub fn delete_read_notifications(&self, user_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM notifications WHERE user_id = ?1 AND read = 1",
            params![user_id],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Notification`].
fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id_str: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let title: String = row.get(3)?;
    let body: String = row.get(4)?;
    let related_entity_id: Option<String> = row.get(5)?;
    let related_entity_type: Option<String> = row.get(6)?;
    let action_url: Option<String> = row.get(7)?;
    let read: bool = row.get(8)?;
    let read_at_str: Option<String> = row.get(9)?;
    let high_priority: bool = row.get(10)?;
    let created_str: String = row.get(11)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let kind = kind_str.parse().map_err(|e: duet_shared::MessagingError| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Notification {
        id,
        user_id,
        kind,
        title,
        body,
        related_entity_id,
        related_entity_type,
        action_url,
        read,
        read_at: read_at_str.as_deref().map(|s| parse_ts(s, 9)).transpose()?,
        high_priority,
        created_at: parse_ts(&created_str, 11)?,
    })
}

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}
