//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `messages`, `chat_heads`, and
//! `notifications`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages (append-only log; source of truth)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq                 INTEGER PRIMARY KEY AUTOINCREMENT, -- authoritative per-chat order
    id                  TEXT NOT NULL UNIQUE,              -- UUID v4
    chat_id             TEXT NOT NULL,                     -- resolve(sender, receiver)
    sender_id           TEXT NOT NULL,
    receiver_id         TEXT NOT NULL,
    body                TEXT NOT NULL,
    kind                TEXT NOT NULL,                     -- text | image | file | system
    media_ref           TEXT,
    status              TEXT NOT NULL DEFAULT 'sent',      -- sent | delivered | read
    deleted_by_sender   INTEGER NOT NULL DEFAULT 0,        -- boolean 0/1
    deleted_by_receiver INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,                     -- ISO-8601 / RFC-3339
    delivered_at        TEXT,
    read_at             TEXT
);

-- Primary access path: most recent N for a chat.
CREATE INDEX IF NOT EXISTS idx_messages_chat_seq
    ON messages(chat_id, seq DESC);

-- ----------------------------------------------------------------
-- Chat heads (denormalized projection; rebuildable from messages)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_heads (
    chat_id              TEXT PRIMARY KEY NOT NULL,
    participant_a        TEXT NOT NULL,
    participant_b        TEXT NOT NULL,
    last_message_snippet TEXT NOT NULL,
    last_sender_id       TEXT NOT NULL,
    last_message_kind    TEXT NOT NULL,
    last_updated         TEXT NOT NULL,
    last_seq             INTEGER NOT NULL DEFAULT 0,       -- LWW guard for concurrent upserts
    unread               INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_chat_heads_participant_a ON chat_heads(participant_a);
CREATE INDEX IF NOT EXISTS idx_chat_heads_participant_b ON chat_heads(participant_b);

-- ----------------------------------------------------------------
-- Notifications (per-user feed)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id                  TEXT PRIMARY KEY NOT NULL,         -- UUID v4
    user_id             TEXT NOT NULL,
    kind                TEXT NOT NULL,
    title               TEXT NOT NULL,
    body                TEXT NOT NULL,
    related_entity_id   TEXT,
    related_entity_type TEXT,
    action_url          TEXT,
    read                INTEGER NOT NULL DEFAULT 0,
    read_at             TEXT,
    high_priority       INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);

-- Primary access paths: page by recency, count unread.
CREATE INDEX IF NOT EXISTS idx_notifications_user_created
    ON notifications(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_notifications_user_read
    ON notifications(user_id, read);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
