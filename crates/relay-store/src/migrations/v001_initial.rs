//! v001 -- Initial schema.
//!
//! Timestamps are RFC-3339 text; booleans are 0/1 integers.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participants (
    user_id             INTEGER PRIMARY KEY NOT NULL,
    role                TEXT NOT NULL DEFAULT 'ordinary',
    display_name        TEXT,
    banned              INTEGER NOT NULL DEFAULT 0,
    muted_until         TEXT,
    warnings            INTEGER NOT NULL DEFAULT 0,
    tag_enabled         INTEGER NOT NULL DEFAULT 0,
    tag_text            TEXT,
    custom_tag          TEXT,
    custom_tag_enabled  INTEGER NOT NULL DEFAULT 0,
    admin_tag_enabled   INTEGER NOT NULL DEFAULT 0,
    creator_tag_enabled INTEGER NOT NULL DEFAULT 0,
    protect_content     INTEGER NOT NULL DEFAULT 0,
    autodelete_minutes  INTEGER NOT NULL DEFAULT 0,
    message_count       INTEGER NOT NULL DEFAULT 0,
    last_message_text   TEXT,
    last_message_at     TEXT,
    captcha_passed      INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Logical messages, keyed by (sender, sender-assigned id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS logical_messages (
    sender_id          INTEGER NOT NULL,
    message_id         INTEGER NOT NULL,
    kind               TEXT NOT NULL,
    content            TEXT NOT NULL DEFAULT '',
    reply_sender_id    INTEGER,
    reply_message_id   INTEGER,
    paid_stars         INTEGER,
    paid_description   TEXT,
    edited_at          TEXT,
    created_at         TEXT NOT NULL,

    PRIMARY KEY (sender_id, message_id)
);

-- ----------------------------------------------------------------
-- Delivered copies, keyed by the recipient's chat
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS copies (
    recipient_id  INTEGER NOT NULL,
    delivered_id  INTEGER NOT NULL,
    sender_id     INTEGER NOT NULL,
    message_id    INTEGER NOT NULL,
    kind          TEXT NOT NULL,
    content       TEXT NOT NULL DEFAULT '',
    reply_to_id   INTEGER,
    created_at    TEXT NOT NULL,

    PRIMARY KEY (recipient_id, delivered_id)
);

CREATE INDEX IF NOT EXISTS idx_copies_logical ON copies(sender_id, message_id);

-- ----------------------------------------------------------------
-- Correspondence map: (logical, recipient) -> delivered
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_map (
    sender_id     INTEGER NOT NULL,
    message_id    INTEGER NOT NULL,
    recipient_id  INTEGER NOT NULL,
    delivered_id  INTEGER NOT NULL,
    created_at    TEXT NOT NULL,

    PRIMARY KEY (sender_id, message_id, recipient_id)
);

CREATE INDEX IF NOT EXISTS idx_message_map_delivered
    ON message_map(recipient_id, delivered_id);

-- ----------------------------------------------------------------
-- Ignore relation: user_id ignores ignored_id
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ignores (
    user_id     INTEGER NOT NULL,
    ignored_id  INTEGER NOT NULL,

    PRIMARY KEY (user_id, ignored_id)
);

CREATE TABLE IF NOT EXISTS bot_settings (
    key    TEXT PRIMARY KEY NOT NULL,
    value  TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Stats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS stats (
    date           TEXT PRIMARY KEY NOT NULL,   -- YYYY-MM-DD
    message_count  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_stats (
    user_id        INTEGER NOT NULL,
    date           TEXT NOT NULL,
    message_count  INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (user_id, date)
);

-- ----------------------------------------------------------------
-- Moderation log
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS warnings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL,
    issued_by   INTEGER NOT NULL,
    reason      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_warnings_user ON warnings(user_id);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        up(&conn).unwrap();
        up(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }
}
