//! v001 -- Initial schema creation.
//!
//! Creates `users`, `records`, `singletons`, and `chat_messages`. Every data
//! table leads with `user_id` in its key so that a query cannot name a row
//! without naming its owner.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (email/password accounts)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,          -- UUID v4
    email         TEXT NOT NULL COLLATE NOCASE,
    name          TEXT,
    password_hash TEXT NOT NULL,                      -- Argon2 PHC string
    created_at    TEXT NOT NULL                       -- RFC-3339, UTC, micros
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email);

-- ----------------------------------------------------------------
-- Records (list kinds: mood, journal, stress_history, sleep, mindfulness)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS records (
    user_id    TEXT NOT NULL,
    kind       TEXT NOT NULL,
    id         TEXT NOT NULL,                         -- unique per (user, kind)
    payload    TEXT NOT NULL,                         -- JSON object
    sort_key   TEXT NOT NULL,                         -- per-kind ordering stamp
    created_at TEXT NOT NULL,
    updated_at TEXT,

    PRIMARY KEY (user_id, kind, id)
);

CREATE INDEX IF NOT EXISTS idx_records_order
    ON records(user_id, kind, sort_key DESC);

-- ----------------------------------------------------------------
-- Singletons (stress_kit, profile, assessment, subscription)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS singletons (
    user_id    TEXT NOT NULL,
    kind       TEXT NOT NULL,
    id         TEXT NOT NULL,
    payload    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (user_id, kind)
);

-- ----------------------------------------------------------------
-- Chat transcripts: one row per message, ordered by seq
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_messages (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL,
    topic_key  TEXT NOT NULL,
    id         TEXT NOT NULL,
    role       TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_chat_messages_id
    ON chat_messages(user_id, topic_key, id);

CREATE INDEX IF NOT EXISTS idx_chat_messages_topic
    ON chat_messages(user_id, topic_key, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
