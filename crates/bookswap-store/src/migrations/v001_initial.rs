//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `users`, `books`, `exchanges`,
//! `chat_threads` and `chat_messages`, plus the two unique indexes that
//! serialize concurrent writers: one active exchange per book, one thread per
//! canonical user pair.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    email      TEXT NOT NULL UNIQUE,
    username   TEXT NOT NULL UNIQUE,
    full_name  TEXT,
    city       TEXT,
    about      TEXT,
    created_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Books
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS books (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT NOT NULL,
    author      TEXT NOT NULL,
    description TEXT,
    genre       TEXT,
    condition   TEXT,
    cover_key   TEXT,                       -- object-storage key, nullable
    owner_id    INTEGER NOT NULL,
    status      TEXT NOT NULL DEFAULT 'available',  -- available | exchanged
    created_at  TEXT NOT NULL,
    updated_at  TEXT,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_books_owner  ON books(owner_id);
CREATE INDEX IF NOT EXISTS idx_books_status ON books(status);

-- ----------------------------------------------------------------
-- Exchanges
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS exchanges (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id      INTEGER NOT NULL,
    requester_id INTEGER NOT NULL,
    owner_id     INTEGER NOT NULL,          -- denormalized from the book at creation
    status       TEXT NOT NULL DEFAULT 'pending',   -- pending | accepted | rejected
    created_at   TEXT NOT NULL,
    updated_at   TEXT,

    FOREIGN KEY (book_id)      REFERENCES books(id),
    FOREIGN KEY (requester_id) REFERENCES users(id),
    FOREIGN KEY (owner_id)     REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_exchanges_requester ON exchanges(requester_id);
CREATE INDEX IF NOT EXISTS idx_exchanges_owner     ON exchanges(owner_id);

-- At most one live proposal per book.  Concurrent inserts lose here, not in
-- application code.
CREATE UNIQUE INDEX IF NOT EXISTS idx_exchanges_active_book
    ON exchanges(book_id) WHERE status IN ('pending', 'accepted');

-- ----------------------------------------------------------------
-- Chat threads
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_threads (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_one_id     INTEGER NOT NULL,
    user_two_id     INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT,
    last_message    TEXT,                   -- denormalized preview cache
    last_sender_id  INTEGER,
    last_message_at TEXT,

    FOREIGN KEY (user_one_id)    REFERENCES users(id),
    FOREIGN KEY (user_two_id)    REFERENCES users(id),
    FOREIGN KEY (last_sender_id) REFERENCES users(id),
    CHECK (user_one_id < user_two_id)
);

-- Thread identity is the canonically ordered pair.
CREATE UNIQUE INDEX IF NOT EXISTS idx_threads_pair
    ON chat_threads(user_one_id, user_two_id);

-- ----------------------------------------------------------------
-- Chat messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id  INTEGER NOT NULL,
    sender_id  INTEGER NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_read    INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    read_at    TEXT,

    FOREIGN KEY (thread_id) REFERENCES chat_threads(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_thread_ts
    ON chat_messages(thread_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
