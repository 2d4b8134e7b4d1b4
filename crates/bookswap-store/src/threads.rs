//! Persistence for [`ChatThread`] records.
//!
//! Thread identity is the canonically ordered user pair.  Creation goes
//! through `INSERT OR IGNORE` against the unique pair index, so two users
//! making first contact concurrently still end up sharing one thread.

use chrono::Utc;
use rusqlite::params;

use crate::database::Database;
use crate::error::{map_not_found, Result};
use crate::models::{opt_ts_from_sql, ts_from_sql, ChatThread, ThreadId, UserId};

const THREAD_COLUMNS: &str = "id, user_one_id, user_two_id, created_at, updated_at, \
                              last_message, last_sender_id, last_message_at";

impl Database {
    /// Look up the thread for a user pair, creating it on first contact.
    ///
    /// The pair must already be in canonical order (`user_one < user_two`);
    /// callers normalize before reaching the store.
    pub fn get_or_create_thread(&mut self, user_one: UserId, user_two: UserId) -> Result<ChatThread> {
        debug_assert!(user_one < user_two, "thread pair must be canonical");

        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        // A lost race turns the insert into a no-op and the select below
        // returns the winner's row.
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO chat_threads (user_one_id, user_two_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![user_one.0, user_two.0, now.to_rfc3339()],
        )?;

        let thread = tx.query_row(
            &format!(
                "SELECT {THREAD_COLUMNS} FROM chat_threads
                 WHERE user_one_id = ?1 AND user_two_id = ?2"
            ),
            params![user_one.0, user_two.0],
            row_to_thread,
        )?;

        tx.commit()?;

        if inserted > 0 {
            tracing::info!(thread = %thread.id, %user_one, %user_two, "chat thread created");
        }
        Ok(thread)
    }

    /// Fetch a single thread by id.
    pub fn get_thread(&self, id: ThreadId) -> Result<ChatThread> {
        self.conn()
            .query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM chat_threads WHERE id = ?1"),
                params![id.0],
                row_to_thread,
            )
            .map_err(map_not_found)
    }

    /// All threads a user participates in, most recently active first.
    /// Threads that have never seen a message sort last.
    pub fn list_threads_for_user(&self, user_id: UserId) -> Result<Vec<ChatThread>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {THREAD_COLUMNS} FROM chat_threads
             WHERE user_one_id = ?1 OR user_two_id = ?1
             ORDER BY (last_message_at IS NULL), last_message_at DESC, id ASC"
        ))?;

        let rows = stmt.query_map(params![user_id.0], row_to_thread)?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }
}

/// Map a `rusqlite::Row` to a [`ChatThread`].
fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatThread> {
    let created_str: String = row.get(3)?;
    let updated_str: Option<String> = row.get(4)?;
    let last_sender: Option<i64> = row.get(6)?;
    let last_at_str: Option<String> = row.get(7)?;

    Ok(ChatThread {
        id: ThreadId(row.get(0)?),
        user_one_id: UserId(row.get(1)?),
        user_two_id: UserId(row.get(2)?),
        created_at: ts_from_sql(3, &created_str)?,
        updated_at: opt_ts_from_sql(4, updated_str)?,
        last_message: row.get(5)?,
        last_sender_id: last_sender.map(UserId),
        last_message_at: opt_ts_from_sql(7, last_at_str)?,
    })
}
