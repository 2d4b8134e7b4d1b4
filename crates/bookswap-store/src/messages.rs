//! Persistence for [`ChatMessage`] records.
//!
//! `append_message` maintains the thread's denormalized last-message cache in
//! the same transaction as the insert -- the cache has no rebuild path, so it
//! must never drift from the message log.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{opt_ts_from_sql, ts_from_sql, ChatMessage, MessageId, ThreadId, UserId};

impl Database {
    /// Append a message to a thread and refresh the thread's preview cache.
    ///
    /// Fails with [`StoreError::NotFound`] (and rolls the insert back) when
    /// the thread does not exist.  The new message starts unread.
    pub fn append_message(
        &mut self,
        thread_id: ThreadId,
        sender_id: UserId,
        content: &str,
    ) -> Result<ChatMessage> {
        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        // The cache update doubles as the thread existence check; it has to
        // run before the insert or a missing thread would surface as a
        // foreign key violation instead.
        let updated = tx.execute(
            "UPDATE chat_threads
             SET last_message = ?1, last_sender_id = ?2, last_message_at = ?3, updated_at = ?3
             WHERE id = ?4",
            params![content, sender_id.0, now.to_rfc3339(), thread_id.0],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }

        tx.execute(
            "INSERT INTO chat_messages (thread_id, sender_id, content, created_at, is_read)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![thread_id.0, sender_id.0, content, now.to_rfc3339()],
        )?;
        let id = MessageId(tx.last_insert_rowid());

        tx.commit()?;

        Ok(ChatMessage {
            id,
            thread_id,
            sender_id,
            content: content.to_string(),
            created_at: now,
            is_read: false,
            read_at: None,
        })
    }

    /// Messages of a thread in creation order (rowid breaks timestamp ties),
    /// bounded by `limit`.
    pub fn list_messages(&self, thread_id: ThreadId, limit: u32) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, thread_id, sender_id, content, created_at, is_read, read_at
             FROM chat_messages
             WHERE thread_id = ?1
             ORDER BY created_at ASC, id ASC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![thread_id.0, limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Flip the given messages to read in one batched transaction.
    ///
    /// Already-read messages are left untouched so `read_at` never moves
    /// backwards.  Returns the number of rows that actually changed.
    pub fn mark_messages_read(
        &mut self,
        ids: &[MessageId],
        read_at: DateTime<Utc>,
    ) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;

        let mut changed = 0;
        for id in ids {
            changed += tx.execute(
                "UPDATE chat_messages SET is_read = 1, read_at = ?1 WHERE id = ?2 AND is_read = 0",
                params![read_at.to_rfc3339(), id.0],
            )?;
        }

        tx.commit()?;
        Ok(changed)
    }

    /// Count messages in a thread sent by the other participant and not yet
    /// read by `viewer`.
    pub fn count_unread(&self, thread_id: ThreadId, viewer: UserId) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_messages
             WHERE thread_id = ?1 AND sender_id != ?2 AND is_read = 0",
            params![thread_id.0, viewer.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Map a `rusqlite::Row` to a [`ChatMessage`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let created_str: String = row.get(4)?;
    let is_read: i64 = row.get(5)?;
    let read_str: Option<String> = row.get(6)?;

    Ok(ChatMessage {
        id: MessageId(row.get(0)?),
        thread_id: ThreadId(row.get(1)?),
        sender_id: UserId(row.get(2)?),
        content: row.get(3)?,
        created_at: ts_from_sql(4, &created_str)?,
        is_read: is_read != 0,
        read_at: opt_ts_from_sql(6, read_str)?,
    })
}
