//! Persistence for the exchange state machine.
//!
//! The interesting parts are the guarded transitions: every status change is
//! a conditional `UPDATE ... WHERE status = 'pending'` so a stale actor loses
//! at the storage layer, and `accept_exchange` flips the exchange and its
//! book inside one transaction.  The partial unique index
//! `idx_exchanges_active_book` makes `insert_exchange` the loser-detection
//! point for concurrent proposals.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{map_constraint, map_not_found, Result, StoreError};
use crate::models::{
    bad_status, opt_ts_from_sql, ts_from_sql, BookId, Exchange, ExchangeId, ExchangeStatus, UserId,
};

const EXCHANGE_COLUMNS: &str =
    "id, book_id, requester_id, owner_id, status, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new pending exchange.
    ///
    /// Returns [`StoreError::Conflict`] when the book already has a pending
    /// or accepted exchange -- including when a concurrent proposal won the
    /// race between the caller's check and this insert.
    pub fn insert_exchange(
        &self,
        book_id: BookId,
        requester_id: UserId,
        owner_id: UserId,
    ) -> Result<Exchange> {
        let now = Utc::now();

        self.conn()
            .execute(
                "INSERT INTO exchanges (book_id, requester_id, owner_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    book_id.0,
                    requester_id.0,
                    owner_id.0,
                    ExchangeStatus::Pending.as_str(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(map_constraint)?;

        Ok(Exchange {
            id: ExchangeId(self.conn().last_insert_rowid()),
            book_id,
            requester_id,
            owner_id,
            status: ExchangeStatus::Pending,
            created_at: now,
            updated_at: None,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single exchange by id.
    pub fn get_exchange(&self, id: ExchangeId) -> Result<Exchange> {
        self.conn()
            .query_row(
                &format!("SELECT {EXCHANGE_COLUMNS} FROM exchanges WHERE id = ?1"),
                params![id.0],
                row_to_exchange,
            )
            .map_err(map_not_found)
    }

    /// The pending or accepted exchange on a book, if any.  At most one can
    /// exist thanks to `idx_exchanges_active_book`.
    pub fn find_active_exchange_for_book(&self, book_id: BookId) -> Result<Option<Exchange>> {
        let exchange = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {EXCHANGE_COLUMNS} FROM exchanges
                     WHERE book_id = ?1 AND status IN (?2, ?3)"
                ),
                params![
                    book_id.0,
                    ExchangeStatus::Pending.as_str(),
                    ExchangeStatus::Accepted.as_str(),
                ],
                row_to_exchange,
            )
            .optional()?;
        Ok(exchange)
    }

    /// All exchanges a user has proposed, regardless of status.
    pub fn list_exchanges_by_requester(&self, requester_id: UserId) -> Result<Vec<Exchange>> {
        self.list_exchanges("requester_id", requester_id)
    }

    /// All exchanges on a user's books, regardless of status.
    pub fn list_exchanges_by_owner(&self, owner_id: UserId) -> Result<Vec<Exchange>> {
        self.list_exchanges("owner_id", owner_id)
    }

    fn list_exchanges(&self, column: &str, user_id: UserId) -> Result<Vec<Exchange>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {EXCHANGE_COLUMNS} FROM exchanges
             WHERE {column} = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;

        let rows = stmt.query_map(params![user_id.0], row_to_exchange)?;

        let mut exchanges = Vec::new();
        for row in rows {
            exchanges.push(row?);
        }
        Ok(exchanges)
    }

    // ------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------

    /// Accept a pending exchange and mark its book exchanged, atomically.
    ///
    /// The exchange update is guarded by `status = 'pending'`; zero affected
    /// rows means the exchange was already processed and yields
    /// [`StoreError::Conflict`].  If the book row has vanished the whole
    /// transaction rolls back and [`StoreError::NotFound`] is returned -- an
    /// accepted exchange must never coexist with an available book.
    pub fn accept_exchange(&mut self, id: ExchangeId, book_id: BookId) -> Result<Exchange> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn_mut().transaction()?;

        let exchange_rows = tx.execute(
            "UPDATE exchanges SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                ExchangeStatus::Accepted.as_str(),
                now,
                id.0,
                ExchangeStatus::Pending.as_str(),
            ],
        )?;
        if exchange_rows == 0 {
            return Err(StoreError::Conflict);
        }

        let book_rows = tx.execute(
            "UPDATE books SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![crate::BookStatus::Exchanged.as_str(), now, book_id.0],
        )?;
        if book_rows == 0 {
            // Dropping the transaction rolls the exchange update back.
            return Err(StoreError::NotFound);
        }

        tx.commit()?;

        tracing::info!(exchange = %id, book = %book_id, "exchange accepted");
        self.get_exchange(id)
    }

    /// Reject a pending exchange.  The book stays available for other
    /// proposals.  Yields [`StoreError::Conflict`] if the exchange is no
    /// longer pending.
    pub fn reject_exchange(&self, id: ExchangeId) -> Result<Exchange> {
        let now = Utc::now().to_rfc3339();

        let rows = self.conn().execute(
            "UPDATE exchanges SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                ExchangeStatus::Rejected.as_str(),
                now,
                id.0,
                ExchangeStatus::Pending.as_str(),
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::Conflict);
        }

        tracing::info!(exchange = %id, "exchange rejected");
        self.get_exchange(id)
    }

    /// Delete a pending exchange (requester withdrawal).  Returns `true` if a
    /// row was deleted; `false` means the exchange was missing or already
    /// processed.
    pub fn delete_exchange(&self, id: ExchangeId) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM exchanges WHERE id = ?1 AND status = ?2",
            params![id.0, ExchangeStatus::Pending.as_str()],
        )?;
        Ok(rows > 0)
    }
}

/// Map a `rusqlite::Row` to an [`Exchange`].
fn row_to_exchange(row: &rusqlite::Row<'_>) -> rusqlite::Result<Exchange> {
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: Option<String> = row.get(6)?;

    Ok(Exchange {
        id: ExchangeId(row.get(0)?),
        book_id: BookId(row.get(1)?),
        requester_id: UserId(row.get(2)?),
        owner_id: UserId(row.get(3)?),
        status: ExchangeStatus::parse(&status_str).ok_or_else(|| bad_status(4, &status_str))?,
        created_at: ts_from_sql(5, &created_str)?,
        updated_at: opt_ts_from_sql(6, updated_str)?,
    })
}
