//! CRUD operations for [`Book`] records.
//!
//! Book status changes are not exposed here: the only legal transition
//! (`available` -> `exchanged`) happens inside
//! [`Database::accept_exchange`](crate::Database::accept_exchange) so it can
//! never be observed without the matching exchange update.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{map_not_found, Result};
use crate::models::{bad_status, opt_ts_from_sql, ts_from_sql, Book, BookId, BookStatus, NewBook, UserId};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new book, initially `available`.
    pub fn create_book(&self, book: NewBook) -> Result<Book> {
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO books (title, author, description, genre, condition, cover_key, owner_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                book.title,
                book.author,
                book.description,
                book.genre,
                book.condition,
                book.cover_key,
                book.owner_id.0,
                BookStatus::Available.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(Book {
            id: BookId(self.conn().last_insert_rowid()),
            title: book.title,
            author: book.author,
            description: book.description,
            genre: book.genre,
            condition: book.condition,
            cover_key: book.cover_key,
            owner_id: book.owner_id,
            status: BookStatus::Available,
            created_at: now,
            updated_at: None,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single book by id.
    pub fn get_book(&self, id: BookId) -> Result<Book> {
        self.conn()
            .query_row(
                "SELECT id, title, author, description, genre, condition, cover_key,
                        owner_id, status, created_at, updated_at
                 FROM books
                 WHERE id = ?1",
                params![id.0],
                row_to_book,
            )
            .map_err(map_not_found)
    }

    /// Cover storage key for a book, `None` when the book has no cover or no
    /// longer exists.  Used to decorate exchange listings without failing
    /// them on a deleted book.
    pub fn get_book_cover_key(&self, id: BookId) -> Result<Option<String>> {
        let key: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT cover_key FROM books WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key.flatten())
    }

    /// List a user's own books, newest first.
    pub fn list_books_for_owner(&self, owner_id: UserId) -> Result<Vec<Book>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, title, author, description, genre, condition, cover_key,
                    owner_id, status, created_at, updated_at
             FROM books
             WHERE owner_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![owner_id.0], row_to_book)?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    /// List books still open to proposals, newest first.
    pub fn list_available_books(&self) -> Result<Vec<Book>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, title, author, description, genre, condition, cover_key,
                    owner_id, status, created_at, updated_at
             FROM books
             WHERE status = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![BookStatus::Available.as_str()], row_to_book)?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }
}

/// Map a `rusqlite::Row` to a [`Book`].
fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    let status_str: String = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: Option<String> = row.get(10)?;

    Ok(Book {
        id: BookId(row.get(0)?),
        title: row.get(1)?,
        author: row.get(2)?,
        description: row.get(3)?,
        genre: row.get(4)?,
        condition: row.get(5)?,
        cover_key: row.get(6)?,
        owner_id: UserId(row.get(7)?),
        status: BookStatus::parse(&status_str).ok_or_else(|| bad_status(8, &status_str))?,
        created_at: ts_from_sql(9, &created_str)?,
        updated_at: opt_ts_from_sql(10, updated_str)?,
    })
}
