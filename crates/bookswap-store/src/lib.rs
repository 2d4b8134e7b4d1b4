//! # bookswap-store
//!
//! SQLite persistence for the bookswap marketplace.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model.  Multi-entity invariants (one active exchange per book, one chat
//! thread per user pair, the accept-exchange dual update, the thread preview
//! cache) are enforced here with transactions and unique indexes rather than
//! in application code.

pub mod books;
pub mod database;
pub mod exchanges;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod threads;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;

#[cfg(test)]
pub(crate) mod testutil {
    use tempfile::TempDir;

    use crate::models::{NewBook, User, UserId};
    use crate::Database;

    /// Fresh migrated database in a throwaway directory.
    pub fn open_temp() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    pub fn seed_user(db: &Database, username: &str) -> User {
        db.create_user(&format!("{username}@example.com"), username, None, None, None)
            .unwrap()
    }

    pub fn new_book(title: &str, owner_id: UserId) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Anonymous".to_string(),
            description: None,
            genre: None,
            condition: None,
            cover_key: None,
            owner_id,
        }
    }
}
