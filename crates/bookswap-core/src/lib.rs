//! Marketplace core for a peer-to-peer book exchange.
//!
//! This crate hosts the business rules that sit between a transport layer
//! and the [`bookswap_store`] persistence crate:
//!
//! - the exchange lifecycle (propose, accept, reject, cancel) with its
//!   "one active exchange per book" guarantee,
//! - two-party chat threads with read tracking,
//! - fire-and-forget notifications over a broadcast channel.
//!
//! The [`Marketplace`] struct is the single entry point; construct one with
//! [`Marketplace::open`] and share it behind an `Arc`.

pub mod auth;
pub mod chat;
pub mod config;
pub mod covers;
mod error;
pub mod exchange;
pub mod market;
pub mod notify;

pub use chat::{MessageView, PartnerView, ThreadView};
pub use config::MarketConfig;
pub use error::{MarketError, Result};
pub use exchange::ExchangeView;
pub use market::Marketplace;
pub use notify::{Notification, Notifier};

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use bookswap_store::{Book, Database, NewBook, User, UserId};
    use tempfile::TempDir;

    use crate::covers::PublicUrlResolver;
    use crate::market::Marketplace;

    /// A marketplace over a throwaway database.  Keep the [`TempDir`] alive
    /// for as long as the marketplace is used.
    pub fn market() -> (TempDir, Marketplace) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let covers = Arc::new(PublicUrlResolver::new("http://localhost:8000"));
        (dir, Marketplace::with_store(db, covers))
    }

    pub fn seed_user(market: &Marketplace, username: &str) -> User {
        market
            .register_user(
                &format!("{username}@example.com"),
                username,
                None,
                None,
                None,
            )
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

    pub fn seed_book(market: &Marketplace, title: &str, owner_id: UserId) -> Book {
        market.add_book(new_book(title, owner_id)).unwrap()
    }
}
