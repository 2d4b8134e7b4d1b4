//! The [`Marketplace`] service handle.
//!
//! One `Marketplace` serves many concurrent callers.  Each operation is an
//! isolated unit of work: it takes the store lock, runs its reads and writes
//! (multi-row changes inside a single SQLite transaction), releases the lock,
//! and only then publishes to the [`Notifier`].  There is no other shared
//! mutable state.

use std::sync::{Arc, Mutex, MutexGuard};

use bookswap_store::{Book, BookId, Database, NewBook, StoreError, User, UserId};

use crate::config::MarketConfig;
use crate::covers::{CoverResolver, PublicUrlResolver};
use crate::error::{not_found_as, MarketError, Result};
use crate::notify::Notifier;

/// Entry point for the exchange and chat subsystems.
pub struct Marketplace {
    db: Mutex<Database>,
    notifier: Notifier,
    pub(crate) covers: Arc<dyn CoverResolver>,
    pub(crate) chat_page_size: u32,
}

impl Marketplace {
    /// Open the marketplace described by `config`.
    pub fn open(config: &MarketConfig) -> Result<Self> {
        let db = match &config.db_path {
            Some(path) => Database::open_at(path),
            None => Database::new(),
        }
        .map_err(MarketError::Store)?;

        let mut covers = PublicUrlResolver::new(config.app_base_url.clone());
        if let Some(direct) = &config.media_public_url {
            covers = covers.with_direct(direct.clone(), config.media_prefer_direct_url);
        }

        let mut market = Self::with_store(db, Arc::new(covers));
        market.chat_page_size = config.chat_page_size;
        Ok(market)
    }

    /// Build a marketplace over an already-open store.  Useful for tests and
    /// for embedders that manage the database path themselves.
    pub fn with_store(db: Database, covers: Arc<dyn CoverResolver>) -> Self {
        Self {
            db: Mutex::new(db),
            notifier: Notifier::new(),
            covers,
            chat_page_size: MarketConfig::default().chat_page_size,
        }
    }

    /// The notification channel.  Live-connection handlers subscribe here.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| MarketError::StorePoisoned)
    }

    // ------------------------------------------------------------------
    // Supporting CRUD
    //
    // Registration and book management proper live outside the core; these
    // thin wrappers exist so embedders (and tests) can reach the records the
    // exchange and chat subsystems operate on.
    // ------------------------------------------------------------------

    /// Create a user profile.
    pub fn register_user(
        &self,
        email: &str,
        username: &str,
        full_name: Option<&str>,
        city: Option<&str>,
        about: Option<&str>,
    ) -> Result<User> {
        self.db()?
            .create_user(email, username, full_name, city, about)
            .map_err(|e| match e {
                StoreError::Conflict => MarketError::Conflict("email or username already taken"),
                other => other.into(),
            })
    }

    /// List a book for exchange.
    pub fn add_book(&self, book: NewBook) -> Result<Book> {
        Ok(self.db()?.create_book(book)?)
    }

    /// Fetch a single book.
    pub fn book(&self, id: BookId) -> Result<Book> {
        self.db()?.get_book(id).map_err(not_found_as("book"))
    }

    /// Books currently open to proposals.
    pub fn available_books(&self) -> Result<Vec<Book>> {
        Ok(self.db()?.list_available_books()?)
    }

    /// A user's own shelf.
    pub fn books_of(&self, owner: UserId) -> Result<Vec<Book>> {
        Ok(self.db()?.list_books_for_owner(owner)?)
    }
}
