//! Exchange negotiation.
//!
//! State machine per exchange:
//!
//! ```text
//!         propose
//! (none) ---------> pending --accept--> accepted   [terminal]
//!                      |
//!                      +--reject--> rejected        [terminal]
//!                      +--cancel--> (record deleted)
//! ```
//!
//! Accepting also flips the book to `exchanged`; both writes share one store
//! transaction.  All notifier calls happen after the store lock is released,
//! i.e. strictly after commit.

use bookswap_store::{
    BookId, Database, Exchange, ExchangeId, ExchangeStatus, UserId,
};
use serde::Serialize;

use crate::auth::{ensure_exchange_owner, ensure_exchange_requester, ensure_pending};
use crate::error::{not_found_as, MarketError, Result};
use crate::market::Marketplace;

/// Outbound projection of an exchange, decorated with the book's resolved
/// cover URL.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeView {
    pub id: ExchangeId,
    pub book_id: BookId,
    pub requester_id: UserId,
    pub owner_id: UserId,
    pub status: ExchangeStatus,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub cover_url: Option<String>,
}

impl ExchangeView {
    fn new(exchange: Exchange, cover_url: Option<String>) -> Self {
        Self {
            id: exchange.id,
            book_id: exchange.book_id,
            requester_id: exchange.requester_id,
            owner_id: exchange.owner_id,
            status: exchange.status,
            created_at: exchange.created_at.to_rfc3339(),
            updated_at: exchange.updated_at.map(|t| t.to_rfc3339()),
            cover_url,
        }
    }
}

impl Marketplace {
    /// Propose an exchange on someone else's book.
    ///
    /// Fails with `NotFound` if the book is gone, `Forbidden` for the
    /// owner's own book, and `Conflict` when the book already carries a
    /// pending or accepted exchange -- including when a concurrent proposal
    /// wins between the check and the insert.
    pub fn propose_exchange(&self, actor: UserId, book_id: BookId) -> Result<ExchangeView> {
        let (exchange, cover_url) = {
            let db = self.db()?;

            let book = db.get_book(book_id).map_err(not_found_as("book"))?;
            if book.owner_id == actor {
                return Err(MarketError::Forbidden("you cannot request your own book"));
            }
            if db.find_active_exchange_for_book(book_id)?.is_some() {
                return Err(MarketError::Conflict(
                    "this book already has an active exchange",
                ));
            }

            // The partial unique index turns a lost race into Conflict here.
            let exchange = db.insert_exchange(book_id, actor, book.owner_id)?;
            (exchange, self.covers.resolve(book.cover_key.as_deref()))
        };

        tracing::info!(
            exchange = %exchange.id,
            book = %book_id,
            requester = %actor,
            "exchange proposed"
        );
        self.notifier().notify_new_exchange(exchange.id);

        Ok(ExchangeView::new(exchange, cover_url))
    }

    /// Accept a pending exchange; only the book owner may do this.  The
    /// exchange and its book change together or not at all.
    pub fn accept_exchange(&self, actor: UserId, exchange_id: ExchangeId) -> Result<ExchangeView> {
        let (exchange, cover_url) = {
            let mut db = self.db()?;

            let exchange = db
                .get_exchange(exchange_id)
                .map_err(not_found_as("exchange"))?;
            ensure_exchange_owner(&exchange, actor)?;
            ensure_pending(&exchange)?;

            let accepted = db
                .accept_exchange(exchange.id, exchange.book_id)
                .map_err(not_found_as("book"))?;
            let cover_key = db.get_book_cover_key(accepted.book_id)?;
            (accepted, self.covers.resolve(cover_key.as_deref()))
        };

        self.notifier()
            .notify_exchange_status(exchange.id, exchange.status);

        Ok(ExchangeView::new(exchange, cover_url))
    }

    /// Reject a pending exchange; only the book owner may do this.  The book
    /// stays available for other proposals.
    pub fn reject_exchange(&self, actor: UserId, exchange_id: ExchangeId) -> Result<ExchangeView> {
        let (exchange, cover_url) = {
            let db = self.db()?;

            let exchange = db
                .get_exchange(exchange_id)
                .map_err(not_found_as("exchange"))?;
            ensure_exchange_owner(&exchange, actor)?;
            ensure_pending(&exchange)?;

            let rejected = db.reject_exchange(exchange.id)?;
            let cover_key = db.get_book_cover_key(rejected.book_id)?;
            (rejected, self.covers.resolve(cover_key.as_deref()))
        };

        self.notifier()
            .notify_exchange_status(exchange.id, exchange.status);

        Ok(ExchangeView::new(exchange, cover_url))
    }

    /// Withdraw a pending exchange; only the requester may do this.  The
    /// record is deleted outright rather than archived, and no notification
    /// is sent -- withdrawals are silent.
    pub fn cancel_exchange(&self, actor: UserId, exchange_id: ExchangeId) -> Result<()> {
        let db = self.db()?;

        let exchange = db
            .get_exchange(exchange_id)
            .map_err(not_found_as("exchange"))?;
        ensure_exchange_requester(&exchange, actor)?;
        ensure_pending(&exchange)?;

        if !db.delete_exchange(exchange.id)? {
            // The owner's decision landed between our read and the delete.
            return Err(MarketError::Conflict(
                "this exchange has already been processed",
            ));
        }

        tracing::info!(exchange = %exchange_id, requester = %actor, "exchange cancelled");
        Ok(())
    }

    /// All exchanges the user has proposed, any status.
    pub fn list_requests(&self, actor: UserId) -> Result<Vec<ExchangeView>> {
        let db = self.db()?;
        let exchanges = db.list_exchanges_by_requester(actor)?;
        self.decorate_exchanges(&db, exchanges)
    }

    /// All exchanges proposed on the user's books, any status.
    pub fn list_offers(&self, actor: UserId) -> Result<Vec<ExchangeView>> {
        let db = self.db()?;
        let exchanges = db.list_exchanges_by_owner(actor)?;
        self.decorate_exchanges(&db, exchanges)
    }

    fn decorate_exchanges(
        &self,
        db: &Database,
        exchanges: Vec<Exchange>,
    ) -> Result<Vec<ExchangeView>> {
        exchanges
            .into_iter()
            .map(|exchange| {
                // A deleted book just loses its cover; the exchange row is
                // still history worth showing.
                let cover_key = db.get_book_cover_key(exchange.book_id)?;
                Ok(ExchangeView::new(
                    exchange,
                    self.covers.resolve(cover_key.as_deref()),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use bookswap_store::{BookId, BookStatus, ExchangeId, ExchangeStatus};

    use crate::notify::Notification;
    use crate::testutil::{market, seed_book, seed_user};
    use crate::MarketError;

    #[test]
    fn proposal_lifecycle_happy_path() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let u3 = seed_user(&market, "u3");
        let b1 = seed_book(&market, "Dune", u1.id);

        // U2 proposes.
        let proposed = market.propose_exchange(u2.id, b1.id).unwrap();
        assert_eq!(proposed.status, ExchangeStatus::Pending);
        assert_eq!(proposed.owner_id, u1.id);

        // U3's proposal on the same book conflicts.
        let err = market.propose_exchange(u3.id, b1.id).unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));

        // U1 accepts: exchange and book flip together.
        let accepted = market.accept_exchange(u1.id, proposed.id).unwrap();
        assert_eq!(accepted.status, ExchangeStatus::Accepted);
        assert_eq!(market.book(b1.id).unwrap().status, BookStatus::Exchanged);

        // A second decision on the same exchange conflicts.
        let err = market.reject_exchange(u1.id, proposed.id).unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
    }

    #[test]
    fn propose_rejects_own_book_and_missing_book() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let b1 = seed_book(&market, "Dune", u1.id);

        assert!(matches!(
            market.propose_exchange(u1.id, b1.id).unwrap_err(),
            MarketError::Forbidden(_)
        ));
        assert!(matches!(
            market.propose_exchange(u1.id, BookId(404)).unwrap_err(),
            MarketError::NotFound("book")
        ));
    }

    #[test]
    fn decisions_are_owner_only_and_cancel_is_requester_only() {
        let (_dir, market) = market();
        let owner = seed_user(&market, "owner");
        let requester = seed_user(&market, "req");
        let stranger = seed_user(&market, "stranger");
        let book = seed_book(&market, "Dune", owner.id);

        let exchange = market.propose_exchange(requester.id, book.id).unwrap();

        assert!(matches!(
            market.accept_exchange(requester.id, exchange.id).unwrap_err(),
            MarketError::Forbidden(_)
        ));
        assert!(matches!(
            market.reject_exchange(stranger.id, exchange.id).unwrap_err(),
            MarketError::Forbidden(_)
        ));
        assert!(matches!(
            market.cancel_exchange(owner.id, exchange.id).unwrap_err(),
            MarketError::Forbidden(_)
        ));
    }

    #[test]
    fn cancel_deletes_and_frees_the_book() {
        let (_dir, market) = market();
        let owner = seed_user(&market, "owner");
        let requester = seed_user(&market, "req");
        let other = seed_user(&market, "other");
        let book = seed_book(&market, "Dune", owner.id);

        let exchange = market.propose_exchange(requester.id, book.id).unwrap();
        market.cancel_exchange(requester.id, exchange.id).unwrap();

        // The record is gone, not archived.
        assert!(matches!(
            market.accept_exchange(owner.id, exchange.id).unwrap_err(),
            MarketError::NotFound("exchange")
        ));
        assert!(market.list_requests(requester.id).unwrap().is_empty());

        // And the book accepts new proposals again.
        market.propose_exchange(other.id, book.id).unwrap();
    }

    #[test]
    fn rejection_keeps_history_and_frees_the_book() {
        let (_dir, market) = market();
        let owner = seed_user(&market, "owner");
        let requester = seed_user(&market, "req");
        let other = seed_user(&market, "other");
        let book = seed_book(&market, "Dune", owner.id);

        let exchange = market.propose_exchange(requester.id, book.id).unwrap();
        let rejected = market.reject_exchange(owner.id, exchange.id).unwrap();
        assert_eq!(rejected.status, ExchangeStatus::Rejected);

        assert_eq!(market.book(book.id).unwrap().status, BookStatus::Available);
        assert_eq!(market.list_requests(requester.id).unwrap().len(), 1);

        market.propose_exchange(other.id, book.id).unwrap();
    }

    #[test]
    fn notifications_fire_after_commit_except_for_cancel() {
        let (_dir, market) = market();
        let owner = seed_user(&market, "owner");
        let requester = seed_user(&market, "req");
        let book = seed_book(&market, "Dune", owner.id);

        let mut rx = market.notifier().subscribe();

        let exchange = market.propose_exchange(requester.id, book.id).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::NewExchange {
                exchange_id: exchange.id
            }
        );

        market.reject_exchange(owner.id, exchange.id).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::ExchangeStatusUpdate {
                exchange_id: exchange.id,
                status: ExchangeStatus::Rejected,
            }
        );

        let second = market.propose_exchange(requester.id, book.id).unwrap();
        let _ = rx.try_recv().unwrap();
        market.cancel_exchange(requester.id, second.id).unwrap();

        // Withdrawal is the one mutation with no push.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn listings_carry_cover_urls() {
        let (_dir, market) = market();
        let owner = seed_user(&market, "owner");
        let requester = seed_user(&market, "req");

        let mut listing = crate::testutil::new_book("Covered", owner.id);
        listing.cover_key = Some("covers/abc.jpg".to_string());
        let book = market.add_book(listing).unwrap();

        let proposed = market.propose_exchange(requester.id, book.id).unwrap();
        assert_eq!(
            proposed.cover_url.as_deref(),
            Some("http://localhost:8000/media/covers/abc.jpg")
        );

        let offers = market.list_offers(owner.id).unwrap();
        assert_eq!(offers[0].cover_url, proposed.cover_url);
    }

    #[test]
    fn missing_exchange_is_not_found() {
        let (_dir, market) = market();
        let user = seed_user(&market, "u");
        assert!(matches!(
            market.accept_exchange(user.id, ExchangeId(5)).unwrap_err(),
            MarketError::NotFound("exchange")
        ));
    }
}
