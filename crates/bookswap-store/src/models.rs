//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a transport layer.  Primary keys are SQLite rowids wrapped in
//! newtype ids; the numeric ordering of [`UserId`] is what canonicalizes a
//! chat thread's user pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
        )]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Primary key of a `users` row.
    UserId
);
entity_id!(
    /// Primary key of a `books` row.
    BookId
);
entity_id!(
    /// Primary key of an `exchanges` row.
    ExchangeId
);
entity_id!(
    /// Primary key of a `chat_threads` row.
    ThreadId
);
entity_id!(
    /// Primary key of a `chat_messages` row.
    MessageId
);

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.  Credentials live with the external identity provider;
/// the store only keeps the public profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub city: Option<String>,
    pub about: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// Availability of a book on the marketplace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    /// Set when an exchange on this book is accepted.  Never reverts
    /// automatically.
    Exchanged,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::Exchanged => "exchanged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(BookStatus::Available),
            "exchanged" => Some(BookStatus::Exchanged),
            _ => None,
        }
    }
}

/// A book listed for exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub condition: Option<String>,
    /// Object-storage key of the cover image, resolved to a URL on read.
    pub cover_key: Option<String>,
    pub owner_id: UserId,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields required to list a new book.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub condition: Option<String>,
    pub cover_key: Option<String>,
    pub owner_id: UserId,
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// Lifecycle of an exchange proposal.  `Accepted`, `Rejected` and `Cancelled`
/// are terminal; a cancelled exchange is deleted rather than archived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "pending",
            ExchangeStatus::Accepted => "accepted",
            ExchangeStatus::Rejected => "rejected",
            ExchangeStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExchangeStatus::Pending),
            "accepted" => Some(ExchangeStatus::Accepted),
            "rejected" => Some(ExchangeStatus::Rejected),
            "cancelled" => Some(ExchangeStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposal by `requester_id` to receive the book from its owner.
///
/// `owner_id` is denormalized from the book at creation time so that the
/// authorization checks survive later changes to the book row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exchange {
    pub id: ExchangeId,
    pub book_id: BookId,
    pub requester_id: UserId,
    pub owner_id: UserId,
    pub status: ExchangeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A two-party conversation.  The participant pair is stored in canonical
/// order (`user_one_id < user_two_id`) so the same two users always resolve
/// to the same thread regardless of who initiates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatThread {
    pub id: ThreadId,
    pub user_one_id: UserId,
    pub user_two_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Denormalized preview of the most recent message.  Maintained in the
    /// same transaction as the message insert; there is no rebuild path.
    pub last_message: Option<String>,
    pub last_sender_id: Option<UserId>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// A single chat message.  `is_read` flips to true only when the recipient
/// views the thread, and never reverts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Row-mapping helpers
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 column into a UTC timestamp.
pub(crate) fn ts_from_sql(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Parse a nullable RFC 3339 column.
pub(crate) fn opt_ts_from_sql(
    idx: usize,
    s: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|v| ts_from_sql(idx, &v)).transpose()
}

/// Reject unknown status text with a conversion error instead of panicking.
pub(crate) fn bad_status(idx: usize, s: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown status: {s}").into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_status_round_trip() {
        for status in [
            ExchangeStatus::Pending,
            ExchangeStatus::Accepted,
            ExchangeStatus::Rejected,
            ExchangeStatus::Cancelled,
        ] {
            assert_eq!(ExchangeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ExchangeStatus::parse("done"), None);
    }

    #[test]
    fn book_status_round_trip() {
        assert_eq!(BookStatus::parse("available"), Some(BookStatus::Available));
        assert_eq!(BookStatus::parse("exchanged"), Some(BookStatus::Exchanged));
        assert_eq!(BookStatus::parse(""), None);
    }

    #[test]
    fn user_ids_order_numerically() {
        assert!(UserId(2) < UserId(10));
    }
}
