use bookswap_store::StoreError;
use thiserror::Error;

/// Errors produced by marketplace operations.
///
/// The first five variants are the domain outcomes a transport layer maps to
/// user-visible responses; everything else is a storage fault.  All of them
/// are terminal for the triggering operation -- the core never retries a
/// failed business decision.
#[derive(Debug, Error)]
pub enum MarketError {
    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The actor lacks the role required for this action.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// An invariant rejected the action: duplicate active exchange, or a
    /// transition attempted out of the pending state.
    #[error("Conflict: {0}")]
    Conflict(&'static str),

    /// Malformed input, e.g. an empty message or a self-targeted thread.
    #[error("Invalid request: {0}")]
    Validation(&'static str),

    /// No authenticated user.
    #[error("No authenticated user")]
    Unauthorized,

    /// A panic poisoned the store lock; the process should be restarted.
    #[error("Store lock poisoned")]
    StorePoisoned,

    /// Storage-layer fault unrelated to any domain rule.
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for MarketError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => MarketError::NotFound("record"),
            // A unique index rejected the write: the caller lost a race.
            // A lost race stays a Conflict, it is never retried as a
            // different business decision.
            StoreError::Conflict => MarketError::Conflict("a concurrent update won"),
            other => MarketError::Store(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Name the entity behind a storage `NotFound` so callers see "book not
/// found" instead of "record not found".
pub(crate) fn not_found_as(entity: &'static str) -> impl Fn(StoreError) -> MarketError {
    move |e| match e {
        StoreError::NotFound => MarketError::NotFound(entity),
        other => other.into(),
    }
}
