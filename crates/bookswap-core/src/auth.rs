//! Caller identity and role predicates.
//!
//! Authorization is role-per-entity: the book owner decides an exchange, the
//! requester may withdraw it, and only a thread's two participants touch its
//! messages.  Each rule lives here as one predicate so every operation
//! applies the same check.

use bookswap_store::{ChatThread, Exchange, ExchangeStatus, UserId};

use crate::error::{MarketError, Result};

/// Source of the authenticated caller, typically backed by the transport
/// layer's session or token handling.
pub trait IdentityProvider {
    /// The authenticated caller, or [`MarketError::Unauthorized`] when no
    /// valid session exists.
    fn current_user(&self) -> Result<UserId>;
}

/// Identity resolved upstream and handed in as a value.  Also the test
/// double of choice.
#[derive(Debug, Clone, Copy)]
pub struct StaticIdentity(pub Option<UserId>);

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Result<UserId> {
        self.0.ok_or(MarketError::Unauthorized)
    }
}

/// Only the book owner may accept or reject.
pub(crate) fn ensure_exchange_owner(exchange: &Exchange, actor: UserId) -> Result<()> {
    if exchange.owner_id != actor {
        return Err(MarketError::Forbidden(
            "only the book owner may decide this exchange",
        ));
    }
    Ok(())
}

/// Only the requester may cancel.
pub(crate) fn ensure_exchange_requester(exchange: &Exchange, actor: UserId) -> Result<()> {
    if exchange.requester_id != actor {
        return Err(MarketError::Forbidden(
            "only the requester may cancel this exchange",
        ));
    }
    Ok(())
}

/// Terminal states are immutable.
pub(crate) fn ensure_pending(exchange: &Exchange) -> Result<()> {
    if exchange.status != ExchangeStatus::Pending {
        return Err(MarketError::Conflict(
            "this exchange has already been processed",
        ));
    }
    Ok(())
}

/// Message operations are participant-only.
pub(crate) fn ensure_participant(thread: &ChatThread, actor: UserId) -> Result<()> {
    if actor != thread.user_one_id && actor != thread.user_two_id {
        return Err(MarketError::Forbidden(
            "you are not a participant of this chat",
        ));
    }
    Ok(())
}

/// The other participant of a thread from `viewer`'s perspective.
pub(crate) fn thread_partner(thread: &ChatThread, viewer: UserId) -> UserId {
    if thread.user_one_id == viewer {
        thread.user_two_id
    } else {
        thread.user_one_id
    }
}

/// Order a user pair numerically ascending.  Thread identity depends on the
/// pair being direction-independent.
pub(crate) fn canonical_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_identity_resolves_or_rejects() {
        let signed_in = StaticIdentity(Some(UserId(7)));
        assert_eq!(signed_in.current_user().unwrap(), UserId(7));

        let anonymous = StaticIdentity(None);
        assert!(matches!(
            anonymous.current_user().unwrap_err(),
            MarketError::Unauthorized
        ));
    }

    #[test]
    fn canonical_pair_ignores_direction() {
        assert_eq!(
            canonical_pair(UserId(9), UserId(3)),
            (UserId(3), UserId(9))
        );
        assert_eq!(
            canonical_pair(UserId(3), UserId(9)),
            (UserId(3), UserId(9))
        );
    }

    #[test]
    fn partner_is_the_other_side() {
        let thread = ChatThread {
            id: bookswap_store::ThreadId(1),
            user_one_id: UserId(1),
            user_two_id: UserId(2),
            created_at: chrono::Utc::now(),
            updated_at: None,
            last_message: None,
            last_sender_id: None,
            last_message_at: None,
        };
        assert_eq!(thread_partner(&thread, UserId(1)), UserId(2));
        assert_eq!(thread_partner(&thread, UserId(2)), UserId(1));
    }
}
