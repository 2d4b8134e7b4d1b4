//! Two-party messaging.
//!
//! A thread is identified by its canonically ordered user pair, so the same
//! two users always land in the same conversation no matter which entry
//! point created it (direct, by username, or via a book's owner).  Viewing a
//! thread is also what marks the other side's messages read; there is no
//! separate mark-read call.

use bookswap_store::{
    BookId, ChatMessage, ChatThread, Database, MessageId, ThreadId, UserId,
};
use chrono::Utc;
use serde::Serialize;

use crate::auth::{canonical_pair, ensure_participant, thread_partner};
use crate::error::{not_found_as, MarketError, Result};
use crate::market::Marketplace;

/// Public profile of the other thread participant.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartnerView {
    pub id: UserId,
    pub username: String,
    pub city: Option<String>,
}

/// A thread as shown in the caller's inbox.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub id: ThreadId,
    pub partner: PartnerView,
    pub last_message: Option<String>,
    pub last_message_at: Option<String>,
    pub unread_count: u32,
}

/// A message as returned to a viewer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: String,
    pub is_read: bool,
}

impl From<ChatMessage> for MessageView {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            thread_id: m.thread_id,
            sender_id: m.sender_id,
            content: m.content,
            created_at: m.created_at.to_rfc3339(),
            is_read: m.is_read,
        }
    }
}

impl Marketplace {
    /// Open (or resume) the conversation with another user.
    pub fn open_thread(&self, actor: UserId, partner_id: UserId) -> Result<ThreadView> {
        if partner_id == actor {
            return Err(MarketError::Validation(
                "you cannot start a chat with yourself",
            ));
        }

        let mut db = self.db()?;
        let partner = db.get_user(partner_id).map_err(not_found_as("user"))?;

        let (one, two) = canonical_pair(actor, partner.id);
        let thread = db.get_or_create_thread(one, two)?;
        self.project_thread(&db, thread, actor)
    }

    /// Open a conversation by the partner's username.
    pub fn open_thread_by_username(&self, actor: UserId, username: &str) -> Result<ThreadView> {
        let username = username.trim();
        if username.is_empty() {
            return Err(MarketError::Validation("username cannot be empty"));
        }

        let mut db = self.db()?;
        let partner = db
            .get_user_by_username(username)
            .map_err(not_found_as("user"))?;
        if partner.id == actor {
            return Err(MarketError::Validation(
                "you cannot start a chat with yourself",
            ));
        }

        let (one, two) = canonical_pair(actor, partner.id);
        let thread = db.get_or_create_thread(one, two)?;
        self.project_thread(&db, thread, actor)
    }

    /// Open a conversation with the owner of a book.
    pub fn open_thread_by_book(&self, actor: UserId, book_id: BookId) -> Result<ThreadView> {
        let mut db = self.db()?;
        let book = db.get_book(book_id).map_err(not_found_as("book"))?;
        if book.owner_id == actor {
            return Err(MarketError::Validation("this is your own book"));
        }

        let (one, two) = canonical_pair(actor, book.owner_id);
        let thread = db.get_or_create_thread(one, two)?;
        self.project_thread(&db, thread, actor)
    }

    /// The caller's inbox: every thread they participate in, most recently
    /// active first, with the partner's profile and a fresh unread count.
    pub fn list_threads(&self, actor: UserId) -> Result<Vec<ThreadView>> {
        let db = self.db()?;
        let threads = db.list_threads_for_user(actor)?;
        threads
            .into_iter()
            .map(|thread| self.project_thread(&db, thread, actor))
            .collect()
    }

    /// Append a message to a thread the actor participates in.  The thread's
    /// preview cache is updated in the same transaction as the insert.
    pub fn send_message(
        &self,
        actor: UserId,
        thread_id: ThreadId,
        content: &str,
    ) -> Result<MessageView> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MarketError::Validation("message cannot be empty"));
        }

        let message = {
            let mut db = self.db()?;
            let thread = db.get_thread(thread_id).map_err(not_found_as("thread"))?;
            ensure_participant(&thread, actor)?;
            db.append_message(thread.id, actor, content)?
        };

        self.notifier().notify_chat_message(thread_id, message.id);

        Ok(MessageView::from(message))
    }

    /// Messages of a thread in creation order, bounded by `limit` (the
    /// configured page size when `None`).
    ///
    /// Viewing is what marks messages read: every returned message authored
    /// by the other participant and still unread flips to read in one
    /// batched commit before the page is returned.  Messages beyond the page
    /// stay unread until a later fetch covers them.
    pub fn thread_messages(
        &self,
        actor: UserId,
        thread_id: ThreadId,
        limit: Option<u32>,
    ) -> Result<Vec<MessageView>> {
        let mut db = self.db()?;
        let thread = db.get_thread(thread_id).map_err(not_found_as("thread"))?;
        ensure_participant(&thread, actor)?;

        let limit = limit.unwrap_or(self.chat_page_size);
        let mut messages = db.list_messages(thread.id, limit)?;

        let unread: Vec<MessageId> = messages
            .iter()
            .filter(|m| m.sender_id != actor && !m.is_read)
            .map(|m| m.id)
            .collect();

        if !unread.is_empty() {
            let read_at = Utc::now();
            db.mark_messages_read(&unread, read_at)?;

            // Reflect the commit in the returned page.
            for message in &mut messages {
                if unread.contains(&message.id) {
                    message.is_read = true;
                    message.read_at = Some(read_at);
                }
            }
        }

        Ok(messages.into_iter().map(MessageView::from).collect())
    }

    fn project_thread(
        &self,
        db: &Database,
        thread: ChatThread,
        viewer: UserId,
    ) -> Result<ThreadView> {
        let partner_id = thread_partner(&thread, viewer);
        let partner = db.get_user(partner_id).map_err(not_found_as("user"))?;
        let unread_count = db.count_unread(thread.id, viewer)?;

        Ok(ThreadView {
            id: thread.id,
            partner: PartnerView {
                id: partner.id,
                username: partner.username,
                city: partner.city,
            },
            last_message: thread.last_message,
            last_message_at: thread.last_message_at.map(|t| t.to_rfc3339()),
            unread_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use bookswap_store::ThreadId;

    use crate::notify::Notification;
    use crate::testutil::{market, seed_book, seed_user};
    use crate::MarketError;

    #[test]
    fn thread_identity_ignores_direction() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");

        let t1 = market.open_thread(u1.id, u2.id).unwrap();
        let t2 = market.open_thread(u2.id, u1.id).unwrap();
        assert_eq!(t1.id, t2.id);

        // Each side sees the other as the partner.
        assert_eq!(t1.partner.id, u2.id);
        assert_eq!(t2.partner.id, u1.id);
    }

    #[test]
    fn all_entry_points_share_one_thread() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let book = seed_book(&market, "Dune", u2.id);

        let direct = market.open_thread(u1.id, u2.id).unwrap();
        let by_name = market.open_thread_by_username(u1.id, "  u2  ").unwrap();
        let by_book = market.open_thread_by_book(u1.id, book.id).unwrap();

        assert_eq!(direct.id, by_name.id);
        assert_eq!(direct.id, by_book.id);
    }

    #[test]
    fn self_targeted_threads_are_rejected() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let book = seed_book(&market, "Mine", u1.id);

        assert!(matches!(
            market.open_thread(u1.id, u1.id).unwrap_err(),
            MarketError::Validation(_)
        ));
        assert!(matches!(
            market.open_thread_by_username(u1.id, "u1").unwrap_err(),
            MarketError::Validation(_)
        ));
        assert!(matches!(
            market.open_thread_by_book(u1.id, book.id).unwrap_err(),
            MarketError::Validation(_)
        ));
        assert!(matches!(
            market.open_thread_by_username(u1.id, "   ").unwrap_err(),
            MarketError::Validation(_)
        ));
        assert!(matches!(
            market.open_thread_by_username(u1.id, "ghost").unwrap_err(),
            MarketError::NotFound("user")
        ));
    }

    #[test]
    fn sending_updates_preview_and_notifies() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let thread = market.open_thread(u1.id, u2.id).unwrap();

        let mut rx = market.notifier().subscribe();
        let message = market.send_message(u1.id, thread.id, "  hi  ").unwrap();
        assert_eq!(message.content, "hi");
        assert!(!message.is_read);

        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::ChatMessage {
                thread_id: thread.id,
                message_id: message.id,
            }
        );

        let inbox = market.list_threads(u2.id).unwrap();
        assert_eq!(inbox[0].last_message.as_deref(), Some("hi"));
        assert_eq!(inbox[0].unread_count, 1);

        // The sender's own inbox shows the preview but nothing unread.
        let own = market.list_threads(u1.id).unwrap();
        assert_eq!(own[0].unread_count, 0);
    }

    #[test]
    fn message_guards() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let stranger = seed_user(&market, "stranger");
        let thread = market.open_thread(u1.id, u2.id).unwrap();

        assert!(matches!(
            market.send_message(u1.id, thread.id, "   ").unwrap_err(),
            MarketError::Validation(_)
        ));
        assert!(matches!(
            market.send_message(u1.id, ThreadId(99), "hi").unwrap_err(),
            MarketError::NotFound("thread")
        ));
        assert!(matches!(
            market.send_message(stranger.id, thread.id, "hi").unwrap_err(),
            MarketError::Forbidden(_)
        ));
        assert!(matches!(
            market
                .thread_messages(stranger.id, thread.id, None)
                .unwrap_err(),
            MarketError::Forbidden(_)
        ));
    }

    #[test]
    fn viewing_marks_the_page_read() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let thread = market.open_thread(u1.id, u2.id).unwrap();

        market.send_message(u1.id, thread.id, "one").unwrap();
        market.send_message(u1.id, thread.id, "two").unwrap();
        market.send_message(u1.id, thread.id, "three").unwrap();

        // U2 fetches a two-message page: only those two flip to read.
        let page = market.thread_messages(u2.id, thread.id, Some(2)).unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|m| m.is_read));

        let inbox = market.list_threads(u2.id).unwrap();
        assert_eq!(inbox[0].unread_count, 1);

        // A wider fetch covers the rest.
        let all = market.thread_messages(u2.id, thread.id, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|m| m.is_read));
        assert_eq!(market.list_threads(u2.id).unwrap()[0].unread_count, 0);

        // The sender's view never counted their own messages as unread.
        let senders_view = market.thread_messages(u1.id, thread.id, None).unwrap();
        assert_eq!(senders_view.len(), 3);
    }

    #[test]
    fn unread_counts_are_per_viewer() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let thread = market.open_thread(u1.id, u2.id).unwrap();

        market.send_message(u1.id, thread.id, "hi").unwrap();
        market.thread_messages(u2.id, thread.id, None).unwrap();
        assert_eq!(market.list_threads(u2.id).unwrap()[0].unread_count, 0);

        market.send_message(u2.id, thread.id, "hello back").unwrap();
        assert_eq!(market.list_threads(u1.id).unwrap()[0].unread_count, 1);
        assert_eq!(market.list_threads(u2.id).unwrap()[0].unread_count, 0);
    }

    #[test]
    fn inbox_orders_by_activity() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let u3 = seed_user(&market, "u3");

        let quiet = market.open_thread(u1.id, u2.id).unwrap();
        let busy = market.open_thread(u1.id, u3.id).unwrap();
        market.send_message(u3.id, busy.id, "ping").unwrap();

        let inbox = market.list_threads(u1.id).unwrap();
        assert_eq!(
            inbox.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![busy.id, quiet.id]
        );
    }

    #[test]
    fn thread_view_serializes_camel_case() {
        let (_dir, market) = market();
        let u1 = seed_user(&market, "u1");
        let u2 = seed_user(&market, "u2");
        let view = market.open_thread(u1.id, u2.id).unwrap();

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("lastMessage").is_some());
        assert!(json.get("unreadCount").is_some());
        assert!(json["partner"].get("username").is_some());
    }
}
