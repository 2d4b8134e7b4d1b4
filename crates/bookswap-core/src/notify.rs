//! Fire-and-forget push notifications.
//!
//! State-changing operations publish a [`Notification`] *after* their store
//! transaction commits.  Live-connection handlers subscribe through
//! [`Notifier::subscribe`]; nothing in the core waits for delivery, and a
//! failed publish can never fail or roll back the operation that triggered
//! it.

use bookswap_store::{ExchangeId, ExchangeStatus, MessageId, ThreadId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events pushed to interested live connections.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    /// A new exchange was proposed on one of the recipient's books.
    NewExchange { exchange_id: ExchangeId },
    /// An exchange moved to a terminal state.
    ExchangeStatusUpdate {
        exchange_id: ExchangeId,
        status: ExchangeStatus,
    },
    /// A message was appended to a thread.
    ChatMessage {
        thread_id: ThreadId,
        message_id: MessageId,
    },
}

/// Broadcast fan-out to live connections.
///
/// Cloning is cheap; all clones publish into the same channel.  Slow
/// subscribers may lag and drop old events -- delivery is best-effort by
/// contract.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    const CAPACITY: usize = 256;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Open a receiver for subsequently published events.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn notify_new_exchange(&self, exchange_id: ExchangeId) {
        self.publish(Notification::NewExchange { exchange_id });
    }

    pub fn notify_exchange_status(&self, exchange_id: ExchangeId, status: ExchangeStatus) {
        self.publish(Notification::ExchangeStatusUpdate {
            exchange_id,
            status,
        });
    }

    pub fn notify_chat_message(&self, thread_id: ThreadId, message_id: MessageId) {
        self.publish(Notification::ChatMessage {
            thread_id,
            message_id,
        });
    }

    fn publish(&self, event: Notification) {
        // send only fails when nobody is subscribed, which is fine.
        if let Err(e) = self.tx.send(event) {
            tracing::debug!(error = %e, "notification dropped: no live subscribers");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_see_published_events() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.notify_new_exchange(ExchangeId(3));
        notifier.notify_exchange_status(ExchangeId(3), ExchangeStatus::Accepted);

        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::NewExchange {
                exchange_id: ExchangeId(3)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::ExchangeStatusUpdate {
                exchange_id: ExchangeId(3),
                status: ExchangeStatus::Accepted,
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let notifier = Notifier::new();
        notifier.notify_chat_message(ThreadId(1), MessageId(2));
    }

    #[test]
    fn wire_shape_is_tagged_camel_case() {
        let event = Notification::ChatMessage {
            thread_id: ThreadId(10),
            message_id: MessageId(42),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "type": "chatMessage",
                "threadId": 10,
                "messageId": 42,
            })
        );
    }
}
