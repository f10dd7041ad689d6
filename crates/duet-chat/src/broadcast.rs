//! Topic-based fan-out of live events to in-process subscribers.
//!
//! Delivery is strictly best-effort: publishes never await a receiver,
//! a full or disconnected subscriber silently loses the event, and
//! nothing is queued for subscribers that are not currently attached.
//! Durable state lives in the message log; this layer only shaves
//! latency for clients that happen to be listening.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use duet_shared::constants::SUBSCRIBER_QUEUE_DEPTH;
use duet_shared::events::{StatusUpdate, TypingIndicator};
use duet_shared::types::inbox_topic;
use duet_store::Message;

/// Envelope published to live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BroadcastEvent {
    Message(Message),
    Typing(TypingIndicator),
    Status(StatusUpdate),
}

/// Fan-out hub keyed by topic string (`chat/{id}`, `inbox/{user}`, ...).
#[derive(Clone, Default)]
pub struct Broadcaster {
    topics: Arc<RwLock<HashMap<String, Vec<mpsc::Sender<BroadcastEvent>>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber to a topic. The returned receiver holds a
    /// bounded queue; once it lags behind by more than
    /// [`SUBSCRIBER_QUEUE_DEPTH`] events it starts losing them.
    pub async fn subscribe(&self, topic: &str) -> mpsc::Receiver<BroadcastEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        debug!(topic, "subscriber attached");
        rx
    }

    /// Publish an event to every live subscriber of a topic.
    ///
    /// Uses `try_send` so a stalled subscriber can never back up the
    /// publisher. Subscribers whose receiver is gone are pruned here;
    /// a topic with no subscribers left is removed entirely.
    pub async fn publish(&self, topic: &str, event: BroadcastEvent) {
        let mut topics = self.topics.write().await;
        let Some(senders) = topics.get_mut(topic) else {
            return;
        };

        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(topic, "dropping event for slow subscriber");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if senders.is_empty() {
            topics.remove(topic);
        }
    }

    /// Fan a persisted message out to its two logical channels: the
    /// chat room (both participants) and the receiver's personal inbox
    /// (cross-chat badges).
    pub async fn publish_message(&self, message: &Message) {
        let event = BroadcastEvent::Message(message.clone());
        self.publish(&message.chat_id.chat_topic(), event.clone()).await;
        self.publish(&inbox_topic(&message.receiver_id), event).await;
    }

    /// Typing indicators go to the chat-scoped side-channel only.
    pub async fn publish_typing(&self, indicator: &TypingIndicator) {
        self.publish(
            &indicator.chat_id.typing_topic(),
            BroadcastEvent::Typing(indicator.clone()),
        )
        .await;
    }

    /// Status acks go to the chat-scoped status channel only.
    pub async fn publish_status(&self, update: &StatusUpdate) {
        self.publish(
            &update.chat_id.status_topic(),
            BroadcastEvent::Status(update.clone()),
        )
        .await;
    }

    /// Number of live subscribers on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use duet_shared::{ChatId, MessageKind, MessageStatus};
    use uuid::Uuid;

    use super::*;

    fn sample_message() -> Message {
        Message {
            id: Uuid::new_v4(),
            chat_id: ChatId::resolve("u1", "u2").unwrap(),
            sender_id: "u1".to_string(),
            receiver_id: "u2".to_string(),
            body: "hi".to_string(),
            kind: MessageKind::Text,
            media_ref: None,
            status: MessageStatus::Sent,
            deleted_by_sender: false,
            deleted_by_receiver: false,
            seq: 1,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }

    #[tokio::test]
    async fn message_reaches_chat_room_and_inbox() {
        let hub = Broadcaster::new();
        let mut room_rx = hub.subscribe("chat/u1_u2").await;
        let mut inbox_rx = hub.subscribe("inbox/u2").await;
        let mut other_rx = hub.subscribe("inbox/u1").await;

        let msg = sample_message();
        hub.publish_message(&msg).await;

        assert!(matches!(room_rx.try_recv().unwrap(), BroadcastEvent::Message(m) if m.id == msg.id));
        assert!(matches!(inbox_rx.try_recv().unwrap(), BroadcastEvent::Message(m) if m.id == msg.id));
        // The sender's own inbox stays quiet.
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_is_scoped_to_its_side_channel() {
        let hub = Broadcaster::new();
        let mut room_rx = hub.subscribe("chat/u1_u2").await;
        let mut typing_rx = hub.subscribe("chat/u1_u2/typing").await;

        let indicator = TypingIndicator {
            chat_id: ChatId::resolve("u1", "u2").unwrap(),
            user_id: "u1".to_string(),
            user_name: "Alice".to_string(),
            is_typing: true,
        };
        hub.publish_typing(&indicator).await;

        assert!(room_rx.try_recv().is_err());
        assert!(matches!(
            typing_rx.try_recv().unwrap(),
            BroadcastEvent::Typing(t) if t.is_typing
        ));
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let hub = Broadcaster::new();
        let rx = hub.subscribe("chat/u1_u2").await;
        assert_eq!(hub.subscriber_count("chat/u1_u2").await, 1);

        drop(rx);
        hub.publish_message(&sample_message()).await;
        assert_eq!(hub.subscriber_count("chat/u1_u2").await, 0);
    }

    #[tokio::test]
    async fn full_subscriber_never_blocks_publisher() {
        let hub = Broadcaster::new();
        let mut rx = hub.subscribe("inbox/u2").await;

        // Overflow the bounded queue; every publish must return.
        for _ in 0..(SUBSCRIBER_QUEUE_DEPTH + 10) {
            hub.publish_message(&sample_message()).await;
        }

        // The subscriber is still attached and sees the first events.
        assert_eq!(hub.subscriber_count("inbox/u2").await, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn publish_to_empty_topic_is_a_no_op() {
        let hub = Broadcaster::new();
        hub.publish_message(&sample_message()).await;
        assert_eq!(hub.subscriber_count("chat/u1_u2").await, 0);
    }
}
