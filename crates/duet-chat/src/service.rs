//! Send/history/status orchestration over the three stores.
//!
//! Failure policy: everything below the log append is fatal to the
//! request and safe for the caller to retry (nothing was persisted).
//! Everything above it (head projection, broadcast, notification) is
//! best-effort; a failure there is logged and swallowed because the
//! user-visible contract, "message sent", was already met.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use duet_shared::constants::CHAT_SEED_SNIPPET;
use duet_shared::events::{StatusUpdate, TypingIndicator};
use duet_shared::{ChatId, MessageKind, MessageStatus, MessagingError};
use duet_store::{ChatHead, Database, Message, StoreError};

use crate::broadcast::Broadcaster;
use crate::notifier::Notifier;

#[derive(Clone)]
pub struct ChatService {
    db: Arc<Mutex<Database>>,
    broadcaster: Broadcaster,
    notifier: Notifier,
}

impl ChatService {
    pub fn new(db: Arc<Mutex<Database>>, broadcaster: Broadcaster, notifier: Notifier) -> Self {
        Self {
            db,
            broadcaster,
            notifier,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Send
    // ------------------------------------------------------------------

    /// Append a message to the log, then fan it out.
    ///
    /// Order of effects: validate, durable append (fatal on error),
    /// head upsert (best-effort), live broadcast (fire-and-forget),
    /// receiver notification (best-effort). Only the append can fail
    /// the request.
    pub async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        kind: MessageKind,
        body: &str,
        media_ref: Option<String>,
    ) -> Result<Message, MessagingError> {
        if kind == MessageKind::Text && body.trim().is_empty() {
            return Err(MessagingError::Validation(
                "text message body must not be empty".into(),
            ));
        }

        let chat_id = ChatId::resolve(sender_id, receiver_id)?;

        let mut message = Message {
            id: Uuid::new_v4(),
            chat_id,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            body: body.to_string(),
            kind,
            media_ref,
            status: MessageStatus::Sent,
            deleted_by_sender: false,
            deleted_by_receiver: false,
            seq: 0,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };

        {
            let db = self.db();
            message.seq = db.insert_message(&message)?;

            // The head is a disposable projection; if this fails the
            // log still holds the message and the next append repairs
            // the summary.
            if let Err(e) = db.upsert_chat_head_from_message(&message) {
                warn!(chat = %message.chat_id, error = %e, "chat head upsert failed; will self-heal");
            }
        }

        info!(
            chat = %message.chat_id,
            from = sender_id,
            to = receiver_id,
            seq = message.seq,
            "message appended"
        );

        self.broadcaster.publish_message(&message).await;

        if let Err(e) = self.notifier.message_received(&message) {
            warn!(chat = %message.chat_id, error = %e, "receiver notification failed");
        }

        Ok(message)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// The most recent `limit` messages of a chat, newest first,
    /// excluding messages the viewer soft-deleted.
    pub fn chat_history(
        &self,
        chat_id: &ChatId,
        viewer_id: &str,
        limit: u32,
    ) -> Result<Vec<Message>, MessagingError> {
        Ok(self.db().recent_messages(chat_id.as_str(), viewer_id, limit)?)
    }

    // ------------------------------------------------------------------
    // Chat heads
    // ------------------------------------------------------------------

    /// All conversations of a user, most recently active first.
    pub fn list_chats(&self, user_id: &str) -> Result<Vec<ChatHead>, MessagingError> {
        Ok(self.db().list_chat_heads_for_user(user_id)?)
    }

    /// Open a chat without an initial message (e.g. a collaboration
    /// request was accepted). Idempotent; concurrent callers all get
    /// the same head.
    pub fn create_chat_if_absent(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<ChatHead, MessagingError> {
        let chat_id = ChatId::resolve(user_a, user_b)?;
        Ok(self.db().create_chat_head_if_absent(
            chat_id.as_str(),
            user_a,
            user_b,
            CHAT_SEED_SNIPPET,
        )?)
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Hard-delete a chat: every log entry plus the head.
    ///
    /// The two deletes are not transactional; the messages go first so
    /// the worst interruption leaves an orphaned head pointing at an
    /// empty log, which `delete_chat` can be retried to clear.
    pub fn delete_chat(&self, chat_id: &ChatId, acting_user: &str) -> Result<usize, MessagingError> {
        let db = self.db();

        let head = db.get_chat_head(chat_id.as_str()).map_err(|e| match e {
            StoreError::NotFound => MessagingError::NotFound("chat"),
            other => other.into(),
        })?;
        if !head.participants().contains(&acting_user) {
            return Err(MessagingError::Unauthorized(
                "only a participant may delete the chat".into(),
            ));
        }

        let removed = db.delete_chat_messages(chat_id.as_str())?;
        db.delete_chat_head(chat_id.as_str())?;

        info!(chat = %chat_id, by = acting_user, removed, "chat deleted");
        Ok(removed)
    }

    /// Soft-delete a single message for the acting participant only.
    pub fn soft_delete_message(
        &self,
        message_id: Uuid,
        acting_user: &str,
    ) -> Result<(), MessagingError> {
        let db = self.db();

        let message = db.get_message(message_id).map_err(|e| match e {
            StoreError::NotFound => MessagingError::NotFound("message"),
            other => other.into(),
        })?;
        if !message.is_participant(acting_user) {
            return Err(MessagingError::Unauthorized(
                "only a participant may delete a message".into(),
            ));
        }

        db.mark_message_deleted(message_id, acting_user)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Status machine
    // ------------------------------------------------------------------

    /// Advance a message's delivery status from a receiver-side ack.
    ///
    /// Stale or duplicate acks are silent no-ops (and produce no
    /// broadcast), which makes redelivery of the same status event
    /// harmless. A successful advance to `read` also clears the chat
    /// head's unread flag.
    pub async fn update_message_status(
        &self,
        message_id: Uuid,
        chat_id: &ChatId,
        new_status: MessageStatus,
        acting_user: &str,
    ) -> Result<(), MessagingError> {
        let changed = {
            let db = self.db();

            let message = db.get_message(message_id).map_err(|e| match e {
                StoreError::NotFound => MessagingError::NotFound("message"),
                other => other.into(),
            })?;
            if message.chat_id != *chat_id {
                return Err(MessagingError::Validation(
                    "message does not belong to this chat".into(),
                ));
            }
            // Delivery and read acks come from the receiving side.
            if message.receiver_id != acting_user {
                return Err(MessagingError::Unauthorized(
                    "only the receiver may acknowledge a message".into(),
                ));
            }

            let changed = db.advance_message_status(message_id, new_status)?;

            if changed && new_status == MessageStatus::Read {
                if let Err(e) = db.clear_chat_unread(chat_id.as_str()) {
                    warn!(chat = %chat_id, error = %e, "failed to clear unread flag");
                }
            }

            changed
        };

        if changed {
            self.broadcaster
                .publish_status(&StatusUpdate {
                    message_id,
                    chat_id: chat_id.clone(),
                    status: new_status,
                    user_id: acting_user.to_string(),
                })
                .await;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Typing
    // ------------------------------------------------------------------

    /// Relay a typing indicator. Broadcast only; nothing is persisted.
    pub async fn send_typing(&self, indicator: TypingIndicator) {
        self.broadcaster.publish_typing(&indicator).await;
    }
}

#[cfg(test)]
mod tests {
    use crate::broadcast::BroadcastEvent;

    use super::*;

    fn service() -> ChatService {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let broadcaster = Broadcaster::new();
        let notifier = Notifier::new(db.clone());
        ChatService::new(db, broadcaster, notifier)
    }

    #[tokio::test]
    async fn send_persists_projects_and_fans_out() {
        let svc = service();
        let chat_id = ChatId::resolve("u1", "u2").unwrap();
        let mut room_rx = svc.broadcaster().subscribe(&chat_id.chat_topic()).await;
        let mut inbox_rx = svc.broadcaster().subscribe("inbox/u2").await;

        let sent = svc
            .send_message("u1", "u2", MessageKind::Text, "hi", None)
            .await
            .unwrap();

        assert_eq!(sent.chat_id, chat_id);
        assert_eq!(sent.status, MessageStatus::Sent);
        assert!(sent.seq > 0);

        // Projection reflects the append.
        let heads = svc.list_chats("u2").unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].last_message_snippet, "hi");
        assert!(heads[0].unread);

        // Both live channels observed the event.
        assert!(matches!(room_rx.try_recv().unwrap(), BroadcastEvent::Message(m) if m.id == sent.id));
        assert!(matches!(inbox_rx.try_recv().unwrap(), BroadcastEvent::Message(m) if m.id == sent.id));

        // The receiver got a persisted notification.
        assert_eq!(svc.notifier().unread_count("u2").unwrap(), 1);
        assert_eq!(svc.notifier().unread_count("u1").unwrap(), 0);
    }

    #[tokio::test]
    async fn send_rejects_empty_text_and_self_chat() {
        let svc = service();

        let err = svc
            .send_message("u1", "u2", MessageKind::Text, "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Validation(_)));

        let err = svc
            .send_message("u1", "u1", MessageKind::Text, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Validation(_)));
    }

    #[tokio::test]
    async fn history_reflects_append_order() {
        let svc = service();
        for body in ["one", "two", "three"] {
            svc.send_message("u1", "u2", MessageKind::Text, body, None)
                .await
                .unwrap();
        }

        let chat_id = ChatId::resolve("u1", "u2").unwrap();
        let history = svc.chat_history(&chat_id, "u2", 50).unwrap();
        let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["three", "two", "one"]);
    }

    #[tokio::test]
    async fn head_snippet_tracks_latest_seq() {
        let svc = service();
        svc.send_message("u1", "u2", MessageKind::Text, "first", None)
            .await
            .unwrap();
        svc.send_message("u2", "u1", MessageKind::Text, "second", None)
            .await
            .unwrap();

        let heads = svc.list_chats("u1").unwrap();
        assert_eq!(heads[0].last_message_snippet, "second");
        assert_eq!(heads[0].last_sender_id, "u2");
    }

    #[tokio::test]
    async fn status_ack_is_receiver_only_and_forward_only() {
        let svc = service();
        let sent = svc
            .send_message("u1", "u2", MessageKind::Text, "hi", None)
            .await
            .unwrap();
        let chat_id = sent.chat_id.clone();
        let mut status_rx = svc.broadcaster().subscribe(&chat_id.status_topic()).await;

        // Sender may not ack their own message.
        let err = svc
            .update_message_status(sent.id, &chat_id, MessageStatus::Delivered, "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Unauthorized(_)));

        svc.update_message_status(sent.id, &chat_id, MessageStatus::Delivered, "u2")
            .await
            .unwrap();
        assert!(matches!(
            status_rx.try_recv().unwrap(),
            BroadcastEvent::Status(s) if s.status == MessageStatus::Delivered
        ));

        // Regression attempt: no error, no effect, no broadcast.
        svc.update_message_status(sent.id, &chat_id, MessageStatus::Sent, "u2")
            .await
            .unwrap();
        assert!(status_rx.try_recv().is_err());

        let history = svc.chat_history(&chat_id, "u2", 1).unwrap();
        assert_eq!(history[0].status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn read_ack_clears_head_unread() {
        let svc = service();
        let sent = svc
            .send_message("u1", "u2", MessageKind::Text, "hi", None)
            .await
            .unwrap();

        svc.update_message_status(sent.id, &sent.chat_id, MessageStatus::Read, "u2")
            .await
            .unwrap();

        let heads = svc.list_chats("u2").unwrap();
        assert!(!heads[0].unread);
    }

    #[tokio::test]
    async fn status_checks_chat_binding() {
        let svc = service();
        let sent = svc
            .send_message("u1", "u2", MessageKind::Text, "hi", None)
            .await
            .unwrap();

        let wrong_chat = ChatId::resolve("u1", "u3").unwrap();
        let err = svc
            .update_message_status(sent.id, &wrong_chat, MessageStatus::Read, "u2")
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Validation(_)));
    }

    #[tokio::test]
    async fn create_chat_if_absent_seeds_once() {
        let svc = service();
        let first = svc.create_chat_if_absent("u1", "u2").unwrap();
        let second = svc.create_chat_if_absent("u2", "u1").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.last_message_snippet, CHAT_SEED_SNIPPET);
    }

    #[tokio::test]
    async fn delete_chat_removes_log_and_head() {
        let svc = service();
        let sent = svc
            .send_message("u1", "u2", MessageKind::Text, "hi", None)
            .await
            .unwrap();
        let chat_id = sent.chat_id.clone();

        // A stranger may not delete it.
        let err = svc.delete_chat(&chat_id, "u9").unwrap_err();
        assert!(matches!(err, MessagingError::Unauthorized(_)));

        let removed = svc.delete_chat(&chat_id, "u1").unwrap();
        assert_eq!(removed, 1);
        assert!(svc.list_chats("u1").unwrap().is_empty());
        assert!(svc.list_chats("u2").unwrap().is_empty());
        assert!(svc.chat_history(&chat_id, "u1", 50).unwrap().is_empty());
    }

    #[tokio::test]
    async fn soft_delete_hides_one_side_only() {
        let svc = service();
        let sent = svc
            .send_message("u1", "u2", MessageKind::Text, "hi", None)
            .await
            .unwrap();

        let err = svc.soft_delete_message(sent.id, "u9").unwrap_err();
        assert!(matches!(err, MessagingError::Unauthorized(_)));

        svc.soft_delete_message(sent.id, "u2").unwrap();
        assert!(svc.chat_history(&sent.chat_id, "u2", 50).unwrap().is_empty());
        assert_eq!(svc.chat_history(&sent.chat_id, "u1", 50).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_sends_keep_one_chat_and_latest_head() {
        let svc = service();
        let mut handles = Vec::new();
        for i in 0..8 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.send_message("u1", "u2", MessageKind::Text, &format!("m{i}"), None)
                    .await
                    .unwrap()
            }));
        }
        let mut sent = Vec::new();
        for handle in handles {
            sent.push(handle.await.unwrap());
        }

        let heads = svc.list_chats("u1").unwrap();
        assert_eq!(heads.len(), 1);

        // The head reflects the append with the greatest sequence,
        // regardless of task scheduling order.
        let winner = sent.iter().max_by_key(|m| m.seq).unwrap();
        assert_eq!(heads[0].last_message_snippet, winner.body);
        assert_eq!(heads[0].last_seq, winner.seq);
    }
}
