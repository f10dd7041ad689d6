//! Notification dispatch boundary.
//!
//! Turns domain events into persisted [`Notification`] rows and keeps
//! the per-user unread counter queryable. The messaging core only
//! emits `message_received`; the other helpers exist for the
//! job/application services sitting outside this crate.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use duet_shared::{MessagingError, NotificationType};
use duet_store::{Database, Message, Notification};

/// Longest snippet of a message body carried into its notification.
const SNIPPET_LEN: usize = 120;

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Mutex<Database>>,
}

impl Notifier {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    fn db(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Persist a notification for a domain event.
    #[allow(clippy::too_many_arguments)]
    pub fn notify(
        &self,
        user_id: &str,
        kind: NotificationType,
        title: &str,
        body: &str,
        related_entity_id: Option<String>,
        related_entity_type: Option<String>,
        action_url: Option<String>,
        high_priority: bool,
    ) -> Result<Notification, MessagingError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            body: body.to_string(),
            related_entity_id,
            related_entity_type,
            action_url,
            read: false,
            read_at: None,
            high_priority,
            created_at: Utc::now(),
        };

        self.db().insert_notification(&notification)?;
        tracing::info!(user = user_id, kind = %kind, "notification created");

        Ok(notification)
    }

    /// Notify the receiver of a freshly appended message.
    ///
    /// Every append is notify-eligible; duplicate notifications for a
    /// receiver who was actively viewing the chat are acceptable under
    /// the at-least-once policy.
    pub fn message_received(&self, message: &Message) -> Result<Notification, MessagingError> {
        self.notify(
            &message.receiver_id,
            NotificationType::MessageReceived,
            NotificationType::MessageReceived.description(),
            &snippet(&message.body),
            Some(message.id.to_string()),
            Some("Message".to_string()),
            Some(format!("/chat/{}", message.chat_id)),
            false,
        )
    }

    /// Domain-event helper for the application service.
    pub fn collaboration_completed(
        &self,
        user_id: &str,
        application_id: &str,
    ) -> Result<Notification, MessagingError> {
        self.notify(
            user_id,
            NotificationType::CollaborationCompleted,
            "Collaboration Completed",
            "A collaboration has been marked as completed",
            Some(application_id.to_string()),
            Some("Application".to_string()),
            Some(format!("/applications/{application_id}")),
            false,
        )
    }

    /// Domain-event helper for the job service; called once per
    /// applicant of the closed post.
    pub fn job_post_closed(
        &self,
        user_id: &str,
        job_post_id: &str,
        job_title: &str,
    ) -> Result<Notification, MessagingError> {
        self.notify(
            user_id,
            NotificationType::JobPostClosed,
            NotificationType::JobPostClosed.description(),
            &format!("The job post \"{job_title}\" has been closed"),
            Some(job_post_id.to_string()),
            Some("JobPost".to_string()),
            Some(format!("/jobs/{job_post_id}")),
            false,
        )
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn notifications_for(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, MessagingError> {
        Ok(self.db().list_notifications(user_id, unread_only, limit)?)
    }

    pub fn unread_count(&self, user_id: &str) -> Result<i64, MessagingError> {
        Ok(self.db().unread_notification_count(user_id)?)
    }

    // ------------------------------------------------------------------
    // Mutation surface
    // ------------------------------------------------------------------

    /// Mark one notification read. Only its owner may do so.
    pub fn mark_read(
        &self,
        notification_id: Uuid,
        acting_user: &str,
    ) -> Result<Notification, MessagingError> {
        let db = self.db();
        let existing = db.get_notification(notification_id).map_err(|e| match e {
            duet_store::StoreError::NotFound => MessagingError::NotFound("notification"),
            other => other.into(),
        })?;

        if existing.user_id != acting_user {
            return Err(MessagingError::Unauthorized(
                "you can only mark your own notifications as read".into(),
            ));
        }

        Ok(db.mark_notification_read(notification_id)?)
    }

    /// Mark everything unread as read. Returns the number of rows
    /// changed; calling again immediately returns 0.
    pub fn mark_all_read(&self, user_id: &str) -> Result<usize, MessagingError> {
        let count = self.db().mark_all_notifications_read(user_id)?;
        tracing::info!(user = user_id, count, "marked notifications read");
        Ok(count)
    }

    /// Retention sweep: delete the user's read notifications.
    pub fn sweep_read(&self, user_id: &str) -> Result<usize, MessagingError> {
        let count = self.db().delete_read_notifications(user_id)?;
        tracing::info!(user = user_id, count, "deleted read notifications");
        Ok(count)
    }
}

fn snippet(body: &str) -> String {
    if body.len() <= SNIPPET_LEN {
        body.to_string()
    } else {
        let mut end = SNIPPET_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}
