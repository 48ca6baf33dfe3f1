//! Notification service.
//!
//! One row per recipient; fan-out to N users means N rows. The service is
//! decoupled from the conversation store: a failed notification or publish is
//! logged and never rolls back the domain mutation that triggered it.

use crate::services::event_publisher::EventPublisherService;
use souk_common::{AppError, AppResult, IdGenerator, LiveEvent, NotificationPayload};
use souk_db::{
    entities::notification::{self, NotificationType},
    repositories::NotificationRepository,
};
use sea_orm::Set;

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    event_publisher: Option<EventPublisherService>,
    id_gen: IdGenerator,
}

fn to_payload(model: &notification::Model) -> NotificationPayload {
    NotificationPayload {
        id: model.id.clone(),
        user_id: model.user_id.clone(),
        notification_type: model.notification_type.as_str().to_string(),
        title: model.title.clone(),
        body: model.body.clone(),
        action_url: model.action_url.clone(),
        is_read: model.is_read,
        created_at: model.created_at.to_utc(),
    }
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(notification_repo: NotificationRepository) -> Self {
        Self {
            notification_repo,
            event_publisher: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    async fn publish_to_user(&self, user_id: &str, event: LiveEvent) {
        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher.publish_to_user(user_id, event).await {
                tracing::warn!(error = %e, user_id, "Failed to publish notification event");
            }
        }
    }

    /// Create a notification for one recipient and announce it on their
    /// personal channel.
    pub async fn notify(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        title: &str,
        body: &str,
        action_url: Option<String>,
    ) -> AppResult<notification::Model> {
        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            notification_type: Set(notification_type),
            title: Set(title.to_string()),
            body: Set(body.to_string()),
            action_url: Set(action_url),
            is_read: Set(false),
            created_at: Set(chrono::Utc::now().into()),
        };

        let notification = self.notification_repo.create(model).await?;

        self.publish_to_user(
            user_id,
            LiveEvent::NotificationCreated {
                notification: to_payload(&notification),
            },
        )
        .await;

        Ok(notification)
    }

    /// Get notifications for a user (paginated, newest first).
    pub async fn list(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        self.notification_repo
            .find_by_user(user_id, limit, until_id, unread_only)
            .await
    }

    /// Count unread notifications for a user. Always derived, never stored.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }

    /// Look up a notification, failing closed when it is missing or belongs
    /// to someone else.
    async fn find_owned(&self, user_id: &str, id: &str) -> AppResult<notification::Model> {
        self.notification_repo
            .find_by_id(id)
            .await?
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Notification not found: {id}")))
    }

    /// Mark a notification as read.
    pub async fn mark_read(&self, user_id: &str, id: &str) -> AppResult<()> {
        let notification = self.find_owned(user_id, id).await?;
        self.notification_repo.mark_as_read(&notification.id).await?;

        let unread_count = self.notification_repo.count_unread(user_id).await?;
        self.publish_to_user(
            user_id,
            LiveEvent::NotificationUpdated {
                notification_id: notification.id,
                read: Some(true),
                deleted: false,
                unread_count,
            },
        )
        .await;

        Ok(())
    }

    /// Delete a notification.
    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        let notification = self.find_owned(user_id, id).await?;
        self.notification_repo.delete(&notification.id).await?;

        let unread_count = self.notification_repo.count_unread(user_id).await?;
        self.publish_to_user(
            user_id,
            LiveEvent::NotificationUpdated {
                notification_id: notification.id,
                read: None,
                deleted: true,
                unread_count,
            },
        )
        .await;

        Ok(())
    }

    /// Delete all of a user's notifications.
    ///
    /// A single statement on the repository side, so a crash mid-way cannot
    /// leave a half-cleared list.
    pub async fn clear_all(&self, user_id: &str) -> AppResult<u64> {
        let deleted = self.notification_repo.delete_all_for_user(user_id).await?;

        self.publish_to_user(user_id, LiveEvent::NotificationsCleared { unread_count: 0 })
            .await;

        Ok(deleted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn stored(id: &str, user_id: &str, read: bool) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            notification_type: NotificationType::MessageReceived,
            title: "New message".to_string(),
            body: "You have a new message".to_string(),
            action_url: Some("/chats/c1".to_string()),
            is_read: read,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn mark_read_rejects_foreign_notification() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[stored("n1", "someone-else", false)]])
                .into_connection(),
        );

        let service = NotificationService::new(NotificationRepository::new(db));
        let err = service.mark_read("me", "n1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_read_rejects_missing_notification() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<notification::Model>::new()])
                .into_connection(),
        );

        let service = NotificationService::new(NotificationRepository::new(db));
        let err = service.mark_read("me", "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn clear_all_reports_deleted_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 4,
                }])
                .into_connection(),
        );

        let mut service = NotificationService::new(NotificationRepository::new(db));
        service.set_event_publisher(Arc::new(crate::services::NoOpEventPublisher));

        let deleted = service.clear_all("me").await.unwrap();
        assert_eq!(deleted, 4);
    }
}
