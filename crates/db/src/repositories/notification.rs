//! Notification repository.

use crate::entities::{Notification, notification};
use souk_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;

/// Notification repository for database operations.
#[derive(Clone)]
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a notification by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<notification::Model>> {
        Notification::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new notification.
    pub async fn create(&self, model: notification::ActiveModel) -> AppResult<notification::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get notifications for a user (paginated, newest first).
    pub async fn find_by_user(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        let mut query = Notification::find()
            .filter(notification::Column::UserId.eq(user_id))
            .order_by_desc(notification::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(notification::Column::Id.lt(id));
        }

        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a notification as read.
    pub async fn mark_as_read(&self, id: &str) -> AppResult<()> {
        let notification = self.find_by_id(id).await?;
        if let Some(n) = notification {
            let mut active: notification::ActiveModel = n.into();
            active.is_read = Set(true);
            active
                .update(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(())
    }

    /// Count unread notifications for a user.
    ///
    /// The unread count is always derived from this query, never stored,
    /// so it cannot drift from the rows.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        Notification::find()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a notification.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let notification = self.find_by_id(id).await?;
        if let Some(n) = notification {
            n.delete(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(())
    }

    /// Delete all notifications for a user.
    ///
    /// A single DELETE statement, so the clear is all-or-nothing.
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        use sea_orm::DeleteResult;

        let result: DeleteResult = Notification::delete_many()
            .filter(notification::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::notification::NotificationType;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn test_notification(id: &str, user_id: &str, read: bool) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            notification_type: NotificationType::OrderConfirmed,
            title: "Order confirmed".to_string(),
            body: "Your order was confirmed by the seller".to_string(),
            action_url: Some("/chats/c1".to_string()),
            is_read: read,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_user() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![
                    test_notification("n2", "buyer", false),
                    test_notification("n1", "buyer", true),
                ]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let found = repo.find_by_user("buyer", 10, None, false).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let rows = repo.delete_all_for_user("buyer").await.unwrap();
        assert_eq!(rows, 3);
    }
}
