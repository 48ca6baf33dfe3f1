//! Chat message repository.

use crate::entities::chat_message::{self, ActiveModel, Column, Entity as ChatMessage};
use souk_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, sea_query::Expr,
};
use std::sync::Arc;

/// Repository for chat message operations.
#[derive(Clone)]
pub struct ChatMessageRepository {
    db: Arc<DatabaseConnection>,
}

impl ChatMessageRepository {
    /// Create a new chat message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append a new message.
    pub async fn create(&self, model: ActiveModel) -> AppResult<chat_message::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a message by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<chat_message::Model>> {
        ChatMessage::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find messages in a conversation, newest first.
    pub async fn find_by_chat(
        &self,
        chat_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<chat_message::Model>> {
        let mut query = ChatMessage::find()
            .filter(Column::ChatId.eq(chat_id))
            .order_by_desc(Column::CreatedAt);

        if let Some(until) = until_id
            && let Some(until_msg) = self.find_by_id(until).await?
        {
            query = query.filter(Column::CreatedAt.lt(until_msg.created_at));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark the listed messages read, but only where the reader is the
    /// receiver. Returns the number of rows actually flipped.
    pub async fn mark_read(
        &self,
        chat_id: &str,
        message_ids: &[String],
        reader_id: &str,
    ) -> AppResult<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let result = ChatMessage::update_many()
            .col_expr(Column::IsRead, Expr::value(true))
            .filter(Column::ChatId.eq(chat_id))
            .filter(Column::Id.is_in(message_ids.iter().map(String::as_str)))
            .filter(Column::ReceiverId.eq(reader_id))
            .filter(Column::IsRead.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Count a user's unread messages in one conversation.
    pub async fn count_unread_in(&self, chat_id: &str, user_id: &str) -> AppResult<u64> {
        ChatMessage::find()
            .filter(Column::ChatId.eq(chat_id))
            .filter(Column::ReceiverId.eq(user_id))
            .filter(Column::IsRead.eq(false))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::chat_message::MessageType;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn test_message(id: &str, sender: &str, receiver: &str) -> chat_message::Model {
        chat_message::Model {
            id: id.to_string(),
            chat_id: "c1".to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: "hello".to_string(),
            message_type: MessageType::Text,
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_chat() {
        let messages = vec![
            test_message("m2", "buyer", "seller"),
            test_message("m1", "seller", "buyer"),
        ];

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([messages.clone()])
                .into_connection(),
        );

        let repo = ChatMessageRepository::new(db);
        let found = repo.find_by_chat("c1", 20, None).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "m2");
    }

    #[tokio::test]
    async fn test_mark_read_empty_ids_is_noop() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = ChatMessageRepository::new(db);
        let rows = repo.mark_read("c1", &[], "buyer").await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_mark_read_counts_flipped_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                }])
                .into_connection(),
        );

        let repo = ChatMessageRepository::new(db);
        let rows = repo
            .mark_read("c1", &["m1".to_string(), "m2".to_string()], "buyer")
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }
}
