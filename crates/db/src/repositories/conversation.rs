//! Conversation repository.
//!
//! The order-state mutations are conditional updates keyed on the current
//! flag values. Two racing confirms both reach the database, but only one
//! matches the `order_confirmed = false` predicate; `rows_affected`
//! discriminates the winner without any cross-request lock.

use crate::entities::{
    ChatMessage, Conversation, chat_message,
    conversation::{self, ActiveModel, Column},
};
use souk_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
    prelude::DateTimeWithTimeZone,
    sea_query::Expr,
};
use std::sync::Arc;

/// Repository for conversation operations.
#[derive(Clone)]
pub struct ConversationRepository {
    db: Arc<DatabaseConnection>,
}

impl ConversationRepository {
    /// Create a new conversation repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a new conversation.
    pub async fn create(&self, model: ActiveModel) -> AppResult<conversation::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a conversation by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<conversation::Model>> {
        Conversation::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the active conversation for a (buyer, seller, product) triple.
    ///
    /// The partial unique index guarantees at most one row matches.
    pub async fn find_active_by_triple(
        &self,
        buyer_id: &str,
        seller_id: &str,
        product_id: &str,
    ) -> AppResult<Option<conversation::Model>> {
        Conversation::find()
            .filter(Column::BuyerId.eq(buyer_id))
            .filter(Column::SellerId.eq(seller_id))
            .filter(Column::ProductId.eq(product_id))
            .filter(Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List a user's conversations, newest activity first.
    ///
    /// Conversations the user has soft-deleted are hidden from them but stay
    /// visible to the other side.
    pub async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<conversation::Model>> {
        Conversation::find()
            .filter(
                sea_orm::Condition::any()
                    .add(
                        sea_orm::Condition::all()
                            .add(Column::BuyerId.eq(user_id))
                            .add(Column::DeletedByBuyer.eq(false)),
                    )
                    .add(
                        sea_orm::Condition::all()
                            .add(Column::SellerId.eq(user_id))
                            .add(Column::DeletedBySeller.eq(false)),
                    ),
            )
            .order_by_desc(Column::UpdatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Attach an external order to a conversation that has none.
    ///
    /// Returns the number of rows updated: 0 means an order was already
    /// attached (or the conversation does not exist).
    pub async fn attach_order(
        &self,
        id: &str,
        order_id: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = Conversation::update_many()
            .col_expr(Column::OrderId, Expr::value(order_id))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::OrderId.is_null())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Confirm the order: compare-and-set on `order_confirmed = false`.
    ///
    /// Returns 0 when the order was already confirmed (a concurrent confirm
    /// won the race) or the preconditions no longer hold.
    pub async fn confirm_order(
        &self,
        id: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = Conversation::update_many()
            .col_expr(Column::OrderConfirmed, Expr::value(true))
            .col_expr(Column::OrderConfirmedAt, Expr::value(now.clone()))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::OrderId.is_not_null())
            .filter(Column::OrderConfirmed.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Complete the order: compare-and-set on `order_completed = false`.
    ///
    /// The `order_confirmed = true` predicate preserves the invariant that a
    /// completed order is always a confirmed one.
    pub async fn complete_order(
        &self,
        id: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = Conversation::update_many()
            .col_expr(Column::OrderCompleted, Expr::value(true))
            .col_expr(Column::CompletedAt, Expr::value(now.clone()))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::OrderConfirmed.eq(true))
            .filter(Column::OrderCompleted.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Set one side's soft-delete flag and close the conversation:
    /// compare-and-set on `<flag> = false`.
    ///
    /// Either side leaving ends the exchange; the other side keeps read
    /// access to the history until they delete too. Returns 0 when this side
    /// already deleted, so repeated deletes trigger no second round of side
    /// effects.
    pub async fn set_delete_flag(
        &self,
        id: &str,
        buyer_side: bool,
        now: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let column = if buyer_side {
            Column::DeletedByBuyer
        } else {
            Column::DeletedBySeller
        };

        let result = Conversation::update_many()
            .col_expr(column, Expr::value(true))
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(column.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Purge a conversation and its messages in one transaction.
    ///
    /// Only called once both delete flags are set.
    pub async fn purge(&self, id: &str) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        ChatMessage::delete_many()
            .filter(chat_message::Column::ChatId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Conversation::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Touch the conversation's `updated_at`.
    pub async fn touch(&self, id: &str, now: DateTimeWithTimeZone) -> AppResult<()> {
        Conversation::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn test_conversation(id: &str) -> conversation::Model {
        conversation::Model {
            id: id.to_string(),
            buyer_id: "buyer".to_string(),
            seller_id: "seller".to_string(),
            product_id: "product".to_string(),
            order_id: Some("order".to_string()),
            order_confirmed: false,
            order_confirmed_at: None,
            order_completed: false,
            completed_at: None,
            deleted_by_buyer: false,
            deleted_by_seller: false,
            is_active: true,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[test_conversation("c1")]])
                .into_connection(),
        );

        let repo = ConversationRepository::new(db);
        let found = repo.find_by_id("c1").await.unwrap().unwrap();
        assert_eq!(found.id, "c1");
        assert!(found.is_participant("buyer"));
        assert_eq!(found.counterparty("buyer"), Some("seller"));
    }

    #[tokio::test]
    async fn test_confirm_order_cas_winner_and_loser() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let repo = ConversationRepository::new(db);
        let winner = repo.confirm_order("c1", Utc::now().into()).await.unwrap();
        let loser = repo.confirm_order("c1", Utc::now().into()).await.unwrap();

        assert_eq!(winner, 1);
        assert_eq!(loser, 0);
    }

    #[tokio::test]
    async fn test_set_delete_flag_noop_when_already_set() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = ConversationRepository::new(db);
        let rows = repo
            .set_delete_flag("c1", true, Utc::now().into())
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_attach_order_noop_when_already_attached() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = ConversationRepository::new(db);
        let rows = repo
            .attach_order("c1", "o2", Utc::now().into())
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }
}
