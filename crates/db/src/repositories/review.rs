//! Review repository.
//!
//! Read-only view over the external review subsystem's table, used by the
//! review-eligibility gate.

use crate::entities::{Review, review};
use souk_common::{AppError, AppResult};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::Arc;

/// Repository for review lookups.
#[derive(Clone)]
pub struct ReviewRepository {
    db: Arc<DatabaseConnection>,
}

impl ReviewRepository {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Whether the user already reviewed this product/order pair.
    pub async fn exists(
        &self,
        user_id: &str,
        product_id: &str,
        order_id: &str,
    ) -> AppResult<bool> {
        let count = Review::find()
            .filter(review::Column::UserId.eq(user_id))
            .filter(review::Column::ProductId.eq(product_id))
            .filter(review::Column::OrderId.eq(order_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count > 0)
    }
}
