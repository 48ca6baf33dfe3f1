//! Conversation entity: the chat+order aggregate between one buyer and one
//! seller about one product.
//!
//! Order state is embedded as flag pairs. The guarded mutations in the
//! repository keep the invariants: `order_completed` implies
//! `order_confirmed`, `order_confirmed_at` is set iff `order_confirmed`, and
//! a conversation without an `order_id` can never be confirmed or completed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Buyer participant; immutable after creation
    #[sea_orm(indexed)]
    pub buyer_id: String,

    /// Seller participant; immutable after creation
    #[sea_orm(indexed)]
    pub seller_id: String,

    /// Product under discussion
    #[sea_orm(indexed)]
    pub product_id: String,

    /// External order reference; NULL for pure product-inquiry chats
    #[sea_orm(nullable)]
    pub order_id: Option<String>,

    #[sea_orm(default_value = false)]
    pub order_confirmed: bool,

    #[sea_orm(nullable)]
    pub order_confirmed_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(default_value = false)]
    pub order_completed: bool,

    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Soft-delete flag for the buyer side
    #[sea_orm(default_value = false)]
    pub deleted_by_buyer: bool,

    /// Soft-delete flag for the seller side
    #[sea_orm(default_value = false)]
    pub deleted_by_seller: bool,

    /// False once terminal/closed
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether the given user is a participant of this conversation.
    #[must_use]
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The participant opposite to `user_id`.
    ///
    /// Returns `None` when `user_id` is not a participant.
    #[must_use]
    pub fn counterparty(&self, user_id: &str) -> Option<&str> {
        if self.buyer_id == user_id {
            Some(&self.seller_id)
        } else if self.seller_id == user_id {
            Some(&self.buyer_id)
        } else {
            None
        }
    }

    /// Whether the given participant has soft-deleted this conversation.
    #[must_use]
    pub fn is_deleted_by(&self, user_id: &str) -> bool {
        (self.buyer_id == user_id && self.deleted_by_buyer)
            || (self.seller_id == user_id && self.deleted_by_seller)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BuyerId",
        to = "super::user::Column::Id"
    )]
    Buyer,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SellerId",
        to = "super::user::Column::Id"
    )]
    Seller,

    #[sea_orm(has_many = "super::chat_message::Entity")]
    Messages,
}

impl Related<super::chat_message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
