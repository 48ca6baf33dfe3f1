//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification types.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum NotificationType {
    #[sea_orm(string_value = "order_placed")]
    OrderPlaced,
    #[sea_orm(string_value = "order_confirmed")]
    OrderConfirmed,
    #[sea_orm(string_value = "order_completed")]
    OrderCompleted,
    #[sea_orm(string_value = "message_received")]
    MessageReceived,
    #[sea_orm(string_value = "chat_closed")]
    ChatClosed,
}

impl NotificationType {
    /// Stable wire name of this notification type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderPlaced => "order_placed",
            Self::OrderConfirmed => "order_confirmed",
            Self::OrderCompleted => "order_completed",
            Self::MessageReceived => "message_received",
            Self::ChatClosed => "chat_closed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Exactly one recipient per record; fan-out to N users means N rows
    #[sea_orm(indexed)]
    pub user_id: String,

    pub notification_type: NotificationType,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Deep link the client navigates to on tap
    #[sea_orm(nullable)]
    pub action_url: Option<String>,

    #[sea_orm(default_value = false)]
    pub is_read: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Recipient,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
