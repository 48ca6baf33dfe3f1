//! Chat message entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Message content types.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    #[sea_orm(string_value = "text")]
    Text,
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "voice")]
    Voice,
}

impl MessageType {
    /// Stable wire name of this message type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Voice => "voice",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning conversation
    #[sea_orm(indexed)]
    pub chat_id: String,

    /// Sender; always one of the conversation's two participants
    #[sea_orm(indexed)]
    pub sender_id: String,

    /// Receiver; always the other participant
    #[sea_orm(indexed)]
    pub receiver_id: String,

    /// Message content (text, or a reference for image/voice)
    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub message_type: MessageType,

    /// Has the receiver's client acknowledged this message?
    #[sea_orm(default_value = false)]
    pub is_read: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversation::Entity",
        from = "Column::ChatId",
        to = "super::conversation::Column::Id",
        on_delete = "Cascade"
    )]
    Conversation,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SenderId",
        to = "super::user::Column::Id"
    )]
    Sender,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ReceiverId",
        to = "super::user::Column::Id"
    )]
    Receiver,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
