//! Create chat message table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChatMessage::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChatMessage::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::ChatId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::SenderId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::ReceiverId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChatMessage::Content).text().not_null())
                    .col(
                        ColumnDef::new(ChatMessage::MessageType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::IsRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_message_conversation")
                            .from(ChatMessage::Table, ChatMessage::ChatId)
                            .to(Conversation::Table, Conversation::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_message_sender")
                            .from(ChatMessage::Table, ChatMessage::SenderId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (chat_id, created_at) (history pagination)
        manager
            .create_index(
                Index::create()
                    .name("idx_chat_message_chat_created")
                    .table(ChatMessage::Table)
                    .col(ChatMessage::ChatId)
                    .col(ChatMessage::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: (receiver_id, is_read) (unread counts)
        manager
            .create_index(
                Index::create()
                    .name("idx_chat_message_receiver_is_read")
                    .table(ChatMessage::Table)
                    .col(ChatMessage::ReceiverId)
                    .col(ChatMessage::IsRead)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatMessage::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ChatMessage {
    Table,
    Id,
    ChatId,
    SenderId,
    ReceiverId,
    Content,
    MessageType,
    IsRead,
    CreatedAt,
}

#[derive(Iden)]
enum Conversation {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
