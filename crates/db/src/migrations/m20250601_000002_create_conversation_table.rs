//! Create conversation table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversation::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Conversation::BuyerId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversation::SellerId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversation::ProductId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversation::OrderId).string_len(64))
                    .col(
                        ColumnDef::new(Conversation::OrderConfirmed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Conversation::OrderConfirmedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Conversation::OrderCompleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Conversation::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Conversation::DeletedByBuyer)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Conversation::DeletedBySeller)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Conversation::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Conversation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Conversation::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_buyer")
                            .from(Conversation::Table, Conversation::BuyerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_seller")
                            .from(Conversation::Table, Conversation::SellerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: buyer_id / seller_id (conversation list queries)
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_buyer_id")
                    .table(Conversation::Table)
                    .col(Conversation::BuyerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_seller_id")
                    .table(Conversation::Table)
                    .col(Conversation::SellerId)
                    .to_owned(),
            )
            .await?;

        // Index: updated_at (list ordering)
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_updated_at")
                    .table(Conversation::Table)
                    .col(Conversation::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        // Partial unique index: at most one ACTIVE conversation per
        // (buyer, seller, product) triple. Concurrent create-or-get calls
        // race on this index; the loser re-reads the winner's row.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_conversation_active_triple \
                 ON conversation (buyer_id, seller_id, product_id) \
                 WHERE is_active",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Conversation::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Conversation {
    Table,
    Id,
    BuyerId,
    SellerId,
    ProductId,
    OrderId,
    OrderConfirmed,
    OrderConfirmedAt,
    OrderCompleted,
    CompletedAt,
    DeletedByBuyer,
    DeletedBySeller,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
