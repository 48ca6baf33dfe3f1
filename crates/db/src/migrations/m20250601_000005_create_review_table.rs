//! Create review table migration.
//!
//! The review subsystem owns the writes; this core only reads the table for
//! the eligibility gate, so the schema carries just the lookup columns.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Review::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Review::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Review::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Review::ProductId).string_len(64).not_null())
                    .col(ColumnDef::new(Review::OrderId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Review::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, product_id, order_id) (eligibility lookup)
        manager
            .create_index(
                Index::create()
                    .name("idx_review_user_product_order")
                    .table(Review::Table)
                    .col(Review::UserId)
                    .col(Review::ProductId)
                    .col(Review::OrderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Review::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Review {
    Table,
    Id,
    UserId,
    ProductId,
    OrderId,
    CreatedAt,
}
