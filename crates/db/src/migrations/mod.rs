//! Database migrations.

use sea_orm_migration::prelude::*;

mod m20250601_000001_create_user_table;
mod m20250601_000002_create_conversation_table;
mod m20250601_000003_create_chat_message_table;
mod m20250601_000004_create_notification_table;
mod m20250601_000005_create_review_table;

/// Migration collection.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_user_table::Migration),
            Box::new(m20250601_000002_create_conversation_table::Migration),
            Box::new(m20250601_000003_create_chat_message_table::Migration),
            Box::new(m20250601_000004_create_notification_table::Migration),
            Box::new(m20250601_000005_create_review_table::Migration),
        ]
    }
}
