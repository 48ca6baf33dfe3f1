//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `souk_test`)
//!   `TEST_DB_PASSWORD` (default: `souk_test`)
//!   `TEST_DB_NAME` (default: `souk_test`)

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use sea_orm::Set;
use souk_db::entities::{conversation, user};
use souk_db::repositories::{ConversationRepository, UserRepository};
use souk_db::test_utils::{TestDatabase, TestDbConfig};
use std::sync::Arc;

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let config = TestDbConfig::default();
    let result = TestDatabase::with_config(config).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_cleanup() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    let result = db.cleanup().await;
    assert!(result.is_ok(), "Cleanup failed: {:?}", result.err());
}

fn user_model(id: &str) -> user::ActiveModel {
    user::ActiveModel {
        id: Set(id.to_string()),
        username: Set(id.to_string()),
        token: Set(None),
        is_admin: Set(false),
        created_at: Set(Utc::now().into()),
    }
}

fn conversation_model(id: &str, order_id: Option<&str>) -> conversation::ActiveModel {
    let now = Utc::now();
    conversation::ActiveModel {
        id: Set(id.to_string()),
        buyer_id: Set("buyer".to_string()),
        seller_id: Set("seller".to_string()),
        product_id: Set("product".to_string()),
        order_id: Set(order_id.map(ToString::to_string)),
        order_confirmed: Set(false),
        order_confirmed_at: Set(None),
        order_completed: Set(false),
        completed_at: Set(None),
        deleted_by_buyer: Set(false),
        deleted_by_seller: Set(false),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
}

/// Runs the conditional updates against a real database: the second confirm
/// and the second same-side delete must each match zero rows.
#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_conditional_updates_end_to_end() {
    let db = TestDatabase::create_unique()
        .await
        .expect("Failed to create test database");
    souk_db::migrate(db.connection())
        .await
        .expect("Migrations failed");

    // With the `mock` feature enabled, `DatabaseConnection` is not `Clone`;
    // open a second connection to the same test database for the repositories.
    let conn = Arc::new(
        sea_orm::Database::connect(&db.config.database_url())
            .await
            .unwrap(),
    );
    let users = UserRepository::new(conn.clone());
    let conversations = ConversationRepository::new(conn.clone());

    use sea_orm::ActiveModelTrait;
    user_model("buyer").insert(conn.as_ref()).await.unwrap();
    user_model("seller").insert(conn.as_ref()).await.unwrap();
    conversations
        .create(conversation_model("c1", Some("o1")))
        .await
        .unwrap();

    assert!(users.find_by_id("buyer").await.unwrap().is_some());

    // Confirm is first-writer-wins.
    let winner = conversations
        .confirm_order("c1", Utc::now().into())
        .await
        .unwrap();
    let loser = conversations
        .confirm_order("c1", Utc::now().into())
        .await
        .unwrap();
    assert_eq!(winner, 1);
    assert_eq!(loser, 0);

    // So is each side's delete flag.
    let first = conversations
        .set_delete_flag("c1", true, Utc::now().into())
        .await
        .unwrap();
    let repeat = conversations
        .set_delete_flag("c1", true, Utc::now().into())
        .await
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(repeat, 0);

    let row = conversations.find_by_id("c1").await.unwrap().unwrap();
    assert!(row.order_confirmed);
    assert!(row.deleted_by_buyer);
    assert!(!row.deleted_by_seller);
    assert!(!row.is_active);

    db.drop_database().await.expect("Failed to drop database");
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_active_triple_unique_index() {
    let db = TestDatabase::create_unique()
        .await
        .expect("Failed to create test database");
    souk_db::migrate(db.connection())
        .await
        .expect("Migrations failed");

    // See above: `DatabaseConnection` is not `Clone` with the `mock` feature.
    let conn = Arc::new(
        sea_orm::Database::connect(&db.config.database_url())
            .await
            .unwrap(),
    );
    let conversations = ConversationRepository::new(conn.clone());

    use sea_orm::ActiveModelTrait;
    user_model("buyer").insert(conn.as_ref()).await.unwrap();
    user_model("seller").insert(conn.as_ref()).await.unwrap();

    conversations
        .create(conversation_model("c1", None))
        .await
        .unwrap();

    // A second active row for the same triple violates the partial index.
    let duplicate = conversations.create(conversation_model("c2", None)).await;
    assert!(duplicate.is_err());

    // Closing the first frees the triple for a fresh conversation.
    conversations
        .set_delete_flag("c1", true, Utc::now().into())
        .await
        .unwrap();
    conversations
        .create(conversation_model("c3", None))
        .await
        .unwrap();

    db.drop_database().await.expect("Failed to drop database");
}
