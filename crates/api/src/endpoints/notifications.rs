//! Notification endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use souk_common::AppResult;
use souk_db::entities::notification;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Create notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/mark-as-read", post(mark_as_read))
        .route("/delete", post(delete_notification))
        .route("/clear-all", post(clear_all))
}

/// Notification response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<notification::Model> for NotificationResponse {
    fn from(n: notification::Model) -> Self {
        Self {
            id: n.id,
            notification_type: n.notification_type.as_str().to_string(),
            title: n.title,
            body: n.body,
            action_url: n.action_url,
            is_read: n.is_read,
            created_at: n.created_at.to_utc(),
        }
    }
}

/// List notifications query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

const fn default_limit() -> u64 {
    20
}

/// List notifications response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsListResponse {
    pub notifications: Vec<NotificationResponse>,
    pub unread_count: u64,
}

/// List the authenticated user's notifications with the live unread count.
async fn list_notifications(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<ApiResponse<NotificationsListResponse>> {
    let notifications = state
        .notification_service
        .list(
            &user.id,
            query.limit,
            query.until_id.as_deref(),
            query.unread_only,
        )
        .await?;

    let unread_count = state.notification_service.count_unread(&user.id).await?;

    let notifications = notifications
        .into_iter()
        .map(NotificationResponse::from)
        .collect();

    Ok(ApiResponse::ok(NotificationsListResponse {
        notifications,
        unread_count,
    }))
}

/// Single-notification request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIdRequest {
    pub notification_id: String,
}

/// Mark a notification as read.
async fn mark_as_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<NotificationIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .notification_service
        .mark_read(&user.id, &req.notification_id)
        .await?;

    Ok(ApiResponse::ok(()))
}

/// Delete a notification.
async fn delete_notification(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<NotificationIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .notification_service
        .delete(&user.id, &req.notification_id)
        .await?;

    Ok(ApiResponse::ok(()))
}

/// Clear-all response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearAllResponse {
    pub deleted_count: u64,
}

/// Delete all of the user's notifications.
async fn clear_all(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<ClearAllResponse>> {
    info!(user = %user.id, "Clearing all notifications");

    let deleted_count = state.notification_service.clear_all(&user.id).await?;

    Ok(ApiResponse::ok(ClearAllResponse { deleted_count }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn notification_response_serialization() {
        let response = NotificationResponse {
            id: "n1".to_string(),
            notification_type: "order_confirmed".to_string(),
            title: "Order confirmed".to_string(),
            body: "The seller confirmed your order".to_string(),
            action_url: Some("/chats/c1".to_string()),
            is_read: false,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"type\":\"order_confirmed\""));
        assert!(json.contains("\"isRead\":false"));
        assert!(json.contains("\"actionUrl\":\"/chats/c1\""));
    }
}
