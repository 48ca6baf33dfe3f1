//! Conversation and order endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use souk_common::{AppError, AppResult};
use souk_db::entities::{chat_message, chat_message::MessageType, conversation};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Create chats router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_or_get_chat).get(list_chats))
        .route("/{chat_id}", delete(delete_chat))
        .route("/{chat_id}/messages", get(get_messages).post(send_message))
        .route("/{chat_id}/read", post(mark_read))
        .route("/{chat_id}/confirm-order", post(confirm_order))
        .route("/{chat_id}/complete-order", post(complete_order))
        .route("/{chat_id}/attach-order", post(attach_order))
        .route("/{chat_id}/review-eligibility", get(review_eligibility))
}

/// Conversation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub order_id: Option<String>,
    pub order_confirmed: bool,
    pub order_confirmed_at: Option<DateTime<Utc>>,
    pub order_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<conversation::Model> for ConversationResponse {
    fn from(conv: conversation::Model) -> Self {
        Self {
            id: conv.id,
            buyer_id: conv.buyer_id,
            seller_id: conv.seller_id,
            product_id: conv.product_id,
            order_id: conv.order_id,
            order_confirmed: conv.order_confirmed,
            order_confirmed_at: conv.order_confirmed_at.map(|t| t.to_utc()),
            order_completed: conv.order_completed,
            completed_at: conv.completed_at.map(|t| t.to_utc()),
            is_active: conv.is_active,
            created_at: conv.created_at.to_utc(),
            updated_at: conv.updated_at.to_utc(),
        }
    }
}

/// Message response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<chat_message::Model> for MessageResponse {
    fn from(msg: chat_message::Model) -> Self {
        Self {
            id: msg.id,
            chat_id: msg.chat_id,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            content: msg.content,
            message_type: msg.message_type.as_str().to_string(),
            is_read: msg.is_read,
            created_at: msg.created_at.to_utc(),
        }
    }
}

/// Create-or-get chat request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    #[validate(length(min = 1, max = 32))]
    pub seller_id: String,
    #[validate(length(min = 1, max = 64))]
    pub product_id: String,
    pub order_id: Option<String>,
}

/// Create a conversation for the (buyer, seller, product) triple, or return
/// the existing active one.
async fn create_or_get_chat(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateChatRequest>,
) -> AppResult<ApiResponse<ConversationResponse>> {
    req.validate()?;

    info!(buyer = %user.id, seller = %req.seller_id, "Opening chat");

    let conversation = state
        .conversation_service
        .create_or_get(
            &user.id,
            &req.seller_id,
            &req.product_id,
            req.order_id.as_deref(),
        )
        .await?;

    Ok(ApiResponse::ok(ConversationResponse::from(conversation)))
}

/// Conversation list entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummaryResponse {
    pub conversation: ConversationResponse,
    pub counterparty_id: String,
    pub counterparty_username: String,
    pub last_message: Option<MessageResponse>,
    pub unread_count: u64,
}

/// Conversation list response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatsListResponse {
    pub chats: Vec<ChatSummaryResponse>,
}

/// List the authenticated user's conversations, newest activity first.
async fn list_chats(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<ChatsListResponse>> {
    let summaries = state.conversation_service.list_for_user(&user.id).await?;

    let chats = summaries
        .into_iter()
        .map(|s| ChatSummaryResponse {
            conversation: ConversationResponse::from(s.conversation),
            counterparty_id: s.counterparty_id,
            counterparty_username: s.counterparty_username,
            last_message: s.last_message.map(MessageResponse::from),
            unread_count: s.unread_count,
        })
        .collect();

    Ok(ApiResponse::ok(ChatsListResponse { chats }))
}

/// Message history query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
}

const fn default_limit() -> u64 {
    50
}

/// Message list response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListResponse {
    pub messages: Vec<MessageResponse>,
}

/// Get a conversation's message history, newest first.
async fn get_messages(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<GetMessagesQuery>,
) -> AppResult<ApiResponse<MessageListResponse>> {
    let messages = state
        .conversation_service
        .get_messages(&chat_id, &user.id, query.limit, query.until_id.as_deref())
        .await?;

    let messages = messages.into_iter().map(MessageResponse::from).collect();

    Ok(ApiResponse::ok(MessageListResponse { messages }))
}

/// Send message request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    /// The chat the receiver is known to be viewing, if any.
    pub active_chat: Option<String>,
}

fn default_message_type() -> String {
    "text".to_string()
}

fn parse_message_type(value: &str) -> AppResult<MessageType> {
    match value {
        "text" => Ok(MessageType::Text),
        "image" => Ok(MessageType::Image),
        "voice" => Ok(MessageType::Voice),
        other => Err(AppError::BadRequest(format!(
            "Unknown message type: {other}"
        ))),
    }
}

/// Send a message in a conversation.
async fn send_message(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<ApiResponse<MessageResponse>> {
    req.validate()?;

    let input = souk_core::CreateMessageInput {
        content: req.content,
        message_type: parse_message_type(&req.message_type)?,
        active_chat: req.active_chat,
    };

    let message = state
        .conversation_service
        .send_message(&chat_id, &user.id, input)
        .await?;

    Ok(ApiResponse::ok(MessageResponse::from(message)))
}

/// Mark-read request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub message_ids: Vec<String>,
}

/// Mark-read response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub read_count: u64,
}

/// Mark the listed messages as read.
async fn mark_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<ApiResponse<MarkReadResponse>> {
    let count = state
        .conversation_service
        .mark_read(&chat_id, &user.id, &req.message_ids)
        .await?;

    Ok(ApiResponse::ok(MarkReadResponse { read_count: count }))
}

/// Seller confirms the pending order.
async fn confirm_order(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> AppResult<ApiResponse<ConversationResponse>> {
    info!(user = %user.id, chat = %chat_id, "Confirming order");

    let conversation = state
        .conversation_service
        .confirm_order(&chat_id, &user.id)
        .await?;

    Ok(ApiResponse::ok(ConversationResponse::from(conversation)))
}

/// Buyer marks the confirmed order complete.
async fn complete_order(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> AppResult<ApiResponse<ConversationResponse>> {
    info!(user = %user.id, chat = %chat_id, "Completing order");

    let conversation = state
        .conversation_service
        .complete_order(&chat_id, &user.id)
        .await?;

    Ok(ApiResponse::ok(ConversationResponse::from(conversation)))
}

/// Attach-order request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AttachOrderRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_id: String,
}

/// Attach an external order to the conversation (checkout collaborator).
async fn attach_order(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(req): Json<AttachOrderRequest>,
) -> AppResult<ApiResponse<ConversationResponse>> {
    req.validate()?;

    // System transition, but still scoped to observers of the chat.
    if !state
        .conversation_service
        .can_observe(&chat_id, &user)
        .await?
    {
        return Err(AppError::NotFound(format!(
            "Conversation not found: {chat_id}"
        )));
    }

    info!(user = %user.id, chat = %chat_id, order = %req.order_id, "Attaching order");

    let conversation = state
        .conversation_service
        .attach_order(&chat_id, &req.order_id)
        .await?;

    Ok(ApiResponse::ok(ConversationResponse::from(conversation)))
}

/// Soft-delete the conversation for the calling side.
async fn delete_chat(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> AppResult<ApiResponse<()>> {
    info!(user = %user.id, chat = %chat_id, "Deleting chat");

    state
        .conversation_service
        .soft_delete(&chat_id, &user.id)
        .await?;

    Ok(ApiResponse::ok(()))
}

/// Review-eligibility response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEligibilityResponse {
    pub eligible: bool,
}

/// Whether the caller may review this conversation's product.
async fn review_eligibility(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> AppResult<ApiResponse<ReviewEligibilityResponse>> {
    let eligible = state
        .conversation_service
        .review_eligibility(&chat_id, &user.id)
        .await?;

    Ok(ApiResponse::ok(ReviewEligibilityResponse { eligible }))
}
