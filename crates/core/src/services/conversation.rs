//! Conversation service: the chat+order aggregate.
//!
//! Every mutation goes through a guarded path here; no raw field writes
//! escape the service. Transition checks run in [`order_state`] first, then
//! the repository's conditional update re-checks the same predicate, so two
//! racing clients cannot both win a transition. Each successful transition
//! emits exactly one live event and at most one notification; failures after
//! the commit are logged and never rolled back.

use crate::services::event_publisher::EventPublisherService;
use crate::services::notification::NotificationService;
use crate::services::order_state::{self, OrderState, Role};
use async_trait::async_trait;
use chrono::Utc;
use souk_common::{
    AppError, AppResult, ConversationPayload, IdGenerator, LiveEvent, MessagePayload,
    OrderStatePayload,
};
use souk_db::{
    entities::{
        chat_message::{self, MessageType},
        conversation,
        notification::NotificationType,
        user,
    },
    repositories::{
        ChatMessageRepository, ConversationRepository, ReviewRepository, UserRepository,
    },
};
use sea_orm::Set;
use std::sync::Arc;

/// Lookup into the external review subsystem.
///
/// Re-evaluated on every eligibility call; the external side owns the writes
/// so the answer is never cached here.
#[async_trait]
pub trait ReviewLookup: Send + Sync {
    /// Whether the user already reviewed this product/order pair.
    async fn has_review(&self, user_id: &str, product_id: &str, order_id: &str)
    -> AppResult<bool>;
}

#[async_trait]
impl ReviewLookup for ReviewRepository {
    async fn has_review(
        &self,
        user_id: &str,
        product_id: &str,
        order_id: &str,
    ) -> AppResult<bool> {
        self.exists(user_id, product_id, order_id).await
    }
}

/// Input for sending a message.
pub struct CreateMessageInput {
    pub content: String,
    pub message_type: MessageType,
    /// The chat the receiver is currently viewing, when known. Suppresses
    /// the message notification for that chat; the live event still fires.
    pub active_chat: Option<String>,
}

/// One entry of a user's conversation list.
pub struct ChatSummary {
    pub conversation: conversation::Model,
    pub counterparty_id: String,
    pub counterparty_username: String,
    pub last_message: Option<chat_message::Model>,
    pub unread_count: u64,
}

fn order_snapshot(conv: &conversation::Model) -> OrderStatePayload {
    OrderStatePayload {
        chat_id: conv.id.clone(),
        order_id: conv.order_id.clone(),
        order_confirmed: conv.order_confirmed,
        order_confirmed_at: conv.order_confirmed_at.map(|t| t.to_utc()),
        order_completed: conv.order_completed,
        completed_at: conv.completed_at.map(|t| t.to_utc()),
    }
}

fn conversation_payload(conv: &conversation::Model) -> ConversationPayload {
    ConversationPayload {
        id: conv.id.clone(),
        buyer_id: conv.buyer_id.clone(),
        seller_id: conv.seller_id.clone(),
        product_id: conv.product_id.clone(),
        order_id: conv.order_id.clone(),
        order_confirmed: conv.order_confirmed,
        order_confirmed_at: conv.order_confirmed_at.map(|t| t.to_utc()),
        order_completed: conv.order_completed,
        completed_at: conv.completed_at.map(|t| t.to_utc()),
        deleted_by_buyer: conv.deleted_by_buyer,
        deleted_by_seller: conv.deleted_by_seller,
        is_active: conv.is_active,
        updated_at: conv.updated_at.to_utc(),
    }
}

fn message_payload(msg: &chat_message::Model) -> MessagePayload {
    MessagePayload {
        id: msg.id.clone(),
        chat_id: msg.chat_id.clone(),
        sender_id: msg.sender_id.clone(),
        receiver_id: msg.receiver_id.clone(),
        content: msg.content.clone(),
        message_type: msg.message_type.as_str().to_string(),
        is_read: msg.is_read,
        created_at: msg.created_at.to_utc(),
    }
}

/// Conversation service.
#[derive(Clone)]
pub struct ConversationService {
    conversation_repo: ConversationRepository,
    message_repo: ChatMessageRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
    reviews: Arc<dyn ReviewLookup>,
    event_publisher: Option<EventPublisherService>,
    id_gen: IdGenerator,
}

impl ConversationService {
    /// Create a new conversation service.
    #[must_use]
    pub fn new(
        conversation_repo: ConversationRepository,
        message_repo: ChatMessageRepository,
        user_repo: UserRepository,
        notifications: NotificationService,
        reviews: Arc<dyn ReviewLookup>,
    ) -> Self {
        Self {
            conversation_repo,
            message_repo,
            user_repo,
            notifications,
            reviews,
            event_publisher: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    async fn publish_to_chat(&self, chat_id: &str, event: LiveEvent) {
        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher.publish_to_chat(chat_id, event).await {
                tracing::warn!(error = %e, chat_id, "Failed to publish chat event");
            }
        }
    }

    async fn notify_quietly(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        title: &str,
        body: &str,
        action_url: Option<String>,
    ) {
        if let Err(e) = self
            .notifications
            .notify(user_id, notification_type, title, body, action_url)
            .await
        {
            tracing::warn!(error = %e, user_id, "Failed to create notification");
        }
    }

    /// Fetch a conversation for one of its participants, failing closed with
    /// a generic not-found for strangers.
    async fn find_for_participant(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> AppResult<conversation::Model> {
        self.conversation_repo
            .find_by_id(chat_id)
            .await?
            .filter(|c| c.is_participant(user_id))
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {chat_id}")))
    }

    /// Whether the user may observe a conversation's live room.
    ///
    /// Participants may; admins may observe any room (but never mutate
    /// order state, which stays behind the role checks).
    pub async fn can_observe(&self, chat_id: &str, user: &user::Model) -> AppResult<bool> {
        Ok(self
            .conversation_repo
            .find_by_id(chat_id)
            .await?
            .is_some_and(|c| user.is_admin || c.is_participant(&user.id)))
    }

    /// Return the active conversation for the (buyer, seller, product)
    /// triple, creating it when absent.
    ///
    /// A concurrent create races on the partial unique index; the loser's
    /// insert fails and falls back to the winner's row.
    pub async fn create_or_get(
        &self,
        buyer_id: &str,
        seller_id: &str,
        product_id: &str,
        order_id: Option<&str>,
    ) -> AppResult<conversation::Model> {
        if buyer_id == seller_id {
            return Err(AppError::BadRequest(
                "Cannot open a chat with yourself".to_string(),
            ));
        }

        self.user_repo
            .find_by_id(seller_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User not found: {seller_id}")))?;

        if let Some(existing) = self
            .conversation_repo
            .find_active_by_triple(buyer_id, seller_id, product_id)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let model = conversation::ActiveModel {
            id: Set(self.id_gen.generate()),
            buyer_id: Set(buyer_id.to_string()),
            seller_id: Set(seller_id.to_string()),
            product_id: Set(product_id.to_string()),
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
        };

        let conversation = match self.conversation_repo.create(model).await {
            Ok(c) => c,
            Err(e) => {
                // Unique-index race: a concurrent call created the row.
                if let Some(winner) = self
                    .conversation_repo
                    .find_active_by_triple(buyer_id, seller_id, product_id)
                    .await?
                {
                    return Ok(winner);
                }
                return Err(e);
            }
        };

        if conversation.order_id.is_some() {
            self.notify_quietly(
                seller_id,
                NotificationType::OrderPlaced,
                "New order",
                "An order was placed in one of your chats",
                Some(format!("/chats/{}", conversation.id)),
            )
            .await;
        }

        Ok(conversation)
    }

    /// Attach an external order to an order-less conversation.
    ///
    /// System transition invoked by the checkout flow, so there is no actor
    /// role check.
    pub async fn attach_order(
        &self,
        chat_id: &str,
        order_id: &str,
    ) -> AppResult<conversation::Model> {
        let conv = self
            .conversation_repo
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {chat_id}")))?;

        order_state::check_attach(OrderState::of(&conv))?;

        let now = Utc::now().into();
        let rows = self
            .conversation_repo
            .attach_order(chat_id, order_id, now)
            .await?;
        if rows == 0 {
            return Err(AppError::Conflict(
                "An order is already attached to this conversation".to_string(),
            ));
        }

        let mut updated = conv;
        updated.order_id = Some(order_id.to_string());
        updated.updated_at = now;

        self.publish_to_chat(
            chat_id,
            LiveEvent::OrderStateChanged(order_snapshot(&updated)),
        )
        .await;

        self.notify_quietly(
            &updated.seller_id,
            NotificationType::OrderPlaced,
            "New order",
            "An order was placed in one of your chats",
            Some(format!("/chats/{chat_id}")),
        )
        .await;

        Ok(updated)
    }

    /// Append a message to a conversation.
    pub async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        input: CreateMessageInput,
    ) -> AppResult<chat_message::Model> {
        if input.content.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Message content must not be empty".to_string(),
            ));
        }

        let conv = self.find_for_participant(chat_id, sender_id).await?;

        if !conv.is_active || conv.is_deleted_by(sender_id) {
            return Err(AppError::ChatInactive);
        }

        let receiver_id = conv
            .counterparty(sender_id)
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {chat_id}")))?
            .to_string();

        let now = Utc::now();
        let model = chat_message::ActiveModel {
            id: Set(self.id_gen.generate()),
            chat_id: Set(chat_id.to_string()),
            sender_id: Set(sender_id.to_string()),
            receiver_id: Set(receiver_id.clone()),
            content: Set(input.content),
            message_type: Set(input.message_type),
            is_read: Set(false),
            created_at: Set(now.into()),
        };

        let message = self.message_repo.create(model).await?;
        self.conversation_repo.touch(chat_id, now.into()).await?;

        let receiver_is_viewing = input.active_chat.as_deref() == Some(chat_id);
        if !receiver_is_viewing {
            self.notify_quietly(
                &receiver_id,
                NotificationType::MessageReceived,
                "New message",
                "You have a new message",
                Some(format!("/chats/{chat_id}")),
            )
            .await;
        }

        self.publish_to_chat(
            chat_id,
            LiveEvent::MessageCreated {
                chat_id: chat_id.to_string(),
                message: message_payload(&message),
            },
        )
        .await;

        Ok(message)
    }

    /// Message history, newest first.
    pub async fn get_messages(
        &self,
        chat_id: &str,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<chat_message::Model>> {
        self.find_for_participant(chat_id, user_id).await?;
        self.message_repo.find_by_chat(chat_id, limit, until_id).await
    }

    /// Seller confirms the pending order.
    pub async fn confirm_order(
        &self,
        chat_id: &str,
        actor_id: &str,
    ) -> AppResult<conversation::Model> {
        let conv = self.find_for_participant(chat_id, actor_id).await?;
        let role = Role::of(&conv, actor_id)
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {chat_id}")))?;

        order_state::check_confirm(OrderState::of(&conv), role)?;

        let now = Utc::now().into();
        let rows = self.conversation_repo.confirm_order(chat_id, now).await?;
        if rows == 0 {
            // A concurrent confirm won between validation and write.
            return Err(AppError::AlreadyConfirmed);
        }

        let mut updated = conv;
        updated.order_confirmed = true;
        updated.order_confirmed_at = Some(now);
        updated.updated_at = now;

        self.publish_to_chat(
            chat_id,
            LiveEvent::OrderStateChanged(order_snapshot(&updated)),
        )
        .await;

        self.notify_quietly(
            &updated.buyer_id,
            NotificationType::OrderConfirmed,
            "Order confirmed",
            "The seller confirmed your order",
            Some(format!("/chats/{chat_id}")),
        )
        .await;

        Ok(updated)
    }

    /// Buyer marks the confirmed order complete.
    pub async fn complete_order(
        &self,
        chat_id: &str,
        actor_id: &str,
    ) -> AppResult<conversation::Model> {
        let conv = self.find_for_participant(chat_id, actor_id).await?;
        let role = Role::of(&conv, actor_id)
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {chat_id}")))?;

        order_state::check_complete(OrderState::of(&conv), role)?;

        let now = Utc::now().into();
        let rows = self.conversation_repo.complete_order(chat_id, now).await?;
        if rows == 0 {
            return Err(AppError::AlreadyCompleted);
        }

        let mut updated = conv;
        updated.order_completed = true;
        updated.completed_at = Some(now);
        updated.updated_at = now;

        self.publish_to_chat(
            chat_id,
            LiveEvent::OrderStateChanged(order_snapshot(&updated)),
        )
        .await;

        self.notify_quietly(
            &updated.seller_id,
            NotificationType::OrderCompleted,
            "Order completed",
            "The buyer marked the order as complete",
            Some(format!("/chats/{chat_id}")),
        )
        .await;

        Ok(updated)
    }

    /// Mark the listed messages read for the reader.
    ///
    /// Only rows where the reader is the receiver flip; a sender cannot mark
    /// their own messages read on the other side's behalf.
    pub async fn mark_read(
        &self,
        chat_id: &str,
        reader_id: &str,
        message_ids: &[String],
    ) -> AppResult<u64> {
        self.find_for_participant(chat_id, reader_id).await?;
        self.message_repo
            .mark_read(chat_id, message_ids, reader_id)
            .await
    }

    /// Soft-delete the conversation for one side.
    ///
    /// Closes the conversation; once both sides have deleted, the row and
    /// its messages are purged in one transaction. The flag write is a
    /// compare-and-set, so a repeated delete from the same side is a no-op
    /// with no second round of side effects, and the purge decision comes
    /// from the row as written: the fetched copy may be stale when the
    /// counterparty deletes concurrently.
    pub async fn soft_delete(&self, chat_id: &str, actor_id: &str) -> AppResult<()> {
        let conv = self.find_for_participant(chat_id, actor_id).await?;
        let buyer_side = conv.buyer_id == actor_id;

        let now = Utc::now().into();
        let rows = self
            .conversation_repo
            .set_delete_flag(chat_id, buyer_side, now)
            .await?;
        if rows == 0 {
            return Ok(());
        }

        let Some(current) = self.conversation_repo.find_by_id(chat_id).await? else {
            // A concurrent delete raced ahead and already purged the row.
            return Ok(());
        };

        if current.deleted_by_buyer && current.deleted_by_seller {
            self.conversation_repo.purge(chat_id).await?;
        } else if let Some(counterparty) = current.counterparty(actor_id) {
            self.notify_quietly(
                counterparty,
                NotificationType::ChatClosed,
                "Conversation closed",
                "The other party closed the conversation",
                Some(format!("/chats/{chat_id}")),
            )
            .await;
        }

        self.publish_to_chat(
            chat_id,
            LiveEvent::ChatUpdated {
                chat_id: chat_id.to_string(),
                conversation: conversation_payload(&current),
            },
        )
        .await;

        Ok(())
    }

    /// The user's conversation list, newest activity first, with the
    /// counterparty, last message and unread count for each entry.
    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<ChatSummary>> {
        let conversations = self.conversation_repo.find_for_user(user_id).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conv in conversations {
            let Some(counterparty_id) = conv.counterparty(user_id).map(ToString::to_string)
            else {
                continue;
            };

            if let Some(counterparty) = self.user_repo.find_by_id(&counterparty_id).await? {
                let last_message = self
                    .message_repo
                    .find_by_chat(&conv.id, 1, None)
                    .await?
                    .into_iter()
                    .next();

                let unread_count = self.message_repo.count_unread_in(&conv.id, user_id).await?;

                summaries.push(ChatSummary {
                    conversation: conv,
                    counterparty_id,
                    counterparty_username: counterparty.username,
                    last_message,
                    unread_count,
                });
            }
        }

        Ok(summaries)
    }

    /// Whether the user may review the product of this conversation.
    ///
    /// Buyer only, completed orders only, and never twice: the existing-
    /// review check goes to the external subsystem on every call.
    pub async fn review_eligibility(&self, chat_id: &str, user_id: &str) -> AppResult<bool> {
        let conv = self.find_for_participant(chat_id, user_id).await?;
        let Some(role) = Role::of(&conv, user_id) else {
            return Ok(false);
        };

        if !order_state::review_allowed(OrderState::of(&conv), role) {
            return Ok(false);
        }

        let Some(order_id) = conv.order_id.as_deref() else {
            return Ok(false);
        };

        let already = self
            .reviews
            .has_review(user_id, &conv.product_id, order_id)
            .await?;
        Ok(!already)
    }
}
