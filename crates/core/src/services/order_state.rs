//! Order-state transition rules.
//!
//! Pure functions over the conversation row; no storage access. The services
//! run these checks before touching the database, so every rejected
//! transition carries a specific error and has no side effects. The database
//! conditional updates re-check the same predicates, which closes the window
//! between validation and write.

use souk_common::{AppError, AppResult};
use souk_db::entities::conversation;

/// Lifecycle position of the order embedded in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// No order attached; the chat is a pure product inquiry.
    NoOrder,
    /// Order attached, awaiting seller confirmation.
    Pending,
    /// Seller confirmed; awaiting buyer completion.
    Confirmed,
    /// Buyer marked the transaction complete. Terminal.
    Completed,
}

impl OrderState {
    /// Derive the state from a conversation row.
    ///
    /// The flag pairs are guarded at write time, so `order_completed` without
    /// `order_confirmed` cannot occur; the match order makes the derivation
    /// total anyway.
    #[must_use]
    pub const fn of(conversation: &conversation::Model) -> Self {
        if conversation.order_id.is_none() {
            Self::NoOrder
        } else if conversation.order_completed {
            Self::Completed
        } else if conversation.order_confirmed {
            Self::Confirmed
        } else {
            Self::Pending
        }
    }
}

/// Which side of the conversation a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    /// The role of `user_id` in this conversation, if a participant.
    #[must_use]
    pub fn of(conversation: &conversation::Model, user_id: &str) -> Option<Self> {
        if conversation.buyer_id == user_id {
            Some(Self::Buyer)
        } else if conversation.seller_id == user_id {
            Some(Self::Seller)
        } else {
            None
        }
    }
}

/// Validate the attach-order transition (system actor, no role check).
pub fn check_attach(state: OrderState) -> AppResult<()> {
    match state {
        OrderState::NoOrder => Ok(()),
        _ => Err(AppError::Conflict(
            "An order is already attached to this conversation".to_string(),
        )),
    }
}

/// Validate the confirm transition: seller only, pending orders only.
pub fn check_confirm(state: OrderState, role: Role) -> AppResult<()> {
    if role != Role::Seller {
        return Err(AppError::ForbiddenRole("seller"));
    }
    match state {
        OrderState::NoOrder => Err(AppError::NoOrder),
        OrderState::Confirmed | OrderState::Completed => Err(AppError::AlreadyConfirmed),
        OrderState::Pending => Ok(()),
    }
}

/// Validate the complete transition: buyer only, confirmed orders only.
pub fn check_complete(state: OrderState, role: Role) -> AppResult<()> {
    if role != Role::Buyer {
        return Err(AppError::ForbiddenRole("buyer"));
    }
    match state {
        OrderState::NoOrder => Err(AppError::NoOrder),
        OrderState::Pending => Err(AppError::OrderNotConfirmed),
        OrderState::Completed => Err(AppError::AlreadyCompleted),
        OrderState::Confirmed => Ok(()),
    }
}

/// The storage-free half of the review-eligibility predicate.
///
/// The existing-review half is an external lookup and is re-evaluated by the
/// conversation service on every call.
#[must_use]
pub fn review_allowed(state: OrderState, role: Role) -> bool {
    role == Role::Buyer && state == OrderState::Completed
}
