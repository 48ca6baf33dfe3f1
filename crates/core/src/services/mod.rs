//! Business logic services.

pub mod conversation;
pub mod event_publisher;
pub mod notification;
pub mod order_state;

pub use conversation::{ChatSummary, ConversationService, CreateMessageInput, ReviewLookup};
pub use event_publisher::{EventPublisher, EventPublisherService, NoOpEventPublisher};
pub use notification::NotificationService;
pub use order_state::{OrderState, Role};
