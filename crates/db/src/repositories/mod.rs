//! Database repositories.

pub mod chat_message;
pub mod conversation;
pub mod notification;
pub mod review;
pub mod user;

pub use chat_message::ChatMessageRepository;
pub use conversation::ConversationRepository;
pub use notification::NotificationRepository;
pub use review::ReviewRepository;
pub use user::UserRepository;
