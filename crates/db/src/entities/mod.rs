//! SeaORM entities.

pub mod chat_message;
pub mod conversation;
pub mod notification;
pub mod review;
pub mod user;

pub use chat_message::Entity as ChatMessage;
pub use conversation::Entity as Conversation;
pub use notification::Entity as Notification;
pub use review::Entity as Review;
pub use user::Entity as User;
