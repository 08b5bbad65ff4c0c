//! Database entities.

pub mod conversation;
pub mod conversation_member;
pub mod message;
pub mod message_attachment;
pub mod user;

pub use conversation::Entity as Conversation;
pub use conversation_member::Entity as ConversationMember;
pub use message::Entity as Message;
pub use message_attachment::Entity as MessageAttachment;
pub use user::Entity as User;
