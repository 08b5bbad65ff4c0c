//! Business logic services.

#![allow(missing_docs)]

pub mod connection_registry;
pub mod delivery;
pub mod event_publisher;
pub mod message_store;
pub mod messaging;
pub mod user;

pub use connection_registry::{ConnectionId, ConnectionRegistry, LiveConnection, PushError};
pub use delivery::{DeliveryDispatcher, DispatchReport, EchoPolicy};
pub use event_publisher::{EventPublisher, EventPublisherService, NoOpEventPublisher};
pub use message_store::{MessageStore, NewAttachment, user_summary};
pub use messaging::{
    AttachmentUpload, ConversationLocks, CreateGroupInput, MessagingService, SendMessageInput,
};
pub use user::{CreateUserInput, UserService};
