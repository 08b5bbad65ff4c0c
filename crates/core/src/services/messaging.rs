//! Messaging service: the ingest pipeline and conversation reads.
//!
//! `send_message` validates, stores media, persists and only then
//! dispatches. Live delivery failures never fail the request: the message
//! is already durable and reaches offline members through history.

use std::collections::HashMap;
use std::sync::Arc;

use alumni_common::{
    AppError, AppResult, Config, ConversationPayload, MediaKind, MessagePayload, MessagingConfig,
    StorageBackend, generate_storage_key,
};
use alumni_db::{entities::conversation, repositories::UserRepository};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use validator::Validate;

use super::event_publisher::EventPublisherService;
use super::message_store::{MessageStore, NewAttachment};

/// A media file received with a message, not yet stored.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Input for sending a message.
#[derive(Debug, Clone, Default)]
pub struct SendMessageInput {
    pub content: Option<String>,
    pub attachments: Vec<AttachmentUpload>,
}

/// Input for creating a named conversation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupInput {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    #[validate(length(min = 1, max = 100))]
    pub member_ids: Vec<String>,
}

/// Per-conversation async locks.
///
/// Holding a conversation's guard across persist and dispatch makes live
/// delivery order match submission order within that conversation.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ConversationLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a conversation.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only referenced by the table are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(conversation_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Messaging service.
#[derive(Clone)]
pub struct MessagingService {
    store: MessageStore,
    user_repo: UserRepository,
    storage: Arc<dyn StorageBackend>,
    event_publisher: Option<EventPublisherService>,
    config: MessagingConfig,
    max_attachment_size: u64,
    locks: Option<ConversationLocks>,
}

impl MessagingService {
    /// Create a new messaging service.
    #[must_use]
    pub fn new(
        store: MessageStore,
        user_repo: UserRepository,
        storage: Arc<dyn StorageBackend>,
        config: &Config,
    ) -> Self {
        let locks = config
            .messaging
            .serialize_conversation_writes
            .then(ConversationLocks::new);

        Self {
            store,
            user_repo,
            storage,
            event_publisher: None,
            config: config.messaging.clone(),
            max_attachment_size: config.storage.max_attachment_size,
            locks,
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// The underlying message store.
    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Send a message to a conversation the sender belongs to.
    pub async fn send_message(
        &self,
        sender_id: &str,
        conversation_id: &str,
        input: SendMessageInput,
    ) -> AppResult<MessagePayload> {
        let content = input.content.filter(|c| !c.trim().is_empty());
        if content.is_none() && input.attachments.is_empty() {
            return Err(AppError::Validation(
                "Message must have content or at least one attachment".to_string(),
            ));
        }
        self.validate_attachments(&input.attachments)?;

        self.ensure_member(conversation_id, sender_id).await?;

        let attachments = self.store_attachments(sender_id, &input.attachments).await?;
        let keys: Vec<String> = attachments.iter().map(|a| a.storage_key.clone()).collect();

        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(conversation_id).await),
            None => None,
        };

        let message = match self
            .store
            .create_message(conversation_id, sender_id, content, attachments)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                self.discard_uploads(&keys).await;
                return Err(e);
            }
        };

        info!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            sender_id = %sender_id,
            "Message sent"
        );

        self.publish(&message).await;

        Ok(message)
    }

    /// Full history of a conversation, oldest first. Members only.
    pub async fn get_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<Vec<MessagePayload>> {
        self.ensure_member(conversation_id, user_id).await?;
        self.store.list_messages(conversation_id).await
    }

    /// A user's conversations, most recently active first.
    pub async fn list_conversations(&self, user_id: &str) -> AppResult<Vec<ConversationPayload>> {
        self.store.conversations_for(user_id).await
    }

    /// A single conversation. Members only.
    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<ConversationPayload> {
        let conversation = self.ensure_member(conversation_id, user_id).await?;
        self.store.conversation_payload(&conversation).await
    }

    /// Open (or reopen) the direct conversation with another user.
    pub async fn start_direct_conversation(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> AppResult<ConversationPayload> {
        let other_user_id = other_user_id.trim();
        if other_user_id.is_empty() {
            return Err(AppError::Validation("otherUserId is required".to_string()));
        }
        if other_user_id == user_id {
            return Err(AppError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let other = self.user_repo.get_by_id(other_user_id).await?;
        let conversation = self
            .store
            .find_or_create_direct_conversation(user_id, &other.id)
            .await?;

        self.store.conversation_payload(&conversation).await
    }

    /// Create a named conversation with an explicit member list.
    pub async fn create_group_conversation(
        &self,
        user_id: &str,
        input: CreateGroupInput,
    ) -> AppResult<ConversationPayload> {
        input.validate()?;

        let conversation = self
            .store
            .create_group_conversation(user_id, &input.name, &input.member_ids)
            .await?;

        self.store.conversation_payload(&conversation).await
    }

    /// Non-members get the same error as for a missing conversation.
    async fn ensure_member(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<conversation::Model> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::ConversationNotFound(conversation_id.to_string()))?;

        if !self.store.is_member(conversation_id, user_id).await? {
            debug!(
                conversation_id = %conversation_id,
                user_id = %user_id,
                "Access by non-member refused"
            );
            return Err(AppError::ConversationNotFound(conversation_id.to_string()));
        }

        Ok(conversation)
    }

    fn validate_attachments(&self, attachments: &[AttachmentUpload]) -> AppResult<()> {
        if attachments.len() > self.config.max_attachments {
            return Err(AppError::Validation(format!(
                "At most {} attachments per message",
                self.config.max_attachments
            )));
        }

        for upload in attachments {
            if !self.config.is_allowed_media_type(&upload.content_type)
                || MediaKind::from_content_type(&upload.content_type).is_none()
            {
                return Err(AppError::Validation(format!(
                    "Unsupported media type: {}",
                    upload.content_type
                )));
            }
            if upload.data.is_empty() {
                return Err(AppError::Validation(format!(
                    "Attachment {} is empty",
                    upload.file_name
                )));
            }
            if upload.data.len() as u64 > self.max_attachment_size {
                return Err(AppError::Validation(format!(
                    "Attachment {} exceeds {} bytes",
                    upload.file_name, self.max_attachment_size
                )));
            }
        }

        Ok(())
    }

    async fn store_attachments(
        &self,
        sender_id: &str,
        uploads: &[AttachmentUpload],
    ) -> AppResult<Vec<NewAttachment>> {
        let mut stored: Vec<NewAttachment> = Vec::with_capacity(uploads.len());

        for upload in uploads {
            let kind = MediaKind::from_content_type(&upload.content_type).ok_or_else(|| {
                AppError::Validation(format!("Unsupported media type: {}", upload.content_type))
            })?;
            let key = generate_storage_key(sender_id, &upload.file_name);

            match self
                .storage
                .upload(&key, &upload.data, &upload.content_type)
                .await
            {
                Ok(file) => stored.push(NewAttachment {
                    kind,
                    url: file.url,
                    storage_key: file.key,
                    content_type: file.content_type,
                    size: file.size as i64,
                }),
                Err(e) => {
                    let keys: Vec<String> = stored.into_iter().map(|a| a.storage_key).collect();
                    self.discard_uploads(&keys).await;
                    return Err(e);
                }
            }
        }

        Ok(stored)
    }

    async fn discard_uploads(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                warn!(storage_key = %key, error = %e, "Failed to remove orphaned upload");
            }
        }
    }

    async fn publish(&self, message: &MessagePayload) {
        let Some(ref event_publisher) = self.event_publisher else {
            return;
        };

        let member_ids = match self.store.member_ids(&message.conversation_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to load recipients");
                return;
            }
        };

        if let Err(e) = event_publisher
            .publish_new_message(message, &member_ids)
            .await
        {
            warn!(message_id = %message.id, error = %e, "Failed to publish new message event");
        }
    }
}
