//! Durable record of conversations and their messages.
//!
//! Wraps the conversation, message and user repositories and hands out
//! fully populated wire payloads (sender summary and attachments included),
//! so every reader of history sees the same shape the live channel pushes.

use std::collections::HashMap;
use std::sync::Arc;

use alumni_common::{
    AppError, AppResult, AttachmentPayload, ConversationPayload, IdGenerator, MediaKind,
    MessagePayload, UserSummary,
};
use alumni_db::{
    entities::{conversation, conversation_member, message, message_attachment, user},
    repositories::{ConversationRepository, MessageRepository, UserRepository},
};
use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use tracing::{debug, info};

/// Maximum length of a group conversation name.
const MAX_GROUP_NAME_LEN: usize = 128;

/// An attachment that has already been written to storage.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub kind: MediaKind,
    pub url: String,
    pub storage_key: String,
    pub content_type: String,
    pub size: i64,
}

/// Message store.
#[derive(Clone)]
pub struct MessageStore {
    user_repo: UserRepository,
    conversation_repo: ConversationRepository,
    message_repo: MessageRepository,
    id_gen: IdGenerator,
}

impl MessageStore {
    /// Create a new message store.
    #[must_use]
    pub const fn new(
        user_repo: UserRepository,
        conversation_repo: ConversationRepository,
        message_repo: MessageRepository,
    ) -> Self {
        Self {
            user_repo,
            conversation_repo,
            message_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a store with repositories sharing one connection.
    #[must_use]
    pub fn from_connection(db: Arc<DatabaseConnection>) -> Self {
        Self::new(
            UserRepository::new(db.clone()),
            ConversationRepository::new(db.clone()),
            MessageRepository::new(db),
        )
    }

    /// Persist a message and its attachments.
    ///
    /// Blank content counts as no content; a message with neither content
    /// nor attachments is rejected before touching the database. The
    /// conversation's last activity is bumped in the same transaction.
    pub async fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: Option<String>,
        attachments: Vec<NewAttachment>,
    ) -> AppResult<MessagePayload> {
        let content = normalize_content(content);
        if content.is_none() && attachments.is_empty() {
            return Err(AppError::Validation(
                "Message must have content or at least one attachment".to_string(),
            ));
        }

        let now = Utc::now();
        let message_id = self.id_gen.generate();

        let model = message::ActiveModel {
            id: Set(message_id.clone()),
            conversation_id: Set(conversation_id.to_string()),
            sender_id: Set(sender_id.to_string()),
            content: Set(content),
            created_at: Set(now.into()),
        };

        let attachment_models = attachments
            .into_iter()
            .map(|a| message_attachment::ActiveModel {
                id: Set(self.id_gen.generate()),
                message_id: Set(message_id.clone()),
                kind: Set(a.kind.into()),
                url: Set(a.url),
                storage_key: Set(a.storage_key),
                content_type: Set(a.content_type),
                size: Set(a.size),
                created_at: Set(now.into()),
            })
            .collect();

        let (created, stored) = self
            .message_repo
            .create_with_attachments(model, attachment_models)
            .await?;

        debug!(
            message_id = %created.id,
            conversation_id = %conversation_id,
            sender_id = %sender_id,
            attachments = stored.len(),
            "Message stored"
        );

        let sender = self.user_repo.find_by_id(sender_id).await?;
        Ok(message_payload(
            &created,
            sender.as_ref().map(user_summary),
            stored.iter().map(attachment_payload).collect(),
        ))
    }

    /// Full history of a conversation, oldest first.
    pub async fn list_messages(&self, conversation_id: &str) -> AppResult<Vec<MessagePayload>> {
        let messages = self.message_repo.find_by_conversation(conversation_id).await?;
        self.populate(messages).await
    }

    /// The direct conversation between two users, created on first contact.
    ///
    /// The pair is unordered: `(a, b)` and `(b, a)` resolve to the same
    /// conversation. A concurrent first contact that loses the insert race
    /// returns the winner's conversation.
    pub async fn find_or_create_direct_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> AppResult<conversation::Model> {
        if user_a == user_b {
            return Err(AppError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let key = conversation::direct_key(user_a, user_b);
        if let Some(existing) = self.conversation_repo.find_by_direct_key(&key).await? {
            return Ok(existing);
        }

        self.insert_direct_conversation(&key, user_a, user_b).await
    }

    /// Insert the direct conversation for `key`, or return the one a
    /// concurrent caller inserted first.
    async fn insert_direct_conversation(
        &self,
        key: &str,
        user_a: &str,
        user_b: &str,
    ) -> AppResult<conversation::Model> {
        let now = Utc::now();
        let conversation_id = self.id_gen.generate();
        let model = conversation::ActiveModel {
            id: Set(conversation_id.clone()),
            name: Set(None),
            direct_key: Set(Some(key.to_string())),
            created_by: Set(user_a.to_string()),
            last_activity_at: Set(now.into()),
            created_at: Set(now.into()),
        };
        let members = vec![
            self.member_model(&conversation_id, user_a),
            self.member_model(&conversation_id, user_b),
        ];

        match self.conversation_repo.create_with_members(model, members).await {
            Ok(created) => {
                info!(conversation_id = %created.id, "Direct conversation created");
                Ok(created)
            }
            Err(AppError::Conflict(_)) => {
                debug!(direct_key = %key, "Direct conversation created concurrently");
                self.conversation_repo
                    .find_by_direct_key(key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!("Direct conversation {key} vanished"))
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Create a named conversation with an explicit member list.
    ///
    /// The creator is always a member and duplicate ids are collapsed.
    pub async fn create_group_conversation(
        &self,
        creator_id: &str,
        name: &str,
        member_ids: &[String],
    ) -> AppResult<conversation::Model> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_GROUP_NAME_LEN {
            return Err(AppError::Validation(format!(
                "Conversation name must be 1 to {MAX_GROUP_NAME_LEN} characters"
            )));
        }

        let mut members = vec![creator_id.to_string()];
        for id in member_ids {
            let id = id.trim();
            if !id.is_empty() && !members.iter().any(|m| m == id) {
                members.push(id.to_string());
            }
        }
        if members.len() < 2 {
            return Err(AppError::Validation(
                "A conversation needs at least one other member".to_string(),
            ));
        }

        let users = self.user_repo.find_by_ids(&members).await?;
        if let Some(missing) = members.iter().find(|id| !users.iter().any(|u| &u.id == *id)) {
            return Err(AppError::UserNotFound(missing.clone()));
        }

        let now = Utc::now();
        let conversation_id = self.id_gen.generate();
        let model = conversation::ActiveModel {
            id: Set(conversation_id.clone()),
            name: Set(Some(name.to_string())),
            direct_key: Set(None),
            created_by: Set(creator_id.to_string()),
            last_activity_at: Set(now.into()),
            created_at: Set(now.into()),
        };
        let member_models = members
            .iter()
            .map(|id| self.member_model(&conversation_id, id))
            .collect();

        let created = self
            .conversation_repo
            .create_with_members(model, member_models)
            .await?;

        info!(
            conversation_id = %created.id,
            members = members.len(),
            "Group conversation created"
        );
        Ok(created)
    }

    /// Find a conversation by ID.
    pub async fn get_conversation(&self, id: &str) -> AppResult<Option<conversation::Model>> {
        self.conversation_repo.find_by_id(id).await
    }

    /// IDs of the members of a conversation.
    pub async fn member_ids(&self, conversation_id: &str) -> AppResult<Vec<String>> {
        self.conversation_repo.member_ids(conversation_id).await
    }

    /// Whether a user is a member of a conversation.
    pub async fn is_member(&self, conversation_id: &str, user_id: &str) -> AppResult<bool> {
        self.conversation_repo.is_member(conversation_id, user_id).await
    }

    /// A user's conversations, most recently active first, each with its
    /// members and latest message.
    pub async fn conversations_for(&self, user_id: &str) -> AppResult<Vec<ConversationPayload>> {
        let conversations = self.conversation_repo.find_for_user(user_id).await?;

        let mut payloads = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            payloads.push(self.conversation_payload(conversation).await?);
        }
        Ok(payloads)
    }

    /// Populate a conversation with its members and latest message.
    pub async fn conversation_payload(
        &self,
        conversation: &conversation::Model,
    ) -> AppResult<ConversationPayload> {
        let members = self.conversation_repo.members(&conversation.id).await?;

        let last_message = match self
            .message_repo
            .find_latest_in_conversation(&conversation.id)
            .await?
        {
            Some(latest) => self.populate(vec![latest]).await?.pop(),
            None => None,
        };

        Ok(ConversationPayload {
            id: conversation.id.clone(),
            name: conversation.name.clone(),
            is_direct: conversation.is_direct(),
            members: members.iter().map(user_summary).collect(),
            last_message,
            last_activity_at: conversation.last_activity_at.with_timezone(&Utc),
            created_at: conversation.created_at.with_timezone(&Utc),
        })
    }

    /// Attach senders and attachments to stored messages, keeping order.
    async fn populate(&self, messages: Vec<message::Model>) -> AppResult<Vec<MessagePayload>> {
        if messages.is_empty() {
            return Ok(vec![]);
        }

        let message_ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        let mut attachments: HashMap<String, Vec<AttachmentPayload>> = HashMap::new();
        for attachment in self.message_repo.find_attachments(&message_ids).await? {
            attachments
                .entry(attachment.message_id.clone())
                .or_default()
                .push(attachment_payload(&attachment));
        }

        let mut sender_ids: Vec<String> = messages.iter().map(|m| m.sender_id.clone()).collect();
        sender_ids.sort();
        sender_ids.dedup();
        let senders: HashMap<String, UserSummary> = self
            .user_repo
            .find_by_ids(&sender_ids)
            .await?
            .iter()
            .map(|u| (u.id.clone(), user_summary(u)))
            .collect();

        Ok(messages
            .iter()
            .map(|m| {
                message_payload(
                    m,
                    senders.get(&m.sender_id).cloned(),
                    attachments.remove(&m.id).unwrap_or_default(),
                )
            })
            .collect())
    }

    fn member_model(&self, conversation_id: &str, user_id: &str) -> conversation_member::ActiveModel {
        conversation_member::ActiveModel {
            id: Set(self.id_gen.generate()),
            conversation_id: Set(conversation_id.to_string()),
            user_id: Set(user_id.to_string()),
            joined_at: Set(Utc::now().into()),
        }
    }
}

/// Treat whitespace-only content as absent.
fn normalize_content(content: Option<String>) -> Option<String> {
    content.filter(|c| !c.trim().is_empty())
}

/// Public view of a user.
#[must_use]
pub fn user_summary(user: &user::Model) -> UserSummary {
    UserSummary {
        id: user.id.clone(),
        username: user.username.clone(),
        name: user.name.clone(),
        avatar_url: user.avatar_url.clone(),
    }
}

fn attachment_payload(attachment: &message_attachment::Model) -> AttachmentPayload {
    AttachmentPayload {
        id: attachment.id.clone(),
        kind: attachment.kind.into(),
        url: attachment.url.clone(),
        content_type: attachment.content_type.clone(),
        size: attachment.size,
    }
}

fn message_payload(
    message: &message::Model,
    sender: Option<UserSummary>,
    attachments: Vec<AttachmentPayload>,
) -> MessagePayload {
    MessagePayload {
        id: message.id.clone(),
        conversation_id: message.conversation_id.clone(),
        sender_id: message.sender_id.clone(),
        sender,
        content: message.content.clone(),
        attachments,
        created_at: message.created_at.with_timezone(&Utc),
    }
}
