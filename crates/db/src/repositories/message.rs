//! Message repository.

use std::sync::Arc;

use crate::entities::{
    Conversation, Message, MessageAttachment, conversation, message, message_attachment,
};
use alumni_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait, sea_query::Expr,
};

use super::map_db_err;

/// Repository for messages and their attachments.
#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Create a new message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a message with its attachments and bump the conversation's
    /// `last_activity_at`, all in one transaction.
    pub async fn create_with_attachments(
        &self,
        model: message::ActiveModel,
        attachments: Vec<message_attachment::ActiveModel>,
    ) -> AppResult<(message::Model, Vec<message_attachment::Model>)> {
        let Some(conversation_id) = model.conversation_id.clone().take() else {
            return Err(AppError::Internal("message without conversation".to_string()));
        };

        let txn = self.db.begin().await.map_err(map_db_err)?;

        let exists = Conversation::find_by_id(conversation_id.as_str())
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .is_some();
        if !exists {
            txn.rollback().await.map_err(map_db_err)?;
            return Err(AppError::ConversationNotFound(conversation_id));
        }

        let created = model.insert(&txn).await.map_err(map_db_err)?;

        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            stored.push(attachment.insert(&txn).await.map_err(map_db_err)?);
        }

        // Never move last activity backwards
        Conversation::update_many()
            .col_expr(
                conversation::Column::LastActivityAt,
                Expr::value(created.created_at),
            )
            .filter(conversation::Column::Id.eq(created.conversation_id.as_str()))
            .filter(conversation::Column::LastActivityAt.lt(created.created_at))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        txn.commit().await.map_err(map_db_err)?;
        Ok((created, stored))
    }

    /// All messages of a conversation, oldest first.
    ///
    /// Ties on `created_at` are broken by id, which is a ULID.
    pub async fn find_by_conversation(
        &self,
        conversation_id: &str,
    ) -> AppResult<Vec<message::Model>> {
        Message::find()
            .filter(message::Column::ConversationId.eq(conversation_id))
            .order_by_asc(message::Column::CreatedAt)
            .order_by_asc(message::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Most recent message of a conversation.
    pub async fn find_latest_in_conversation(
        &self,
        conversation_id: &str,
    ) -> AppResult<Option<message::Model>> {
        Message::find()
            .filter(message::Column::ConversationId.eq(conversation_id))
            .order_by_desc(message::Column::CreatedAt)
            .order_by_desc(message::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Attachments for a set of messages.
    pub async fn find_attachments(
        &self,
        message_ids: &[String],
    ) -> AppResult<Vec<message_attachment::Model>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        MessageAttachment::find()
            .filter(message_attachment::Column::MessageId.is_in(message_ids.to_vec()))
            .order_by_asc(message_attachment::Column::CreatedAt)
            .order_by_asc(message_attachment::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::message_attachment::AttachmentKind;
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_message(id: &str, content: Option<&str>, offset_secs: i64) -> message::Model {
        message::Model {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            content: content.map(ToString::to_string),
            created_at: (Utc::now() + Duration::seconds(offset_secs)).into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_conversation() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_message("m1", Some("hi"), 0),
                    create_test_message("m2", Some("still there?"), 1),
                ]])
                .into_connection(),
        );

        let repo = MessageRepository::new(db);
        let messages = repo.find_by_conversation("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[1].content.as_deref(), Some("still there?"));
    }

    #[tokio::test]
    async fn test_find_latest_in_conversation_empty() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<message::Model>::new()])
                .into_connection(),
        );

        let repo = MessageRepository::new(db);
        assert!(repo.find_latest_in_conversation("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_attachments() {
        let attachment = message_attachment::Model {
            id: "a1".to_string(),
            message_id: "m1".to_string(),
            kind: AttachmentKind::Image,
            url: "/files/a.png".to_string(),
            storage_key: "a.png".to_string(),
            content_type: "image/png".to_string(),
            size: 3,
            created_at: Utc::now().into(),
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[attachment]])
                .into_connection(),
        );

        let repo = MessageRepository::new(db);
        let found = repo.find_attachments(&["m1".to_string()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AttachmentKind::Image);
    }
}
