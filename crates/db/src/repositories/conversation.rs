//! Conversation repository.

use std::sync::Arc;

use crate::entities::{
    Conversation, ConversationMember, User, conversation, conversation_member, user,
};
use alumni_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};

use super::map_db_err;

/// Repository for conversations and their membership rows.
#[derive(Clone)]
pub struct ConversationRepository {
    db: Arc<DatabaseConnection>,
}

impl ConversationRepository {
    /// Create a new conversation repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a conversation by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<conversation::Model>> {
        Conversation::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a conversation by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<conversation::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ConversationNotFound(id.to_string()))
    }

    /// Find the direct conversation registered under a pair key.
    pub async fn find_by_direct_key(&self, key: &str) -> AppResult<Option<conversation::Model>> {
        Conversation::find()
            .filter(conversation::Column::DirectKey.eq(key))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a conversation together with its member rows.
    ///
    /// Either everything is written or nothing is. A duplicate
    /// `direct_key` surfaces as [`AppError::Conflict`].
    pub async fn create_with_members(
        &self,
        model: conversation::ActiveModel,
        members: Vec<conversation_member::ActiveModel>,
    ) -> AppResult<conversation::Model> {
        let txn = self.db.begin().await.map_err(map_db_err)?;

        let created = model.insert(&txn).await.map_err(map_db_err)?;
        for member in members {
            member.insert(&txn).await.map_err(map_db_err)?;
        }

        txn.commit().await.map_err(map_db_err)?;
        Ok(created)
    }

    /// IDs of all members of a conversation.
    pub async fn member_ids(&self, conversation_id: &str) -> AppResult<Vec<String>> {
        ConversationMember::find()
            .select_only()
            .column(conversation_member::Column::UserId)
            .filter(conversation_member::Column::ConversationId.eq(conversation_id))
            .order_by_asc(conversation_member::Column::JoinedAt)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Users that are members of a conversation.
    pub async fn members(&self, conversation_id: &str) -> AppResult<Vec<user::Model>> {
        User::find()
            .inner_join(ConversationMember)
            .filter(conversation_member::Column::ConversationId.eq(conversation_id))
            .order_by_asc(user::Column::Username)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check whether a user belongs to a conversation.
    pub async fn is_member(&self, conversation_id: &str, user_id: &str) -> AppResult<bool> {
        let row = ConversationMember::find()
            .filter(conversation_member::Column::ConversationId.eq(conversation_id))
            .filter(conversation_member::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.is_some())
    }

    /// Conversations a user belongs to, most recently active first.
    pub async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<conversation::Model>> {
        Conversation::find()
            .inner_join(ConversationMember)
            .filter(conversation_member::Column::UserId.eq(user_id))
            .order_by_desc(conversation::Column::LastActivityAt)
            .order_by_desc(conversation::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
