//! Conversation entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Display name (NULL = direct 1:1 conversation)
    #[sea_orm(nullable)]
    pub name: Option<String>,

    /// Order-independent member pair key, set only for direct conversations.
    /// Unique, so concurrent first contact cannot create two rows.
    #[sea_orm(unique, nullable)]
    pub direct_key: Option<String>,

    /// User who created the conversation
    pub created_by: String,

    /// Bumped on every new message; drives inbox ordering
    #[sea_orm(indexed)]
    pub last_activity_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether this is a direct (1:1) conversation.
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        self.direct_key.is_some()
    }
}

/// Build the direct-conversation key for an unordered pair of users.
#[must_use]
pub fn direct_key(user_a: &str, user_b: &str) -> String {
    if user_a <= user_b {
        format!("{user_a}:{user_b}")
    } else {
        format!("{user_b}:{user_a}")
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::conversation_member::Entity")]
    Members,

    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::conversation_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
