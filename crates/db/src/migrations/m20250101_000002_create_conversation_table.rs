//! Create `conversation` and `conversation_member` tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversation::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Conversation::Name).string_len(128))
                    .col(ColumnDef::new(Conversation::DirectKey).string_len(80))
                    .col(
                        ColumnDef::new(Conversation::CreatedBy)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversation::LastActivityAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Conversation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_created_by")
                            .from(Conversation::Table, Conversation::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: direct_key (one direct conversation per user pair)
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_direct_key")
                    .table(Conversation::Table)
                    .col(Conversation::DirectKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: last_activity_at (inbox ordering)
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_last_activity_at")
                    .table(Conversation::Table)
                    .col(Conversation::LastActivityAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConversationMember::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConversationMember::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ConversationMember::ConversationId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversationMember::UserId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversationMember::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_member_conversation")
                            .from(ConversationMember::Table, ConversationMember::ConversationId)
                            .to(Conversation::Table, Conversation::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_member_user")
                            .from(ConversationMember::Table, ConversationMember::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (conversation_id, user_id)
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_member_pair")
                    .table(ConversationMember::Table)
                    .col(ConversationMember::ConversationId)
                    .col(ConversationMember::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: user_id (conversations of a user)
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_member_user_id")
                    .table(ConversationMember::Table)
                    .col(ConversationMember::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConversationMember::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Conversation::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Conversation {
    Table,
    Id,
    Name,
    DirectKey,
    CreatedBy,
    LastActivityAt,
    CreatedAt,
}

#[derive(Iden)]
enum ConversationMember {
    Table,
    Id,
    ConversationId,
    UserId,
    JoinedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
