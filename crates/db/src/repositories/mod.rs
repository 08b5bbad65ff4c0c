//! Repositories over the messaging tables.

mod conversation;
mod message;
mod user;

pub use conversation::ConversationRepository;
pub use message::MessageRepository;
pub use user::UserRepository;

use alumni_common::AppError;
use sea_orm::{DbErr, SqlErr};

/// Map a database error, turning unique-constraint violations into
/// [`AppError::Conflict`] so callers can react to lost insert races.
pub(crate) fn map_db_err(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => AppError::Conflict(detail),
        _ => AppError::Database(err.to_string()),
    }
}
