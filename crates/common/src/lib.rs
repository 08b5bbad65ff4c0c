//! Common utilities and shared types for the alumni messaging backend.
//!
//! This crate provides foundational components used across all alumni crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Protocol**: JSON payloads shared by the REST API, the live channel and the client
//! - **Storage**: Attachment storage backends
//!
//! # Example
//!
//! ```no_run
//! use alumni_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Listening on {}:{} ({id})", config.server.host, config.server.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod protocol;
pub mod storage;

pub use config::{Config, MessagingConfig, StorageSettings};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use protocol::{
    AttachmentPayload, ConversationPayload, LiveEvent, MediaKind, MessagePayload, UserSummary,
};
pub use storage::{LocalStorage, StorageBackend, UploadedFile, generate_storage_key};
