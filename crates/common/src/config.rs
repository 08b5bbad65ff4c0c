//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Attachment storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Messaging and live delivery configuration.
    #[serde(default)]
    pub messaging: MessagingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Local attachment storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory uploaded files are written to.
    #[serde(default = "default_storage_path")]
    pub base_path: PathBuf,
    /// URL prefix the files are served under.
    #[serde(default = "default_storage_url")]
    pub base_url: String,
    /// Maximum size of a single attachment in bytes.
    #[serde(default = "default_max_attachment_size")]
    pub max_attachment_size: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            base_url: default_storage_url(),
            max_attachment_size: default_max_attachment_size(),
        }
    }
}

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Maximum number of media parts on one message.
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
    /// MIME types accepted as message attachments.
    #[serde(default = "default_allowed_media_types")]
    pub allowed_media_types: Vec<String>,
    /// Push new messages to the sender's own live connections as well.
    #[serde(default)]
    pub echo_to_sender: bool,
    /// Serialize persist-then-dispatch per conversation.
    #[serde(default)]
    pub serialize_conversation_writes: bool,
    /// Outbound event queue size of one live connection.
    #[serde(default = "default_live_buffer")]
    pub live_buffer: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_attachments: default_max_attachments(),
            allowed_media_types: default_allowed_media_types(),
            echo_to_sender: false,
            serialize_conversation_writes: false,
            live_buffer: default_live_buffer(),
        }
    }
}

impl MessagingConfig {
    /// Whether the given content type may be attached to a message.
    #[must_use]
    pub fn is_allowed_media_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_media_types.iter().any(|t| *t == essence)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./files")
}

fn default_storage_url() -> String {
    "/files".to_string()
}

const fn default_max_attachment_size() -> u64 {
    50 * 1024 * 1024
}

const fn default_max_attachments() -> usize {
    10
}

fn default_allowed_media_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "video/mp4",
        "video/quicktime",
        "video/webm",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

const fn default_live_buffer() -> usize {
    64
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `ALUMNI_ENV`)
    /// 3. Environment variables with `ALUMNI_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("ALUMNI_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("ALUMNI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("ALUMNI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
