//! Client for the alumni messaging backend.
//!
//! - **API**: REST calls through [`ApiClient`]
//! - **Transport**: the WebSocket live channel through [`WsTransport`]
//! - **Reconnect**: [`ConversationSession`], which keeps a conversation view
//!   current across disconnects with a fixed-delay retry loop and a
//!   catch-up history fetch on every connect
//!
//! ```no_run
//! use alumni_client::{AlumniClient, ClientConfig, SessionUpdate};
//!
//! # async fn example() -> alumni_client::ClientResult<()> {
//! let client = AlumniClient::new(ClientConfig::new("http://localhost:3000", "token")?)?;
//! let mut session = client.open_conversation("01J...");
//! while let Some(update) = session.next_update().await {
//!     if let SessionUpdate::NewMessage(message) = update {
//!         println!("{}: {:?}", message.sender_id, message.content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod reconnect;
pub mod transport;

pub use api::{ApiClient, Credentials, MediaUpload, sign_in, sign_up};
pub use config::{ClientConfig, DEFAULT_RECONNECT_DELAY};
pub use error::{ClientError, ClientResult};
pub use reconnect::{
    ConnectionState, ConversationSession, HistorySource, SessionHandle, SessionUpdate,
};
pub use transport::{LiveStream, LiveTransport, WsTransport};

/// REST client and live transport sharing one configuration.
#[derive(Clone)]
pub struct AlumniClient {
    api: ApiClient,
    transport: WsTransport,
    reconnect_delay: std::time::Duration,
}

impl AlumniClient {
    /// Create a client for the configured server and token.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            api: ApiClient::new(config.clone())?,
            transport: WsTransport::new(&config)?,
            reconnect_delay: config.reconnect_delay,
        })
    }

    /// REST API access.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Follow one conversation: history on every connect, live messages in
    /// between, reconnecting until the returned handle is cancelled.
    #[must_use]
    pub fn open_conversation(&self, conversation_id: &str) -> SessionHandle {
        ConversationSession::new(
            self.transport.clone(),
            self.api.clone(),
            conversation_id,
            self.reconnect_delay,
        )
        .spawn()
    }
}
