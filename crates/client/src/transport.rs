//! Live channel transport.

use alumni_common::LiveEvent;
use async_trait::async_trait;
use futures::{StreamExt, future, stream::BoxStream};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

use crate::{config::ClientConfig, error::ClientResult};

/// Decoded events of one open live channel. The stream ends when the
/// channel closes; dropping it closes the channel.
pub type LiveStream = BoxStream<'static, ClientResult<LiveEvent>>;

/// Opens live channels.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a new channel. Fails if the server refuses it.
    async fn connect(&self) -> ClientResult<LiveStream>;
}

/// WebSocket transport authenticating with the token in the query string.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            url: config.streaming_url()?,
        })
    }
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn connect(&self) -> ClientResult<LiveStream> {
        let (socket, _response) = connect_async(self.url.as_str()).await?;
        debug!(host = ?self.url.host_str(), "Live channel connected");

        let events = socket
            .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
            .filter_map(|frame| {
                future::ready(match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<LiveEvent>(text.as_str()) {
                        Ok(event) => Some(Ok(event)),
                        Err(e) => {
                            debug!(error = %e, "Skipping unrecognized live event");
                            None
                        }
                    },
                    Ok(_) => None,
                    Err(e) => Some(Err(e.into())),
                })
            });

        Ok(events.boxed())
    }
}
