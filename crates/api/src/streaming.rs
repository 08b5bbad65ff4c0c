//! WebSocket live channel.
//!
//! `GET /streaming?token=<token>` authenticates before upgrading; an
//! unauthenticated request is refused with `401` and never upgraded. An
//! accepted channel is registered with the connection registry for its
//! whole lifetime and receives `newMessage` events as text frames. History
//! is never sent here: clients fetch it over REST after connecting.

#![allow(missing_docs)]

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use alumni_common::AppError;
use alumni_core::{ConnectionId, ConnectionRegistry};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::middleware::AppState;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Access token for authentication.
    #[serde(alias = "i")]
    pub token: Option<String>,
}

/// Unregisters a live connection when dropped.
///
/// Covers every way the socket task can end, including being aborted.
struct Registration {
    registry: ConnectionRegistry,
    user_id: String,
    connection_id: ConnectionId,
    active: bool,
}

impl Registration {
    async fn release(mut self) {
        self.active = false;
        self.registry
            .unregister(&self.user_id, self.connection_id)
            .await;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        let registry = self.registry.clone();
        let user_id = std::mem::take(&mut self.user_id);
        let connection_id = self.connection_id;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                registry.unregister(&user_id, connection_id).await;
            });
        }
    }
}

/// WebSocket handler for the live channel.
pub async fn streaming_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        debug!("Live channel refused: no token");
        return AppError::Unauthorized.into_response();
    };

    let user = match state.user_service.authenticate_by_token(&token).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Live channel refused");
            return e.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user.id, state))
}

/// Drive one accepted live channel until either side goes away.
async fn handle_socket(socket: WebSocket, user_id: String, state: AppState) {
    let (connection, mut outbound) = state.registry.open(&user_id, state.live_buffer).await;
    let registration = Registration {
        registry: state.registry.clone(),
        user_id: user_id.clone(),
        connection_id: connection.id,
        active: true,
    };

    info!(user_id = %user_id, connection_id = %connection.id, "Live channel opened");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            () = connection.shutdown_requested() => {
                // The dispatcher gave up on this connection; the client
                // reconnects and refetches history.
                debug!(user_id = %user_id, connection_id = %connection.id, "Live channel shut down");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            event = outbound.recv() => {
                let Some(event) = event else { break };
                if sender.send(Message::Text(event.to_string().into())).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(user_id = %user_id, len = text.len(), "Ignoring client frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(user_id = %user_id, error = %e, "Live channel error");
                        break;
                    }
                }
            }
        }
    }

    registration.release().await;
    info!(user_id = %user_id, connection_id = %connection.id, "Live channel closed");
}
