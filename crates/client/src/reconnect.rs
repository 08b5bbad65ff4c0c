//! Reconnecting conversation session.
//!
//! The live channel is best-effort: anything posted while it is down is
//! never pushed. A session therefore fetches the full history on every
//! successful connect and only then applies live events, suppressing
//! events it already saw in that history. Lost channels are retried
//! forever after a fixed delay until the session is cancelled.

use std::{collections::HashSet, time::Duration};

use alumni_common::{LiveEvent, MessagePayload};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::ClientResult,
    transport::{LiveStream, LiveTransport},
};

/// Where a session is in its connect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What a session reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    State(ConnectionState),
    /// Full history, oldest first. Replaces whatever the consumer shows.
    History(Vec<MessagePayload>),
    NewMessage(MessagePayload),
}

/// Source of the catch-up fetch.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, conversation_id: &str) -> ClientResult<Vec<MessagePayload>>;
}

/// Why one connection ended.
enum Ended {
    Cancelled,
    Lost,
}

/// Keeps one conversation current across disconnects.
pub struct ConversationSession<T, H> {
    transport: T,
    history: H,
    conversation_id: String,
    reconnect_delay: Duration,
}

impl<T, H> ConversationSession<T, H>
where
    T: LiveTransport + 'static,
    H: HistorySource + 'static,
{
    pub fn new(transport: T, history: H, conversation_id: &str, reconnect_delay: Duration) -> Self {
        Self {
            transport,
            history,
            conversation_id: conversation_id.to_string(),
            reconnect_delay,
        }
    }

    /// Start the connect loop on the runtime.
    #[must_use]
    pub fn spawn(self) -> SessionHandle {
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let task = SessionTask {
            session: self,
            cancel: cancel.clone(),
            updates: updates_tx,
            state: state_tx,
        };

        SessionHandle {
            updates,
            state,
            cancel,
            task: Some(tokio::spawn(task.run())),
        }
    }
}

struct SessionTask<T, H> {
    session: ConversationSession<T, H>,
    cancel: CancellationToken,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    state: watch::Sender<ConnectionState>,
}

impl<T, H> SessionTask<T, H>
where
    T: LiveTransport + 'static,
    H: HistorySource + 'static,
{
    async fn run(self) {
        info!(conversation_id = %self.session.conversation_id, "Session started");

        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.session.transport.connect() => result,
            };

            match connected {
                Ok(events) => {
                    self.set_state(ConnectionState::Connected);
                    let ended = self.follow(events).await;
                    self.set_state(ConnectionState::Disconnected);
                    if matches!(ended, Ended::Cancelled) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        conversation_id = %self.session.conversation_id,
                        error = %e,
                        "Live channel connect failed"
                    );
                    self.set_state(ConnectionState::Disconnected);
                }
            }

            debug!(delay_ms = self.session.reconnect_delay.as_millis(), "Reconnecting after delay");
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.session.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(conversation_id = %self.session.conversation_id, "Session stopped");
    }

    /// Catch up, then apply live events until the channel goes away.
    ///
    /// Events that arrive during the fetch wait in the stream and are
    /// checked against the fetched ids, so nothing falls between the two.
    async fn follow(&self, mut events: LiveStream) -> Ended {
        let fetched = tokio::select! {
            () = self.cancel.cancelled() => return Ended::Cancelled,
            result = self.session.history.fetch_history(&self.session.conversation_id) => result,
        };

        let history = match fetched {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    conversation_id = %self.session.conversation_id,
                    error = %e,
                    "Catch-up fetch failed, dropping connection"
                );
                return Ended::Lost;
            }
        };

        let mut seen: HashSet<String> = history.iter().map(|m| m.id.clone()).collect();
        if !self.emit(SessionUpdate::History(history)) {
            return Ended::Cancelled;
        }

        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return Ended::Cancelled,
                next = events.next() => next,
            };

            match next {
                Some(Ok(LiveEvent::NewMessage { message })) => {
                    if message.conversation_id != self.session.conversation_id {
                        continue;
                    }
                    if !seen.insert(message.id.clone()) {
                        debug!(message_id = %message.id, "Already have message");
                        continue;
                    }
                    if !self.emit(SessionUpdate::NewMessage(message)) {
                        return Ended::Cancelled;
                    }
                }
                Some(Err(e)) => {
                    warn!(conversation_id = %self.session.conversation_id, error = %e, "Live channel error");
                    return Ended::Lost;
                }
                None => {
                    info!(conversation_id = %self.session.conversation_id, "Live channel closed");
                    return Ended::Lost;
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            self.emit(SessionUpdate::State(state));
        }
    }

    /// Returns `false` once nobody is listening, which ends the session.
    fn emit(&self, update: SessionUpdate) -> bool {
        if self.updates.send(update).is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }
}

/// Control side of a running session. Dropping it cancels the session.
pub struct SessionHandle {
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Next update, or `None` once the session has stopped.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Stop retrying and close any open channel.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the session task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Session task ended abnormally");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
