//! Live delivery of new messages.
//!
//! Delivery is best-effort and at-most-once per connection: the event is
//! serialized once, queued on every live connection of every recipient,
//! and never retried. Recipients without a live connection are counted as
//! missed and pick the message up on their next history fetch. A
//! connection that cannot take the event is shut down and unregistered,
//! so its client reconnects and catches up from history instead of
//! silently missing the message.

use std::collections::HashSet;
use std::sync::Arc;

use alumni_common::{AppError, AppResult, LiveEvent, MessagePayload};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::connection_registry::ConnectionRegistry;
use super::event_publisher::EventPublisher;

/// Whether the sender's own connections receive their message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EchoPolicy {
    /// Only the other members are notified.
    #[default]
    ExcludeSender,
    /// The sender's other devices are notified too.
    IncludeSender,
}

impl EchoPolicy {
    /// Policy matching the `echo_to_sender` setting.
    #[must_use]
    pub const fn from_echo_flag(echo_to_sender: bool) -> Self {
        if echo_to_sender {
            Self::IncludeSender
        } else {
            Self::ExcludeSender
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Distinct recipients considered.
    pub recipients: usize,
    /// Connections the event was queued on.
    pub delivered: usize,
    /// Recipients with no live connection.
    pub missed: usize,
    /// Connections that were closed or had a full queue.
    pub failed: usize,
}

/// Pushes new-message events to the live connections of conversation members.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    registry: ConnectionRegistry,
    echo: EchoPolicy,
}

impl DeliveryDispatcher {
    /// Create a dispatcher over a registry.
    #[must_use]
    pub const fn new(registry: ConnectionRegistry, echo: EchoPolicy) -> Self {
        Self { registry, echo }
    }

    /// The registry this dispatcher reads from.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Push `message` to every connected recipient among `member_ids`.
    ///
    /// Only serialization can fail. A connection whose push fails is shut
    /// down, removed from the registry and counted as failed.
    pub async fn dispatch(
        &self,
        message: &MessagePayload,
        member_ids: &[String],
    ) -> AppResult<DispatchReport> {
        let event = LiveEvent::NewMessage {
            message: message.clone(),
        };
        let frame: Arc<str> = serde_json::to_string(&event)
            .map_err(|e| AppError::Internal(format!("Failed to serialize live event: {e}")))?
            .into();

        let mut report = DispatchReport::default();
        let mut seen = HashSet::new();

        for recipient in member_ids {
            if !seen.insert(recipient.as_str()) {
                continue;
            }
            if self.echo == EchoPolicy::ExcludeSender && *recipient == message.sender_id {
                continue;
            }
            report.recipients += 1;

            let connections = self.registry.connections_for(recipient).await;
            if connections.is_empty() {
                debug!(
                    message_id = %message.id,
                    user_id = %recipient,
                    "Recipient offline, delivery missed"
                );
                report.missed += 1;
                continue;
            }

            for connection in connections {
                match connection.push(frame.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!(
                            message_id = %message.id,
                            user_id = %recipient,
                            connection_id = %connection.id,
                            error = %e,
                            "Failed to push live event, dropping connection"
                        );
                        connection.shut_down();
                        self.registry.unregister(recipient, connection.id).await;
                        report.failed += 1;
                    }
                }
            }
        }

        debug!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            recipients = report.recipients,
            delivered = report.delivered,
            missed = report.missed,
            failed = report.failed,
            "Message dispatched"
        );

        Ok(report)
    }
}

#[async_trait]
impl EventPublisher for DeliveryDispatcher {
    async fn publish_new_message(
        &self,
        message: &MessagePayload,
        member_ids: &[String],
    ) -> AppResult<()> {
        self.dispatch(message, member_ids).await.map(|_| ())
    }
}
