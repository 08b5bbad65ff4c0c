//! Event publisher service.
//!
//! Provides an abstraction for publishing real-time events. The ingest
//! pipeline publishes through this trait; the live implementation is the
//! [`DeliveryDispatcher`](super::delivery::DeliveryDispatcher).

use alumni_common::{AppResult, MessagePayload};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for publishing real-time events.
///
/// This allows the ingest pipeline to announce new messages without
/// depending on how they reach connected clients.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a newly persisted message to the members of its conversation.
    async fn publish_new_message(
        &self,
        message: &MessagePayload,
        member_ids: &[String],
    ) -> AppResult<()>;
}

/// A no-op implementation of `EventPublisher` for testing or when real-time events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_new_message(
        &self,
        _message: &MessagePayload,
        _member_ids: &[String],
    ) -> AppResult<()> {
        Ok(())
    }
}

/// Type alias for a shared event publisher.
pub type EventPublisherService = Arc<dyn EventPublisher>;
