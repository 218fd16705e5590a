//! Best-effort event publisher.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;

use crate::error::PublishError;
use crate::event::{EventKind, OutboundEvent};
use crate::key_template::KeyTemplate;
use crate::message::WireMessage;
use crate::writer::MessageWriter;

struct Inner {
    writer: Arc<dyn MessageWriter>,
    key_template: KeyTemplate,
}

/// Renders message keys and hands messages to the shared writer.
///
/// Every publish is registered with a [`TaskTracker`] for its whole duration
/// so that shutdown can wait for in-flight sends.
#[derive(Clone)]
pub struct EventPublisher {
    inner: Option<Arc<Inner>>,
    tracker: TaskTracker,
}

impl core::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("enabled", &self.is_enabled())
            .field("key_template", &self.inner.as_ref().map(|i| i.key_template.source()))
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

impl EventPublisher {
    pub fn new(writer: Arc<dyn MessageWriter>, key_template: KeyTemplate) -> Self {
        Self {
            inner: Some(Arc::new(Inner {
                writer,
                key_template,
            })),
            tracker: TaskTracker::new(),
        }
    }

    /// Publisher that accepts every message and sends nothing.
    pub fn disabled() -> Self {
        Self {
            inner: None,
            tracker: TaskTracker::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Publish one message. The transport error is returned verbatim.
    #[tracing::instrument(skip(self, payload), fields(value_bytes = payload.len()))]
    pub async fn publish_message(
        &self,
        entity_id: &str,
        kind: EventKind,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let _in_flight = self.tracker.token();

        let key = inner.key_template.render(entity_id, kind);
        let message = WireMessage::new((!key.is_empty()).then(|| key.into_bytes()), payload);

        tracing::info!(key = message.key_str().unwrap_or(""), "publishing message");
        inner.writer.write(message).await?;
        Ok(())
    }

    pub async fn publish(&self, event: OutboundEvent) -> Result<(), PublishError> {
        let entity_id = event.entity_id().to_string();
        let kind = event.kind();
        self.publish_message(&entity_id, kind, event.into_payload()).await
    }

    /// Wait for tracked publishes to finish, at most `deadline`.
    ///
    /// Returns `false` if publishes were still in flight when the deadline hit.
    pub async fn drain(&self, deadline: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(deadline, self.tracker.wait()).await.is_ok();
        if !drained {
            tracing::warn!(in_flight = self.tracker.len(), "publish drain deadline exceeded");
        }
        drained
    }
}
