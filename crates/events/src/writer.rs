//! Message transport abstraction (mechanics only).
//!
//! A [`MessageWriter`] is the **transport layer** for outbound notifications:
//! it accepts a fully rendered [`WireMessage`] and delivers it to the external
//! event log.
//!
//! ```text
//! handler (commit) → PublishQueue → EventPublisher (render key) → MessageWriter → broker
//! ```
//!
//! ## Delivery Guarantees
//!
//! Writers are **best-effort**: one attempt per message, the error is returned
//! verbatim, and nothing is rolled back or retried. The store is the source of
//! truth; a lost notification does not undo the mutation.
//!
//! ## Thread Safety
//!
//! The trait requires `Send + Sync`. One writer handle is shared by every
//! concurrent publish without external locking.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::WireMessage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The broker (or its client library) rejected or failed the write.
    #[error("broker write failed: {0}")]
    Broker(String),

    /// No partition is available for the topic.
    #[error("no partitions available for topic '{0}'")]
    NoPartitions(String),

    /// The write did not complete in time.
    #[error("broker write timed out")]
    Timeout,
}

#[async_trait]
pub trait MessageWriter: Send + Sync {
    async fn write(&self, message: WireMessage) -> Result<(), TransportError>;
}

#[async_trait]
impl<W> MessageWriter for Arc<W>
where
    W: MessageWriter + ?Sized,
{
    async fn write(&self, message: WireMessage) -> Result<(), TransportError> {
        (**self).write(message).await
    }
}
