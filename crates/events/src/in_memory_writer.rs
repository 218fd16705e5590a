//! In-memory message writer for tests/dev.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::message::WireMessage;
use crate::writer::{MessageWriter, TransportError};

/// Writer that records every message it is given.
///
/// - No IO
/// - Optionally fails every write (to exercise error paths)
#[derive(Debug, Default)]
pub struct RecordingWriter {
    messages: Mutex<Vec<WireMessage>>,
    fail_with: Mutex<Option<TransportError>>,
    delay: Mutex<Option<Duration>>,
    written: Notify,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with `err` (`None` restores success).
    pub fn fail_with(&self, err: Option<TransportError>) {
        if let Ok(mut slot) = self.fail_with.lock() {
            *slot = err;
        }
    }

    /// Hold each write for `delay` before recording it.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.delay.lock() {
            *slot = delay;
        }
    }

    pub fn messages(&self) -> Vec<WireMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` messages were recorded, or `timeout` elapses.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.written.notified();
            if self.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len() >= count;
            }
        }
    }
}

#[async_trait]
impl MessageWriter for RecordingWriter {
    async fn write(&self, message: WireMessage) -> Result<(), TransportError> {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.fail_with.lock().ok().and_then(|f| f.clone());
        if let Some(err) = failure {
            return Err(err);
        }

        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
        self.written.notify_waiters();
        Ok(())
    }
}
