//! Bounded publish queue between request handlers and the publisher.
//!
//! Handlers call [`EventNotifier::notify`] after a mutation commits and return
//! immediately; a dedicated task drains the queue and runs up to
//! `max_in_flight` publishes at once. What happens when the queue is full is
//! decided by [`Backpressure`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PublishError;
use crate::event::OutboundEvent;
use crate::publisher::EventPublisher;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Full queue fails the notification with [`PublishError::QueueFull`].
    #[default]
    Reject,
    /// Full queue makes the caller wait for space.
    Block,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub backpressure: Backpressure,
    pub max_in_flight: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            backpressure: Backpressure::Reject,
            max_in_flight: 16,
        }
    }
}

/// Cloneable handle handlers use to schedule notifications.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    tx: mpsc::Sender<OutboundEvent>,
    backpressure: Backpressure,
    cancel: CancellationToken,
}

impl EventNotifier {
    pub async fn notify(&self, event: OutboundEvent) -> Result<(), PublishError> {
        if self.cancel.is_cancelled() {
            return Err(PublishError::ShuttingDown);
        }

        match self.backpressure {
            Backpressure::Reject => self.tx.try_send(event).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PublishError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => PublishError::ShuttingDown,
            }),
            Backpressure::Block => tokio::select! {
                sent = self.tx.send(event) => sent.map_err(|_| PublishError::ShuttingDown),
                _ = self.cancel.cancelled() => Err(PublishError::ShuttingDown),
            },
        }
    }
}

/// Owner of the queue's worker task.
pub struct PublishQueue {
    notifier: EventNotifier,
    publisher: EventPublisher,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl PublishQueue {
    /// Spawn the worker on the current runtime.
    pub fn start(publisher: EventPublisher, config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(config.max_in_flight.max(1)));

        let worker = tokio::spawn(run(rx, publisher.clone(), semaphore, cancel.clone()));

        tracing::info!(
            capacity = config.capacity,
            backpressure = ?config.backpressure,
            max_in_flight = config.max_in_flight,
            enabled = publisher.is_enabled(),
            "publish queue started"
        );

        Self {
            notifier: EventNotifier {
                tx,
                backpressure: config.backpressure,
                cancel: cancel.clone(),
            },
            publisher,
            cancel,
            worker,
        }
    }

    pub fn notifier(&self) -> EventNotifier {
        self.notifier.clone()
    }

    /// Stop accepting events, publish what is already queued, then drain.
    ///
    /// Everything, including handing over queued events, is bounded by
    /// `drain_timeout`. Returns whether all publishes completed in time.
    pub async fn shutdown(self, drain_timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + drain_timeout;
        self.cancel.cancel();

        let worker = self.worker;
        if tokio::time::timeout_at(deadline, worker).await.is_err() {
            tracing::warn!("publish queue did not hand over all queued events before deadline");
            return false;
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let drained = self.publisher.drain(remaining).await;
        tracing::info!(drained, "publish queue stopped");
        drained
    }
}

async fn run(
    mut rx: mpsc::Receiver<OutboundEvent>,
    publisher: EventPublisher,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
        };
        dispatch(&publisher, &semaphore, event).await;
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        dispatch(&publisher, &semaphore, event).await;
    }
}

async fn dispatch(publisher: &EventPublisher, semaphore: &Arc<Semaphore>, event: OutboundEvent) {
    let Ok(permit) = semaphore.clone().acquire_owned().await else {
        return;
    };
    let p = publisher.clone();
    publisher.tracker().spawn(async move {
        let entity_id = event.entity_id().to_string();
        let kind = event.kind();
        if let Err(err) = p.publish(event).await {
            tracing::error!(entity_id = %entity_id, %kind, error = %err, "publish failed");
        }
        drop(permit);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::in_memory_writer::RecordingWriter;
    use crate::key_template::KeyTemplate;

    fn event(id: &str) -> OutboundEvent {
        OutboundEvent::new(id, EventKind::Created, b"{}".to_vec())
    }

    fn setup(config: QueueConfig) -> (PublishQueue, Arc<RecordingWriter>) {
        let writer = Arc::new(RecordingWriter::new());
        let publisher =
            EventPublisher::new(writer.clone(), KeyTemplate::parse("{{.Company}}").unwrap());
        (PublishQueue::start(publisher, config), writer)
    }

    #[tokio::test]
    async fn notified_events_are_published() {
        let (queue, writer) = setup(QueueConfig::default());
        let n = queue.notifier();
        for i in 0..5 {
            n.notify(event(&format!("c{i}"))).await.unwrap();
        }
        assert!(writer.wait_for(5, Duration::from_secs(2)).await);
        assert!(queue.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn reject_policy_reports_queue_full() {
        let (queue, writer) = setup(QueueConfig {
            capacity: 1,
            backpressure: Backpressure::Reject,
            max_in_flight: 1,
        });
        writer.set_delay(Some(Duration::from_millis(200)));
        let n = queue.notifier();

        let mut full = false;
        for i in 0..10 {
            if n.notify(event(&format!("c{i}"))).await == Err(PublishError::QueueFull) {
                full = true;
                break;
            }
        }
        assert!(full);
        queue.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn block_policy_waits_for_space() {
        let (queue, writer) = setup(QueueConfig {
            capacity: 1,
            backpressure: Backpressure::Block,
            max_in_flight: 1,
        });
        writer.set_delay(Some(Duration::from_millis(20)));
        let n = queue.notifier();
        for i in 0..4 {
            n.notify(event(&format!("c{i}"))).await.unwrap();
        }
        assert!(queue.shutdown(Duration::from_secs(5)).await);
        assert_eq!(writer.len(), 4);
    }

    #[tokio::test]
    async fn shutdown_publishes_already_queued_events() {
        let (queue, writer) = setup(QueueConfig {
            capacity: 16,
            backpressure: Backpressure::Reject,
            max_in_flight: 1,
        });
        writer.set_delay(Some(Duration::from_millis(10)));
        let n = queue.notifier();
        for i in 0..6 {
            n.notify(event(&format!("c{i}"))).await.unwrap();
        }
        assert!(queue.shutdown(Duration::from_secs(5)).await);
        assert_eq!(writer.len(), 6);
        assert_eq!(n.notify(event("late")).await, Err(PublishError::ShuttingDown));
    }

    #[tokio::test]
    async fn failed_publishes_do_not_stop_the_worker() {
        let (queue, writer) = setup(QueueConfig::default());
        writer.fail_with(Some(crate::writer::TransportError::Timeout));
        let n = queue.notifier();
        n.notify(event("c1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.fail_with(None);
        n.notify(event("c2")).await.unwrap();
        assert!(writer.wait_for(1, Duration::from_secs(2)).await);
        assert_eq!(writer.messages()[0].key_str(), Some("c2"));
        queue.shutdown(Duration::from_secs(1)).await;
    }
}
