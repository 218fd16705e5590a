//! Partition balancing for keyless messages.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::message::WireMessage;

/// Chooses a partition for a message that carries no key.
pub trait Balancer: Send + Sync {
    /// `None` iff `partitions` is empty.
    fn balance(&self, message: &WireMessage, partitions: &[i32]) -> Option<i32>;
}

/// Sends each message to the partition that has received the fewest bytes.
///
/// Ties go to the partition listed first.
#[derive(Debug, Default)]
pub struct LeastBytes {
    written: Mutex<HashMap<i32, u64>>,
}

impl LeastBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_for(&self, partition: i32) -> u64 {
        self.written
            .lock()
            .ok()
            .and_then(|w| w.get(&partition).copied())
            .unwrap_or(0)
    }
}

impl Balancer for LeastBytes {
    fn balance(&self, message: &WireMessage, partitions: &[i32]) -> Option<i32> {
        // A poisoned map only loses load history; recover it.
        let mut written = self
            .written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut best: Option<(i32, u64)> = None;
        for &p in partitions {
            let load = written.get(&p).copied().unwrap_or(0);
            if best.is_none_or(|(_, b)| load < b) {
                best = Some((p, load));
            }
        }

        let (partition, _) = best?;
        *written.entry(partition).or_default() += message.size() as u64;
        Some(partition)
    }
}
