//! Lamport logical clock.
//!
//! Two operations: bump before every send, observe on every receive. All
//! mutation goes through one mutex so concurrent tasks can't interleave a
//! read-modify-write.

use tokio::sync::Mutex;

pub struct LogicalClock {
    value: Mutex<u64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        LogicalClock {
            value: Mutex::new(0),
        }
    }

    /// Increment and return the new value. Call once per outgoing envelope.
    pub async fn tick_for_send(&self) -> u64 {
        let mut v = self.value.lock().await;
        *v += 1;
        *v
    }

    /// Fold in a received clock value per the Lamport rule:
    /// `local = max(local, received) + 1`.
    pub async fn observe(&self, received: u64) {
        let mut v = self.value.lock().await;
        *v = (*v).max(received) + 1;
    }

    pub async fn current(&self) -> u64 {
        *self.value.lock().await
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::new()
    }
}
