//! Berkeley-adjustable physical clock: wall-clock seconds plus a signed
//! offset that the coordinator's Berkeley round mutates.

use tokio::sync::Mutex;

pub struct PhysicalClock {
    offset: Mutex<i64>,
}

impl PhysicalClock {
    pub fn new() -> Self {
        PhysicalClock {
            offset: Mutex::new(0),
        }
    }

    /// Current physical time: wall clock seconds plus the accumulated
    /// Berkeley offset.
    pub async fn now(&self) -> i64 {
        let offset = *self.offset.lock().await;
        wall_clock_seconds() + offset
    }

    /// Apply a Berkeley adjustment, returning the new physical time.
    pub async fn apply_adjustment(&self, adjust: i64) -> i64 {
        let mut offset = self.offset.lock().await;
        *offset += adjust;
        wall_clock_seconds() + *offset
    }

    pub async fn current_offset(&self) -> i64 {
        *self.offset.lock().await
    }
}

impl Default for PhysicalClock {
    fn default() -> Self {
        Self::new()
    }
}

fn wall_clock_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
