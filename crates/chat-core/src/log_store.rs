//! The replicated, append-only event log. Idempotent on [`LogEntry::id`]:
//! applying the same entry twice is a no-op.

use std::sync::Arc;

use chat_protocol::LogEntry;
use tokio::sync::RwLock;

use crate::persist::{CoalescingWriter, JsonFile};

pub struct LogStore {
    entries: RwLock<Vec<LogEntry>>,
    writer: CoalescingWriter<Vec<LogEntry>>,
}

impl LogStore {
    pub fn load(file: JsonFile<Vec<LogEntry>>) -> Self {
        let initial = file.load().unwrap_or_default();
        let writer = CoalescingWriter::spawn(file, initial.clone());
        LogStore {
            entries: RwLock::new(initial),
            writer,
        }
    }

    /// Append `entry` if its `id` isn't already present. Returns `true` if
    /// it was newly appended.
    pub async fn apply(&self, entry: LogEntry) -> bool {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return false;
        }
        entries.push(entry);
        self.writer.write(entries.clone());
        true
    }

    pub async fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn temp_file() -> JsonFile<Vec<LogEntry>> {
        let path = std::env::temp_dir().join(format!(
            "chat-core-logstore-test-{}.json",
            std::process::id() as u64 * 1000
                + std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .subsec_millis() as u64
        ));
        JsonFile::new(path)
    }

    #[tokio::test]
    async fn applying_the_same_entry_twice_is_a_no_op() {
        let store = LogStore::load(temp_file());
        let entry = LogEntry::new("publish", BTreeMap::new(), 1);
        assert!(store.apply(entry.clone()).await);
        assert!(!store.apply(entry.clone()).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn distinct_entries_both_land() {
        let store = LogStore::load(temp_file());
        store.apply(LogEntry::new("publish", BTreeMap::new(), 1)).await;
        store.apply(LogEntry::new("publish", BTreeMap::new(), 2)).await;
        assert_eq!(store.len().await, 2);
    }
}
