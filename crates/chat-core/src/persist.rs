//! Generic atomic JSON persistence, fed by a single-slot coalescing worker.
//!
//! Direct writes use a write-temp-then-rename sequence, atomic on POSIX
//! filesystems. The worker never queues more than one pending write per
//! file: if a burst of commits arrives faster than disk I/O keeps up, only
//! the most recent snapshot is ever written, which is the redesign called
//! out against the original's fire-and-forget `go persistX()` goroutines.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug)]
pub enum PersistError {
    Io(String),
    Serialize(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(s) => write!(f, "persist io error: {s}"),
            PersistError::Serialize(s) => write!(f, "persist serialize error: {s}"),
        }
    }
}

impl std::error::Error for PersistError {}

/// A JSON-backed file for one serializable value, loaded once at boot and
/// saved via write-temp-then-rename.
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned + Default> JsonFile<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFile {
            path: path.into(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Load the value, or `T::default()` if the file doesn't exist yet.
    pub fn load(&self) -> Result<T, PersistError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| PersistError::Serialize(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(PersistError::Io(e.to_string())),
        }
    }

    /// Serialize `value` and atomically replace the target file.
    pub fn save(&self, value: &T) -> Result<(), PersistError> {
        let body = serde_json::to_vec_pretty(value).map_err(|e| PersistError::Serialize(e.to_string()))?;
        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, &body).map_err(|e| PersistError::Io(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| PersistError::Io(e.to_string()))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// A background task that persists only the latest value sent to it,
/// dropping any intermediate value a faster producer raced past.
pub struct CoalescingWriter<T> {
    tx: watch::Sender<T>,
}

impl<T> CoalescingWriter<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static,
{
    /// Start the worker. Every value sent via [`Self::write`] supersedes any
    /// value the worker hasn't gotten around to persisting yet.
    pub fn spawn(file: JsonFile<T>, initial: T) -> Self {
        let (tx, mut rx) = watch::channel(initial);
        // mark the initial value as already seen so the worker only wakes
        // on a genuine subsequent write.
        rx.borrow_and_update();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                if let Err(e) = file.save(&value) {
                    error!(error = %e, "failed to persist snapshot, will retry on next write");
                } else {
                    info!(path = ?file.path, "persisted snapshot");
                }
            }
        });
        CoalescingWriter { tx }
    }

    /// Enqueue the latest snapshot to be written. Never blocks on disk I/O.
    pub fn write(&self, value: T) {
        // a closed receiver means the worker task died; nothing more to do.
        let _ = self.tx.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        counter: u64,
    }

    #[test]
    fn load_missing_file_returns_default() {
        let file: JsonFile<Sample> = JsonFile::new("/tmp/chat-core-test-missing-does-not-exist.json");
        let loaded = file.load().unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = std::env::temp_dir().join(format!("chat-core-test-{}.json", uuid_like()));
        let file: JsonFile<Sample> = JsonFile::new(&path);
        file.save(&Sample { counter: 42 }).unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded, Sample { counter: 42 });
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn coalescing_writer_persists_latest_value() {
        let path = std::env::temp_dir().join(format!("chat-core-test-coalesce-{}.json", uuid_like()));
        let file: JsonFile<Sample> = JsonFile::new(&path);
        let writer = CoalescingWriter::spawn(JsonFile::new(&path), Sample::default());
        writer.write(Sample { counter: 1 });
        writer.write(Sample { counter: 2 });
        writer.write(Sample { counter: 3 });
        // allow the worker to catch up
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let loaded = file.load().unwrap();
        assert_eq!(loaded, Sample { counter: 3 });
        std::fs::remove_file(&path).ok();
    }

    fn uuid_like() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .subsec_nanos() as u64
    }
}
