//! Publishes locally-committed events on the `replicate` topic and applies
//! incoming ones idempotently. Grounded on
//! `server-unifiedddd/replication.go` and `sub_loop.go`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_protocol::{decode, encode_binary, Envelope, LogEntry};
use chat_transport::PubSocket;
use serde_json::Value;
use tracing::{error, warn};

use crate::clock::LogicalClock;
use crate::log_store::LogStore;

pub const TOPIC: &str = "replicate";

pub struct ReplicationEngine {
    log_store: Arc<LogStore>,
    clock: Arc<LogicalClock>,
    publisher: Arc<PubSocket>,
    commit_count: AtomicU64,
}

impl ReplicationEngine {
    pub fn new(log_store: Arc<LogStore>, clock: Arc<LogicalClock>, publisher: Arc<PubSocket>) -> Self {
        ReplicationEngine {
            log_store,
            clock,
            publisher,
            commit_count: AtomicU64::new(0),
        }
    }

    /// Total number of locally-originated commits accepted so far. The
    /// caller uses this to decide when to trigger a Berkeley round (every
    /// [`crate::BERKELEY_TRIGGER_INTERVAL`] commits).
    pub fn commit_count(&self) -> u64 {
        self.commit_count.load(Ordering::Relaxed)
    }

    /// Commit `entry` locally (idempotent) and best-effort publish it for
    /// replication. Called by the domain layer right after a verb handler
    /// decides an event happened.
    pub async fn commit(&self, entry: LogEntry) {
        if !self.log_store.apply(entry.clone()).await {
            return;
        }
        self.commit_count.fetch_add(1, Ordering::Relaxed);
        let mut data = BTreeMap::new();
        data.insert("id".to_string(), Value::String(entry.id.clone()));
        data.insert("type".to_string(), Value::String(entry.kind.clone()));
        data.insert("data".to_string(), Value::Object(entry.data.into_iter().collect()));
        let clock = self.clock.tick_for_send().await;
        let env = Envelope::new("replicate", data, clock);
        match encode_binary(&env) {
            Ok(bytes) => {
                if let Err(e) = self.publisher.publish(TOPIC.to_string(), bytes).await {
                    warn!(error = %e, "failed to publish replication event");
                }
            }
            Err(e) => error!(error = %e, "failed to encode replication event"),
        }
    }

    /// Apply a `replicate` envelope received from the bus. No re-publish:
    /// the fan-out is star-shaped through the broker, not gossip.
    pub async fn apply_bytes(&self, bytes: &[u8]) {
        let env = match decode(bytes) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "dropping malformed replication envelope");
                return;
            }
        };
        self.clock.observe(env.clock).await;
        self.apply_envelope(env).await;
    }

    async fn apply_envelope(&self, env: Envelope) {
        let Some(id) = env.get_str("id").map(str::to_string) else {
            warn!("replication envelope missing id, dropping");
            return;
        };
        let kind = env.get_str("type").unwrap_or("unknown").to_string();
        let data = match env.get("data") {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        let entry = LogEntry {
            id,
            kind,
            data: data.into_iter().collect(),
            timestamp: env.timestamp,
            clock: env.clock,
        };
        self.log_store.apply(entry).await;
    }

    pub fn log_store(&self) -> &Arc<LogStore> {
        &self.log_store
    }
}
