//! Bootstrap sync: on start, or ~800ms after observing a coordinator
//! change, pull the coordinator's full log and replay it through the
//! idempotent replication-apply path. Grounded on `requestInitialSync` in
//! `sync.go`, but deliberately diverges from that file's wholesale
//! log-replace in favor of the idempotent per-entry merge — see DESIGN.md.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chat_protocol::{encode_binary, verbs::PeerListing, Envelope, LogEntry};
use chat_transport::PeerReqPool;
use tracing::{info, warn};

use crate::clock::LogicalClock;
use crate::ref_client::{RefClient, RefTransport};
use crate::replication::ReplicationEngine;

/// Delay before pulling a sync after observing a coordinator change,
/// matching the 800ms delay in the original `sync.go`.
pub const POST_ELECTION_SYNC_DELAY: Duration = Duration::from_millis(800);
const SYNC_TIMEOUT_MS: i32 = 4_000;

pub struct BootstrapSync<T: RefTransport> {
    ref_client: Arc<RefClient<T>>,
    peer_pool: Arc<PeerReqPool>,
    clock: Arc<LogicalClock>,
    replication: Arc<ReplicationEngine>,
}

impl<T: RefTransport> BootstrapSync<T> {
    pub fn new(
        ref_client: Arc<RefClient<T>>,
        peer_pool: Arc<PeerReqPool>,
        clock: Arc<LogicalClock>,
        replication: Arc<ReplicationEngine>,
    ) -> Self {
        BootstrapSync {
            ref_client,
            peer_pool,
            clock,
            replication,
        }
    }

    /// Pull the coordinator's full log and apply each entry idempotently.
    /// A no-op if `coordinator` can't be resolved or doesn't answer.
    pub async fn sync_from(&self, coordinator: &str) {
        let list = self.ref_client.list().await.unwrap_or_default();
        let Some(peer) = list.iter().find(|p| p.name == coordinator) else {
            warn!(coordinator, "cannot resolve coordinator address for sync");
            return;
        };

        let Some(logs) = self.request_sync(peer).await else {
            warn!(coordinator, "bootstrap sync request failed");
            return;
        };

        info!(coordinator, entries = logs.len(), "applying bootstrap sync");
        for entry in logs {
            self.apply_entry(entry).await;
        }
    }

    async fn request_sync(&self, peer: &PeerListing) -> Option<Vec<LogEntry>> {
        let clock = self.clock.tick_for_send().await;
        let env = Envelope::new("sync_request", BTreeMap::new(), clock);
        let bytes = encode_binary(&env).ok()?;
        let addr = format!("tcp://{}:{}", peer.name, peer.port);
        let reply_bytes = self
            .peer_pool
            .request(&addr, bytes, SYNC_TIMEOUT_MS)
            .await
            .ok()?;
        let reply = chat_protocol::decode(&reply_bytes).ok()?;
        self.clock.observe(reply.clock).await;
        let logs_value = reply.get("logs")?.clone();
        serde_json::from_value(logs_value).ok()
    }

    async fn apply_entry(&self, entry: LogEntry) {
        let mut data = BTreeMap::new();
        data.insert("id".to_string(), serde_json::Value::String(entry.id));
        data.insert("type".to_string(), serde_json::Value::String(entry.kind));
        data.insert(
            "data".to_string(),
            serde_json::Value::Object(entry.data.into_iter().collect()),
        );
        let env = Envelope::new("replicate", data, entry.clock);
        if let Ok(bytes) = encode_binary(&env) {
            self.replication.apply_bytes(&bytes).await;
        }
    }
}
