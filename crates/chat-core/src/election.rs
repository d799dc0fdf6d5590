//! Bully-style leader election, lowest-rank-wins. Grounded on
//! `determineCoordinator`/`startElectionProcess` in `server_sync.go`, and
//! `applyCoordinatorUpdate` in `sync.go`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chat_protocol::{encode_text, verbs::PeerListing, Envelope};
use chat_transport::PeerReqPool;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::clock::LogicalClock;
use crate::ref_client::{RefClient, RefTransport};

pub const TOPIC: &str = "servers";
const ELECTION_TIMEOUT_MS: i32 = 3_000;

/// Tracks the currently-known coordinator. Updated both by the local
/// election procedures and by `servers`-topic broadcasts from elsewhere.
pub struct CoordinatorState {
    current: RwLock<Option<String>>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        CoordinatorState {
            current: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    /// Set the coordinator, returning `true` if this is a change from the
    /// previous value (callers use this to decide whether to schedule a
    /// bootstrap-sync pull).
    pub async fn set(&self, name: String) -> bool {
        let mut current = self.current.write().await;
        let changed = current.as_deref() != Some(name.as_str());
        if changed {
            info!(old = ?*current, new = %name, "coordinator changed");
        }
        *current = Some(name);
        changed
    }
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the lowest-ranked entry in `list`; ties break on name.
pub fn pick_lowest_rank(list: &[PeerListing]) -> Option<&PeerListing> {
    list.iter().min_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)))
}

pub struct Election<T: RefTransport> {
    ref_client: Arc<RefClient<T>>,
    peer_pool: Arc<PeerReqPool>,
    clock: Arc<LogicalClock>,
    self_name: String,
    self_rank: RwLock<u64>,
}

impl<T: RefTransport> Election<T> {
    pub fn new(
        ref_client: Arc<RefClient<T>>,
        peer_pool: Arc<PeerReqPool>,
        clock: Arc<LogicalClock>,
        self_name: String,
    ) -> Self {
        Election {
            ref_client,
            peer_pool,
            clock,
            self_name,
            self_rank: RwLock::new(0),
        }
    }

    pub async fn set_self_rank(&self, rank: u64) {
        *self.self_rank.write().await = rank;
    }

    /// Passive determination used at boot: whoever REF lists as lowest rank
    /// is the coordinator; if the list is empty, we name ourselves.
    pub async fn determine_coordinator(&self) -> String {
        match self.ref_client.list().await {
            Ok(list) => pick_lowest_rank(&list)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| self.self_name.clone()),
            Err(_) => self.self_name.clone(),
        }
    }

    /// Active election on suspected coordinator loss. Probes every
    /// lower-ranked peer; yields if any answers, otherwise declares self.
    /// Returns `Some(self_name)` if self became coordinator.
    pub async fn start_election(&self) -> Option<String> {
        let self_rank = *self.self_rank.read().await;
        let list = self.ref_client.list().await.unwrap_or_default();
        for peer in &list {
            if peer.rank >= self_rank || peer.name == self.self_name {
                continue;
            }
            if self.probe_election(peer).await {
                return None;
            }
        }
        Some(self.self_name.clone())
    }

    async fn probe_election(&self, peer: &PeerListing) -> bool {
        let clock = self.clock.tick_for_send().await;
        let env = Envelope::new("election", BTreeMap::new(), clock);
        let Ok(bytes) = encode_text(&env) else {
            return false;
        };
        let addr = format!("tcp://{}:{}", peer.name, peer.port);
        match self.peer_pool.request(&addr, bytes, ELECTION_TIMEOUT_MS).await {
            Ok(reply_bytes) => match chat_protocol::decode(&reply_bytes) {
                Ok(reply) => reply.get_str("election") == Some("OK"),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Build the `servers`-topic announcement envelope for `coordinator`.
    pub async fn announcement(&self, coordinator: &str) -> Envelope {
        let mut data = BTreeMap::new();
        data.insert("coordinator".to_string(), Value::String(coordinator.to_string()));
        let clock = self.clock.tick_for_send().await;
        Envelope::new("election", data, clock)
    }
}
