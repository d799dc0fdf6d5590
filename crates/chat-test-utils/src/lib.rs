//! Shared test helpers: an in-process fake reference registry, analogous in
//! spirit to the teacher's `rt-test-utils::MockWsClient` — a stand-in good
//! enough to drive end-to-end scenarios without spawning real separate
//! processes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use chat_protocol::{verbs::PeerListing, Envelope, RefTransport};
use tokio::sync::Mutex;

/// Hands out unique loopback ports so parallel tests don't collide.
static NEXT_PORT: AtomicU16 = AtomicU16::new(19_000);

pub fn next_loopback_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

pub fn loopback_addr(port: u16) -> String {
    format!("tcp://127.0.0.1:{port}")
}

/// An in-memory stand-in for REF: tracks ranks and a live-peer list without
/// any socket at all, for tests that only need `chat_core::ref_client`'s
/// contract rather than the real REP server in `services/ref-registry`.
pub struct FakeRefRegistry {
    next_rank: Mutex<u64>,
    peers: Mutex<Vec<PeerListing>>,
}

impl FakeRefRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRefRegistry {
            next_rank: Mutex::new(1),
            peers: Mutex::new(Vec::new()),
        })
    }

    pub async fn register(&self, name: &str, port: u16) -> u64 {
        let mut peers = self.peers.lock().await;
        if let Some(existing) = peers.iter().find(|p| p.name == name) {
            return existing.rank;
        }
        let mut next = self.next_rank.lock().await;
        let rank = *next;
        *next += 1;
        peers.push(PeerListing {
            name: name.to_string(),
            rank,
            port,
        });
        rank
    }

    pub async fn list(&self) -> Vec<PeerListing> {
        self.peers.lock().await.clone()
    }
}

impl RefTransport for Arc<FakeRefRegistry> {
    async fn request_text(&self, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        let req: Envelope = serde_json::from_slice(&payload).map_err(|e| e.to_string())?;
        let mut data = BTreeMap::new();
        match req.service.as_str() {
            "rank" => {
                let user = req.get_str("user").unwrap_or_default().to_string();
                let port = chat_protocol::numeric::as_u64(req.get("port")) as u16;
                let rank = self.register(&user, port).await;
                data.insert("rank".to_string(), serde_json::Value::from(rank));
            }
            "heartbeat" => {
                data.insert("status".to_string(), serde_json::Value::String("ok".to_string()));
            }
            "list" => {
                let list = self.list().await;
                data.insert("list".to_string(), serde_json::to_value(list).unwrap());
            }
            _ => {
                data.insert(
                    "error".to_string(),
                    serde_json::Value::String("serviço desconhecido".to_string()),
                );
            }
        }
        let reply = Envelope::new(req.service, data, req.clock + 1);
        serde_json::to_vec(&reply).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_ref_assigns_increasing_ranks() {
        let ref_registry = FakeRefRegistry::new();
        let rank_a = ref_registry.register("server-a", 7000).await;
        let rank_b = ref_registry.register("server-b", 7001).await;
        assert!(rank_b > rank_a);
    }

    #[tokio::test]
    async fn re_registering_the_same_name_keeps_its_rank() {
        let ref_registry = FakeRefRegistry::new();
        let first = ref_registry.register("server-a", 7000).await;
        let second = ref_registry.register("server-a", 7000).await;
        assert_eq!(first, second);
    }
}
