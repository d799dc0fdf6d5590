//! Berkeley clock synchronization, run only by the node that believes
//! itself coordinator. Grounded on `runBerkeleyCoordinator`/
//! `maybeTriggerBerkeley` in `server_sync.go`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chat_protocol::{encode_text, verbs::PeerListing, Envelope};
use chat_transport::PeerReqPool;
use tracing::{info, warn};

use crate::clock::LogicalClock;
use crate::physical_clock::PhysicalClock;
use crate::ref_client::{RefClient, RefTransport};

const CLOCK_PROBE_TIMEOUT_MS: i32 = 3_000;

pub struct BerkeleyRound<T: RefTransport> {
    ref_client: Arc<RefClient<T>>,
    peer_pool: Arc<PeerReqPool>,
    clock: Arc<LogicalClock>,
    physical_clock: Arc<PhysicalClock>,
    self_name: String,
}

impl<T: RefTransport> BerkeleyRound<T> {
    pub fn new(
        ref_client: Arc<RefClient<T>>,
        peer_pool: Arc<PeerReqPool>,
        clock: Arc<LogicalClock>,
        physical_clock: Arc<PhysicalClock>,
        self_name: String,
    ) -> Self {
        BerkeleyRound {
            ref_client,
            peer_pool,
            clock,
            physical_clock,
            self_name,
        }
    }

    /// Run one full round: sample every reachable peer's physical time,
    /// average, and distribute the per-peer adjustment. A no-op if no peer
    /// (including self) responds.
    pub async fn run(&self) {
        let list = self.ref_client.list().await.unwrap_or_default();
        let mut samples: Vec<(PeerListing, i64)> = Vec::new();

        let self_time = self.physical_clock.now().await;
        samples.push((
            PeerListing {
                name: self.self_name.clone(),
                rank: 0,
                port: 0,
            },
            self_time,
        ));

        for peer in list.iter().filter(|p| p.name != self.self_name) {
            if let Some(time) = self.probe_clock(peer).await {
                samples.push((peer.clone(), time));
            }
        }

        if samples.is_empty() {
            warn!("berkeley round aborted: no samples");
            return;
        }

        let sum: i64 = samples.iter().map(|(_, t)| t).sum();
        let avg = (sum as f64 / samples.len() as f64).round() as i64;
        info!(avg, samples = samples.len(), "berkeley round computed average");

        for (peer, time) in &samples {
            let adjust = avg - time;
            if adjust == 0 {
                continue;
            }
            if peer.name == self.self_name {
                self.physical_clock.apply_adjustment(adjust).await;
            } else {
                self.send_adjustment(peer, adjust).await;
            }
        }
    }

    async fn probe_clock(&self, peer: &PeerListing) -> Option<i64> {
        let clock = self.clock.tick_for_send().await;
        let env = Envelope::new("clock", BTreeMap::new(), clock);
        let bytes = encode_text(&env).ok()?;
        let addr = format!("tcp://{}:{}", peer.name, peer.port);
        let reply_bytes = self
            .peer_pool
            .request(&addr, bytes, CLOCK_PROBE_TIMEOUT_MS)
            .await
            .ok()?;
        let reply = chat_protocol::decode(&reply_bytes).ok()?;
        Some(chat_protocol::numeric::as_i64(reply.get("time")))
    }

    async fn send_adjustment(&self, peer: &PeerListing, adjust: i64) {
        let mut data = BTreeMap::new();
        data.insert("adjust".to_string(), serde_json::Value::from(adjust));
        let clock = self.clock.tick_for_send().await;
        let env = Envelope::new("adjust", data, clock);
        let Ok(bytes) = encode_text(&env) else { return };
        let addr = format!("tcp://{}:{}", peer.name, peer.port);
        if self
            .peer_pool
            .request(&addr, bytes, CLOCK_PROBE_TIMEOUT_MS)
            .await
            .is_err()
        {
            warn!(peer = %peer.name, "failed to deliver clock adjustment");
        }
    }
}
