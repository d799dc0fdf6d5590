//! A pooled REQ client, one socket per peer address.
//!
//! The original source opens a fresh ZMQ context and REQ socket for every
//! single call (`directReqZMQ`/`directReqZMQJSON` in `server_sync.go`),
//! which exists only to dodge ZMQ's "don't share a socket across threads"
//! rule in a language without a borrow checker to enforce it. Here we keep
//! one REQ socket per peer address alive for the process lifetime, each
//! guarded by its own mutex so the strict REQ send/recv alternation can't be
//! interleaved by two callers racing for the same peer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::TransportError;

struct PooledSocket {
    socket: Arc<StdMutex<zmq::Socket>>,
}

/// A registry of pooled REQ sockets, keyed by peer address (e.g.
/// `tcp://server-2:7000`).
pub struct PeerReqPool {
    ctx: zmq::Context,
    sockets: AsyncMutex<HashMap<String, PooledSocket>>,
}

impl PeerReqPool {
    pub fn new() -> Self {
        PeerReqPool {
            ctx: zmq::Context::new(),
            sockets: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn socket_for(&self, addr: &str) -> Result<Arc<StdMutex<zmq::Socket>>, TransportError> {
        let mut sockets = self.sockets.lock().await;
        if let Some(pooled) = sockets.get(addr) {
            return Ok(pooled.socket.clone());
        }
        let socket = self
            .ctx
            .socket(zmq::REQ)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        socket
            .set_linger(0)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        socket
            .connect(addr)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let socket = Arc::new(StdMutex::new(socket));
        sockets.insert(
            addr.to_string(),
            PooledSocket {
                socket: socket.clone(),
            },
        );
        debug!(peer = addr, "opened pooled REQ socket");
        Ok(socket)
    }

    /// Send `payload` to `addr` and wait up to `timeout_ms` for a reply.
    ///
    /// Serialized per peer: concurrent callers targeting the same address
    /// queue behind the socket's mutex rather than interleaving frames on
    /// the wire.
    pub async fn request(
        &self,
        addr: &str,
        payload: Vec<u8>,
        timeout_ms: i32,
    ) -> Result<Vec<u8>, TransportError> {
        let socket = self.socket_for(addr).await?;
        let result = tokio::task::spawn_blocking(move || {
            let socket = socket.lock().expect("peer socket mutex poisoned");
            socket.set_rcvtimeo(timeout_ms).ok();
            socket
                .send(payload, 0)
                .map_err(|e| TransportError::Send(e.to_string()))?;
            socket.recv_bytes(0).map_err(TransportError::from)
        })
        .await
        .expect("blocking task panicked");

        if result.is_err() {
            // A REQ socket left mid send/recv after a timeout or send error
            // refuses any further send (EFSM). Evict it so the next call to
            // this peer opens a fresh connection instead of wedging forever.
            self.sockets.lock().await.remove(addr);
            debug!(peer = addr, "evicted pooled REQ socket after request failure");
        }
        result
    }
}

impl Default for PeerReqPool {
    fn default() -> Self {
        Self::new()
    }
}
