//! Client for the three verbs the reference registry answers: `rank`,
//! `heartbeat`, `list`. Dialog with REF is always textual JSON, grounded on
//! `ref.go`'s plain `json.Marshal`/`Unmarshal` usage (peer-to-peer dialog
//! uses the binary codec instead; see `chat_protocol::decode`).

use std::collections::BTreeMap;
use std::fmt;

use chat_protocol::{encode_text, verbs::PeerListing, Envelope};
use serde_json::Value;
use tracing::warn;

use crate::clock::LogicalClock;

pub use chat_protocol::RefTransport;

#[derive(Debug)]
pub enum RefClientError {
    Transport(String),
    Decode(String),
}

impl fmt::Display for RefClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefClientError::Transport(s) => write!(f, "ref transport error: {s}"),
            RefClientError::Decode(s) => write!(f, "ref decode error: {s}"),
        }
    }
}

impl std::error::Error for RefClientError {}

/// Production transport: a pooled REQ socket dialing a fixed REF address.
pub struct ZmqRefTransport {
    pool: std::sync::Arc<chat_transport::PeerReqPool>,
    addr: String,
    timeout_ms: i32,
}

impl ZmqRefTransport {
    pub fn new(pool: std::sync::Arc<chat_transport::PeerReqPool>, addr: String, timeout_ms: i32) -> Self {
        ZmqRefTransport {
            pool,
            addr,
            timeout_ms,
        }
    }
}

impl RefTransport for ZmqRefTransport {
    async fn request_text(&self, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        self.pool
            .request(&self.addr, payload, self.timeout_ms)
            .await
            .map_err(|e| e.to_string())
    }
}

pub struct RefClient<T: RefTransport> {
    transport: T,
    clock: std::sync::Arc<LogicalClock>,
}

impl<T: RefTransport> RefClient<T> {
    pub fn new(transport: T, clock: std::sync::Arc<LogicalClock>) -> Self {
        RefClient { transport, clock }
    }

    async fn call(&self, service: &str, data: BTreeMap<String, Value>) -> Result<Envelope, RefClientError> {
        let clock = self.clock.tick_for_send().await;
        let request = Envelope::new(service, data, clock);
        let bytes = encode_text(&request).map_err(|e| RefClientError::Decode(e.to_string()))?;
        let reply_bytes = self
            .transport
            .request_text(bytes)
            .await
            .map_err(RefClientError::Transport)?;
        let reply: Envelope =
            serde_json::from_slice(&reply_bytes).map_err(|e| RefClientError::Decode(e.to_string()))?;
        self.clock.observe(reply.clock).await;
        Ok(reply)
    }

    /// Register (or refresh) this server and obtain its rank.
    pub async fn rank(&self, user: &str, port: u16) -> Result<u64, RefClientError> {
        let mut data = BTreeMap::new();
        data.insert("user".to_string(), Value::String(user.to_string()));
        data.insert("port".to_string(), Value::from(port));
        let reply = self.call("rank", data).await?;
        Ok(chat_protocol::numeric::as_u64(reply.get("rank")))
    }

    /// Refresh `last_seen` for this server.
    pub async fn heartbeat(&self, user: &str, port: u16) -> Result<(), RefClientError> {
        let mut data = BTreeMap::new();
        data.insert("user".to_string(), Value::String(user.to_string()));
        data.insert("port".to_string(), Value::from(port));
        let reply = self.call("heartbeat", data).await?;
        if reply.get_str("status") != Some("ok") {
            warn!(?reply, "unexpected heartbeat reply");
        }
        Ok(())
    }

    /// Snapshot of currently live servers.
    pub async fn list(&self) -> Result<Vec<PeerListing>, RefClientError> {
        let reply = self.call("list", BTreeMap::new()).await?;
        let list = reply
            .get("list")
            .cloned()
            .map(serde_json::from_value::<Vec<PeerListing>>)
            .transpose()
            .map_err(|e| RefClientError::Decode(e.to_string()))?
            .unwrap_or_default();
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct FakeRef {
        next_rank: Mutex<u64>,
        list: Mutex<Vec<PeerListing>>,
    }

    impl RefTransport for Arc<FakeRef> {
        async fn request_text(&self, payload: Vec<u8>) -> Result<Vec<u8>, String> {
            let req: Envelope = serde_json::from_slice(&payload).map_err(|e| e.to_string())?;
            let mut data = BTreeMap::new();
            match req.service.as_str() {
                "rank" => {
                    let mut next = self.next_rank.lock().await;
                    data.insert("rank".to_string(), Value::from(*next));
                    *next += 1;
                }
                "heartbeat" => {
                    data.insert("status".to_string(), Value::String("ok".to_string()));
                }
                "list" => {
                    let list = self.list.lock().await.clone();
                    data.insert("list".to_string(), serde_json::to_value(list).unwrap());
                }
                _ => {
                    data.insert("error".to_string(), Value::String("serviço desconhecido".to_string()));
                }
            }
            let reply = Envelope::new(req.service, data, req.clock + 1);
            serde_json::to_vec(&reply).map_err(|e| e.to_string())
        }
    }

    #[tokio::test]
    async fn rank_returns_assigned_value() {
        let fake = Arc::new(FakeRef {
            next_rank: Mutex::new(1),
            list: Mutex::new(vec![]),
        });
        let client = RefClient::new(fake, Arc::new(LogicalClock::new()));
        let rank = client.rank("server-1", 7000).await.unwrap();
        assert_eq!(rank, 1);
    }

    #[tokio::test]
    async fn list_round_trips_peer_listings() {
        let fake = Arc::new(FakeRef {
            next_rank: Mutex::new(1),
            list: Mutex::new(vec![PeerListing {
                name: "server-1".to_string(),
                rank: 1,
                port: 7000,
            }]),
        });
        let client = RefClient::new(fake, Arc::new(LogicalClock::new()));
        let list = client.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "server-1");
    }
}
