//! Wire types and codec for the cluster's envelope protocol.
//!
//! An [`Envelope`] is the only thing that crosses a socket boundary. It is
//! encoded either as MessagePack (peer-to-peer, replication, persistence) or
//! as JSON (dialog with the reference registry). [`decode`] tries binary
//! first and falls back to text, matching the two encoders actually in use
//! across the cluster.

pub mod error;
pub mod numeric;
pub mod transport;
pub mod verbs;

pub use transport::RefTransport;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::ProtocolError;

/// The universal wire message. Every request, reply, and broadcast is one of
/// these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub service: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default)]
    pub clock: u64,
}

fn default_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Envelope {
    pub fn new(service: impl Into<String>, data: BTreeMap<String, Value>, clock: u64) -> Self {
        Envelope {
            service: service.into(),
            data,
            timestamp: default_timestamp(),
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// An entry in the replicated, append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default)]
    pub clock: u64,
}

impl LogEntry {
    pub fn new(kind: impl Into<String>, data: BTreeMap<String, Value>, clock: u64) -> Self {
        LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            data,
            timestamp: default_timestamp(),
            clock,
        }
    }
}

/// A live server as tracked by the reference registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub rank: u64,
    pub port: u16,
    #[serde(default)]
    pub last_seen: i64,
}

/// Encode an envelope as compact MessagePack. Used for peer-to-peer and
/// replication traffic.
pub fn encode_binary(env: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    rmp_serde::to_vec_named(env).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Encode an envelope as JSON. Used for dialog with the reference registry.
pub fn encode_text(env: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(env).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode an envelope, trying binary first and falling back to text.
///
/// A structural failure to parse as MessagePack, or a successfully-parsed
/// envelope with an empty `service` field, triggers the JSON fallback.
pub fn decode(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    if let Ok(env) = rmp_serde::from_slice::<Envelope>(bytes) {
        if !env.service.is_empty() {
            return Ok(env);
        }
    }
    serde_json::from_slice::<Envelope>(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
