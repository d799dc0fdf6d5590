//! Typed request/reply payloads for each `service` verb the cluster speaks.
//!
//! [`Envelope::data`] is an untyped map because it has to survive a codec
//! that can't express Rust enums directly (MessagePack maps, JSON objects).
//! [`Verb`] is the typed layer on top: a tagged sum type that mirrors the
//! dispatch table in the design doc, one variant per `service` string. This
//! is the redesign called out against the original's raw `map[string]any`
//! dispatch — callers that want type safety build a [`Verb`], the transport
//! layer still only ever sees an [`Envelope`].

use serde::{Deserialize, Serialize};

/// One entry in a `list` reply from the reference registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerListing {
    pub name: String,
    pub rank: u64,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "service", content = "data", rename_all = "snake_case")]
pub enum Verb {
    // --- REF dialog ---
    Rank { user: String, port: u16 },
    RankReply { rank: u64 },
    Heartbeat { user: String, port: u16 },
    HeartbeatReply { status: String },
    List {},
    ListReply { list: Vec<PeerListing> },

    // --- peer clock / election dialog ---
    Clock {},
    ClockReply { time: i64 },
    Adjust { adjust: i64 },
    AdjustReply { applied: i64, new_time: i64 },
    Election {},
    ElectionReply { election: String },

    // --- replication / coordination broadcasts ---
    Replicate {
        id: String,
        #[serde(rename = "type")]
        kind: String,
        data: serde_json::Map<String, serde_json::Value>,
    },
    ServersUpdate {
        coordinator: String,
    },

    // --- bootstrap sync ---
    SyncRequest {},
    SyncResponse {
        logs: Vec<crate::LogEntry>,
    },

    // --- minimal domain layer ---
    Login { user: String },
    CreateChannel { channel: String },
    ListChannels {},
    Subscribe { channel: String, user: String },
    Unsubscribe { channel: String, user: String },
    Publish { channel: String, user: String, message: String },
    Message { to: String, from: String, message: String },

    /// Catch-all for an unrecognized `service` — the dispatcher replies with
    /// the fixed error contract instead of producing one of these.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_tag_matches_service_field_name() {
        let v = Verb::Rank {
            user: "alice".into(),
            port: 7000,
        };
        let j = serde_json::to_value(&v).unwrap();
        assert_eq!(j["service"], "rank");
        assert_eq!(j["data"]["user"], "alice");
    }

    #[test]
    fn unrecognized_service_parses_as_unknown() {
        let j = serde_json::json!({"service": "does_not_exist", "data": {}});
        let v: Verb = serde_json::from_value(j).unwrap();
        assert_eq!(v, Verb::Unknown);
    }
}
