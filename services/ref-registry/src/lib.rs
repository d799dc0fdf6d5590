pub mod registry;

pub use registry::Registry;

use std::collections::BTreeMap;
use std::sync::Arc;

use chat_protocol::Envelope;
use serde_json::Value;
use tracing::warn;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Handle one REF request, textual JSON in, textual JSON out. Exactly one
/// reply per request, matching strict REP discipline.
pub fn handle_request(registry: &Arc<Registry>, request: &[u8]) -> Vec<u8> {
    let req: Envelope = match serde_json::from_slice(request) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "failed to decode REF request");
            return error_reply(0);
        }
    };

    let mut data = BTreeMap::new();
    match req.service.as_str() {
        "rank" => {
            let user = req.get_str("user").unwrap_or_default();
            let port = chat_protocol::numeric::as_u64(req.get("port")) as u16;
            let rank = registry.rank(user, port, now());
            data.insert("rank".to_string(), Value::from(rank));
        }
        "heartbeat" => {
            let user = req.get_str("user").unwrap_or_default();
            let port = chat_protocol::numeric::as_u64(req.get("port")) as u16;
            registry.heartbeat(user, port, now());
            data.insert("status".to_string(), Value::String("ok".to_string()));
        }
        "list" => {
            let list = registry.list();
            data.insert("list".to_string(), serde_json::to_value(list).unwrap_or(Value::Array(vec![])));
        }
        _ => {
            data.insert(
                "error".to_string(),
                Value::String("serviço desconhecido".to_string()),
            );
        }
    }

    let reply = Envelope::new(req.service, data, req.clock + 1);
    serde_json::to_vec(&reply).unwrap_or_else(|_| error_reply(req.clock + 1))
}

fn error_reply(clock: u64) -> Vec<u8> {
    let mut data = BTreeMap::new();
    data.insert(
        "error".to_string(),
        Value::String("serviço desconhecido".to_string()),
    );
    let env = Envelope::new("error", data, clock);
    serde_json::to_vec(&env).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_yields_error_reply() {
        let registry = Arc::new(Registry::new());
        let req = Envelope::new("bogus", BTreeMap::new(), 1);
        let bytes = serde_json::to_vec(&req).unwrap();
        let reply_bytes = handle_request(&registry, &bytes);
        let reply: Envelope = serde_json::from_slice(&reply_bytes).unwrap();
        assert_eq!(reply.get_str("error"), Some("serviço desconhecido"));
    }

    #[test]
    fn rank_request_registers_and_returns_rank() {
        let registry = Arc::new(Registry::new());
        let mut data = BTreeMap::new();
        data.insert("user".to_string(), Value::String("server-1".to_string()));
        data.insert("port".to_string(), Value::from(7000));
        let req = Envelope::new("rank", data, 1);
        let bytes = serde_json::to_vec(&req).unwrap();
        let reply_bytes = handle_request(&registry, &bytes);
        let reply: Envelope = serde_json::from_slice(&reply_bytes).unwrap();
        assert_eq!(chat_protocol::numeric::as_u64(reply.get("rank")), 1);
    }
}
