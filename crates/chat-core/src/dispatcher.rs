//! The REP dispatch loop: one binary envelope in, `observe()`, switch on
//! `service`, one binary envelope out. Grounded on `repLoop` in
//! `server_sync.go`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chat_protocol::{decode, encode_binary, Envelope};
use serde_json::Value;
use tracing::{error, warn};

use crate::ref_client::RefTransport;
use crate::state::ServerState;

/// Handle one raw request and produce the raw reply. Never panics on
/// malformed input — a decode failure yields the same error contract a
/// well-formed-but-unknown service would.
pub async fn handle<T: RefTransport>(state: Arc<ServerState<T>>, request: Vec<u8>) -> Vec<u8> {
    let env = match decode(&request) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "failed to decode request, replying with error contract");
            return unknown_service_reply(&state).await;
        }
    };
    state.clock.observe(env.clock).await;

    let reply_env = match env.service.as_str() {
        "clock" => clock_reply(&state).await,
        "adjust" => adjust_reply(&state, &env).await,
        "election" => election_reply(&state).await,
        "sync_request" => sync_reply(&state).await,
        "login" => domain_reply(&state, login_handler(&state, &env).await).await,
        "channel" => domain_reply(&state, create_channel_handler(&state, &env).await).await,
        "channels" => list_channels_reply(&state).await,
        "users" => list_users_reply(&state).await,
        "subscribe" => domain_reply(&state, subscribe_handler(&state, &env).await).await,
        "unsubscribe" => domain_reply(&state, unsubscribe_handler(&state, &env).await).await,
        "publish" => domain_reply(&state, publish_handler(&state, &env).await).await,
        "message" => domain_reply(&state, message_handler(&state, &env).await).await,
        _ => return unknown_service_reply(&state).await,
    };

    match encode_binary(&reply_env) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to encode reply");
            Vec::new()
        }
    }
}

async fn unknown_service_reply<T: RefTransport>(state: &Arc<ServerState<T>>) -> Vec<u8> {
    let mut data = BTreeMap::new();
    data.insert("status".to_string(), Value::String("erro".to_string()));
    data.insert(
        "message".to_string(),
        Value::String("serviço desconhecido".to_string()),
    );
    let clock = state.clock.tick_for_send().await;
    let env = Envelope::new("error", data, clock);
    encode_binary(&env).unwrap_or_default()
}

async fn clock_reply<T: RefTransport>(state: &Arc<ServerState<T>>) -> Envelope {
    let time = state.physical_clock.now().await;
    let mut data = BTreeMap::new();
    data.insert("time".to_string(), Value::from(time));
    let clock = state.clock.tick_for_send().await;
    Envelope::new("clock", data, clock)
}

async fn adjust_reply<T: RefTransport>(state: &Arc<ServerState<T>>, env: &Envelope) -> Envelope {
    let adjust = chat_protocol::numeric::as_i64(env.get("adjust"));
    let new_time = state.physical_clock.apply_adjustment(adjust).await;
    let mut data = BTreeMap::new();
    data.insert("applied".to_string(), Value::from(adjust));
    data.insert("new_time".to_string(), Value::from(new_time));
    let clock = state.clock.tick_for_send().await;
    Envelope::new("adjust", data, clock)
}

async fn election_reply<T: RefTransport>(state: &Arc<ServerState<T>>) -> Envelope {
    let mut data = BTreeMap::new();
    data.insert("election".to_string(), Value::String("OK".to_string()));
    let clock = state.clock.tick_for_send().await;
    Envelope::new("election", data, clock)
}

async fn sync_reply<T: RefTransport>(state: &Arc<ServerState<T>>) -> Envelope {
    let logs = state.replication.log_store().snapshot().await;
    let mut data = BTreeMap::new();
    data.insert("logs".to_string(), serde_json::to_value(logs).unwrap_or(Value::Array(vec![])));
    let clock = state.clock.tick_for_send().await;
    Envelope::new("sync_response", data, clock)
}

async fn list_channels_reply<T: RefTransport>(state: &Arc<ServerState<T>>) -> Envelope {
    let reply = state.domain.list_channels().await;
    domain_reply_to_envelope(state, reply).await
}

async fn list_users_reply<T: RefTransport>(state: &Arc<ServerState<T>>) -> Envelope {
    let reply = state.domain.list_users().await;
    domain_reply_to_envelope(state, reply).await
}

async fn login_handler<T: RefTransport>(state: &Arc<ServerState<T>>, env: &Envelope) -> crate::domain::DomainReply {
    let user = env.get_str("user").unwrap_or_default();
    let clock = state.clock.tick_for_send().await;
    let (reply, entry) = state.domain.login(user, clock).await;
    if let Some(entry) = entry {
        state.replication.commit(entry).await;
    }
    reply
}

async fn create_channel_handler<T: RefTransport>(state: &Arc<ServerState<T>>, env: &Envelope) -> crate::domain::DomainReply {
    let channel = env.get_str("channel").unwrap_or_default();
    let clock = state.clock.tick_for_send().await;
    let (reply, entry) = state.domain.create_channel(channel, clock).await;
    if let Some(entry) = entry {
        state.replication.commit(entry).await;
    }
    reply
}

async fn subscribe_handler<T: RefTransport>(state: &Arc<ServerState<T>>, env: &Envelope) -> crate::domain::DomainReply {
    let channel = env.get_str("channel").unwrap_or_default();
    let user = env.get_str("user").unwrap_or_default();
    let clock = state.clock.tick_for_send().await;
    let (reply, entry) = state.domain.subscribe(channel, user, clock).await;
    if let Some(entry) = entry {
        state.replication.commit(entry).await;
    }
    reply
}

async fn unsubscribe_handler<T: RefTransport>(state: &Arc<ServerState<T>>, env: &Envelope) -> crate::domain::DomainReply {
    let channel = env.get_str("channel").unwrap_or_default();
    let user = env.get_str("user").unwrap_or_default();
    let clock = state.clock.tick_for_send().await;
    let (reply, entry) = state.domain.unsubscribe(channel, user, clock).await;
    if let Some(entry) = entry {
        state.replication.commit(entry).await;
    }
    reply
}

async fn publish_handler<T: RefTransport>(state: &Arc<ServerState<T>>, env: &Envelope) -> crate::domain::DomainReply {
    let channel = env.get_str("channel").unwrap_or_default();
    let user = env.get_str("user").unwrap_or_default();
    let message = env.get_str("message").unwrap_or_default();
    let clock = state.clock.tick_for_send().await;
    let (reply, entry) = state.domain.publish(channel, user, message, clock).await;
    if let Some(entry) = entry {
        state.replication.commit(entry).await;
    }
    reply
}

async fn message_handler<T: RefTransport>(state: &Arc<ServerState<T>>, env: &Envelope) -> crate::domain::DomainReply {
    let to = env.get_str("to").unwrap_or_default();
    let from = env.get_str("from").unwrap_or_default();
    let message = env.get_str("message").unwrap_or_default();
    let clock = state.clock.tick_for_send().await;
    let (reply, entry) = state.domain.message(to, from, message, clock).await;
    if let Some(entry) = entry {
        state.replication.commit(entry).await;
    }
    reply
}

async fn domain_reply<T: RefTransport>(state: &Arc<ServerState<T>>, reply: crate::domain::DomainReply) -> Envelope {
    domain_reply_to_envelope(state, reply).await
}

async fn domain_reply_to_envelope<T: RefTransport>(state: &Arc<ServerState<T>>, reply: crate::domain::DomainReply) -> Envelope {
    let mut data = reply.fields;
    data.insert("status".to_string(), Value::String(reply.status.to_string()));
    let clock = state.clock.tick_for_send().await;
    Envelope::new("reply", data, clock)
}
