//! Minimal domain layer: users, channels, subscriptions. Intentionally thin
//! — it exists to give the coordination core real events to replicate, not
//! to be a complete chat product. Grounded on
//! `server-unifiedddd/handlers.go`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chat_protocol::{encode_binary, Envelope, LogEntry};
use chat_transport::PubSocket;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use crate::persist::{CoalescingWriter, JsonFile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainReply {
    pub status: &'static str,
    pub fields: BTreeMap<String, Value>,
}

impl DomainReply {
    fn ok(fields: BTreeMap<String, Value>) -> Self {
        DomainReply { status: "sucesso", fields }
    }

    fn err(message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("message".to_string(), Value::String(message.to_string()));
        DomainReply { status: "erro", fields }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

type Subscriptions = HashMap<String, HashSet<String>>;

pub struct Domain {
    users: RwLock<HashSet<String>>,
    users_writer: CoalescingWriter<Vec<String>>,
    channels: RwLock<HashSet<String>>,
    channels_writer: CoalescingWriter<Vec<String>>,
    subscriptions: RwLock<Subscriptions>,
    subscriptions_writer: CoalescingWriter<Subscriptions>,
    publisher: Arc<PubSocket>,
}

impl Domain {
    pub fn load(data_dir: &std::path::Path, publisher: Arc<PubSocket>) -> Self {
        let users_file: JsonFile<Vec<String>> = JsonFile::new(data_dir.join("users.json"));
        let channels_file: JsonFile<Vec<String>> = JsonFile::new(data_dir.join("channels.json"));
        let subs_file: JsonFile<Subscriptions> = JsonFile::new(data_dir.join("subscriptions.json"));

        let users: HashSet<String> = users_file.load().unwrap_or_default().into_iter().collect();
        let channels: HashSet<String> = channels_file.load().unwrap_or_default().into_iter().collect();
        let subscriptions: Subscriptions = subs_file.load().unwrap_or_default();

        Domain {
            users_writer: CoalescingWriter::spawn(users_file, users.iter().cloned().collect()),
            users: RwLock::new(users),
            channels_writer: CoalescingWriter::spawn(channels_file, channels.iter().cloned().collect()),
            channels: RwLock::new(channels),
            subscriptions_writer: CoalescingWriter::spawn(subs_file, subscriptions.clone()),
            subscriptions: RwLock::new(subscriptions),
            publisher,
        }
    }

    /// Best-effort broadcast of `env` under `topic` — failures are logged,
    /// never propagated, matching `handlers.go`'s fire-and-forget
    /// `pubSocket.SendMessage` calls.
    async fn broadcast(&self, topic: String, env: Envelope) {
        let payload = match encode_binary(&env) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, %topic, "failed to encode broadcast envelope");
                return;
            }
        };
        if let Err(e) = self.publisher.publish(topic, payload).await {
            warn!(error = %e, "failed to publish broadcast");
        }
    }

    /// Returns `(reply, new_log_entry)`. The caller commits the entry
    /// through the replication engine; `login` only emits an entry on
    /// first-seen login (see §9 of the expanded spec).
    pub async fn login(&self, user: &str, clock: u64) -> (DomainReply, Option<LogEntry>) {
        let user = normalize(user);
        if user.is_empty() {
            return (DomainReply::err("usuário inválido"), None);
        }
        let mut users = self.users.write().await;
        let first_seen = users.insert(user.clone());
        self.users_writer.write(users.iter().cloned().collect());
        drop(users);

        let mut fields = BTreeMap::new();
        fields.insert("user".to_string(), Value::String(user.clone()));
        let reply = DomainReply::ok(fields);
        if !first_seen {
            return (reply, None);
        }
        let mut data = BTreeMap::new();
        data.insert("user".to_string(), Value::String(user));
        (reply, Some(LogEntry::new("login", data, clock)))
    }

    pub async fn create_channel(&self, channel: &str, clock: u64) -> (DomainReply, Option<LogEntry>) {
        let channel = normalize(channel);
        if channel.is_empty() {
            return (DomainReply::err("nome inválido"), None);
        }
        let mut channels = self.channels.write().await;
        if channels.contains(&channel) {
            return (DomainReply::err("canal já existe"), None);
        }
        channels.insert(channel.clone());
        self.channels_writer.write(channels.iter().cloned().collect());
        drop(channels);

        let mut fields = BTreeMap::new();
        fields.insert("channel".to_string(), Value::String(channel.clone()));
        let mut data = BTreeMap::new();
        data.insert("channel".to_string(), Value::String(channel));
        (DomainReply::ok(fields), Some(LogEntry::new("create_channel", data, clock)))
    }

    pub async fn list_channels(&self) -> DomainReply {
        let channels = self.channels.read().await;
        let mut fields = BTreeMap::new();
        fields.insert(
            "channels".to_string(),
            Value::Array(channels.iter().cloned().map(Value::String).collect()),
        );
        DomainReply::ok(fields)
    }

    /// Mirrors `handleListUsers` in `list_users.go`: a snapshot of every
    /// user that has ever logged in.
    pub async fn list_users(&self) -> DomainReply {
        let users = self.users.read().await;
        let mut fields = BTreeMap::new();
        fields.insert(
            "users".to_string(),
            Value::Array(users.iter().cloned().map(Value::String).collect()),
        );
        DomainReply::ok(fields)
    }

    pub async fn subscribe(&self, channel: &str, user: &str, clock: u64) -> (DomainReply, Option<LogEntry>) {
        let channel = normalize(channel);
        let user = normalize(user);
        if !self.channels.read().await.contains(&channel) {
            return (DomainReply::err("canal inexistente"), None);
        }
        let mut subs = self.subscriptions.write().await;
        subs.entry(channel.clone()).or_default().insert(user.clone());
        self.subscriptions_writer.write(subs.clone());
        drop(subs);

        let mut data = BTreeMap::new();
        data.insert("channel".to_string(), Value::String(channel));
        data.insert("user".to_string(), Value::String(user));
        (DomainReply::ok(BTreeMap::new()), Some(LogEntry::new("subscribe", data, clock)))
    }

    pub async fn unsubscribe(&self, channel: &str, user: &str, clock: u64) -> (DomainReply, Option<LogEntry>) {
        let channel = normalize(channel);
        let user = normalize(user);
        let mut subs = self.subscriptions.write().await;
        if let Some(members) = subs.get_mut(&channel) {
            members.remove(&user);
        }
        self.subscriptions_writer.write(subs.clone());
        drop(subs);

        let mut data = BTreeMap::new();
        data.insert("channel".to_string(), Value::String(channel));
        data.insert("user".to_string(), Value::String(user));
        (DomainReply::ok(BTreeMap::new()), Some(LogEntry::new("unsubscribe", data, clock)))
    }

    /// Validates the channel exists; publishing itself is unrestricted (no
    /// membership check), matching the older corpus variant — see §9
    /// design notes. Also broadcasts on the PUB socket under a topic equal
    /// to the channel name, matching `handleChannelPublish` in
    /// `handlers.go`.
    pub async fn publish(&self, channel: &str, user: &str, message: &str, clock: u64) -> (DomainReply, Option<LogEntry>) {
        let channel = normalize(channel);
        if !self.channels.read().await.contains(&channel) {
            return (DomainReply::err("canal inexistente"), None);
        }
        let user = normalize(user);
        let mut data = BTreeMap::new();
        data.insert("channel".to_string(), Value::String(channel.clone()));
        data.insert("user".to_string(), Value::String(user.clone()));
        data.insert("message".to_string(), Value::String(message.to_string()));

        let mut broadcast_data = BTreeMap::new();
        broadcast_data.insert("channel".to_string(), Value::String(channel.clone()));
        broadcast_data.insert("user".to_string(), Value::String(user));
        broadcast_data.insert("message".to_string(), Value::String(message.to_string()));
        self.broadcast(channel, Envelope::new("publish", broadcast_data, clock)).await;

        (DomainReply::ok(BTreeMap::new()), Some(LogEntry::new("publish", data, clock)))
    }

    /// Broadcasts on the PUB socket under a topic equal to the recipient's
    /// username, matching `handleMessage` in `handlers.go`.
    pub async fn message(&self, to: &str, from: &str, message: &str, clock: u64) -> (DomainReply, Option<LogEntry>) {
        let to = normalize(to);
        let from = normalize(from);
        let mut data = BTreeMap::new();
        data.insert("to".to_string(), Value::String(to.clone()));
        data.insert("from".to_string(), Value::String(from.clone()));
        data.insert("message".to_string(), Value::String(message.to_string()));

        let mut broadcast_data = BTreeMap::new();
        broadcast_data.insert("to".to_string(), Value::String(to.clone()));
        broadcast_data.insert("from".to_string(), Value::String(from));
        broadcast_data.insert("message".to_string(), Value::String(message.to_string()));
        self.broadcast(to, Envelope::new("message", broadcast_data, clock)).await;

        (DomainReply::ok(BTreeMap::new()), Some(LogEntry::new("private", data, clock)))
    }
}
