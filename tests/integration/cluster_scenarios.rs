//! Cluster-level scenarios, each exercising real sockets over loopback
//! rather than calling library functions directly in-process. Every piece
//! (brokers, REP dispatch loops, REQ pools) is the same code the binaries in
//! `services/*` wire together — these tests just assemble a smaller cluster
//! by hand instead of spawning separate OS processes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chat_core::clock::LogicalClock;
use chat_core::election::Election;
use chat_core::log_store::LogStore;
use chat_core::persist::JsonFile;
use chat_core::physical_clock::PhysicalClock;
use chat_core::ref_client::RefClient;
use chat_core::replication::ReplicationEngine;
use chat_protocol::{decode, encode_binary, encode_text, Envelope, LogEntry};
use chat_test_utils::{loopback_addr, next_loopback_port, FakeRefRegistry};
use chat_transport::{PeerReqPool, PubSocket, RepServer, SubLoop};
use serde_json::Value;

fn temp_log_store() -> Arc<LogStore> {
    let path = std::env::temp_dir().join(format!(
        "chat-cluster-test-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .subsec_nanos()
    ));
    Arc::new(LogStore::load(JsonFile::new(path)))
}

/// A PUB socket connected to nothing a test needs to observe; several
/// `ReplicationEngine`s require one even when the scenario never calls
/// `commit()` on them.
fn throwaway_publisher(ctx: &zmq::Context) -> Arc<PubSocket> {
    let addr = loopback_addr(next_loopback_port());
    Arc::new(PubSocket::connect(ctx, &addr).expect("connect should succeed"))
}

// ---------------------------------------------------------------------------
// S1 + S2: replication fan-out is at-least-once and idempotent.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replication_fans_out_and_applies_duplicates_once() {
    let ctx = zmq::Context::new();
    let xsub_addr = loopback_addr(next_loopback_port());
    let xpub_addr = loopback_addr(next_loopback_port());
    spawn_broker(&xsub_addr, &xpub_addr);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let publisher = Arc::new(PubSocket::connect(&ctx, &xsub_addr).unwrap());
    let origin = ReplicationEngine::new(temp_log_store(), Arc::new(LogicalClock::new()), publisher);

    let follower_log = temp_log_store();
    let follower = ReplicationEngine::new(
        follower_log.clone(),
        Arc::new(LogicalClock::new()),
        throwaway_publisher(&ctx),
    );

    let mut sub = SubLoop::start(&ctx, &xpub_addr, &[chat_core::replication::TOPIC]).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    origin
        .commit(LogEntry::new("publish", BTreeMap::new(), 1))
        .await;

    let (topic, payload) = tokio::time::timeout(Duration::from_secs(2), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic, chat_core::replication::TOPIC);

    // Apply twice — the second application of the exact same wire message
    // must be a no-op, matching S2's idempotent-duplicate requirement.
    follower.apply_bytes(&payload).await;
    follower.apply_bytes(&payload).await;

    assert_eq!(follower_log.len().await, 1);
    assert_eq!(origin.commit_count(), 1);
}

fn spawn_broker(xsub_addr: &str, xpub_addr: &str) {
    let ctx = zmq::Context::new();
    let xsub = ctx.socket(zmq::XSUB).unwrap();
    xsub.bind(xsub_addr).unwrap();
    let xpub = ctx.socket(zmq::XPUB).unwrap();
    xpub.bind(xpub_addr).unwrap();
    xsub.send(&[1u8], 0).unwrap();
    std::thread::spawn(move || {
        let _ = zmq::proxy(&xsub, &xpub);
    });
}

// ---------------------------------------------------------------------------
// S3: election falls back to self only once the lower-ranked peer is
// genuinely unreachable.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn election_yields_while_a_lower_rank_peer_answers() {
    let fake_ref = FakeRefRegistry::new();
    let alive_port = next_loopback_port();
    RepServer::serve(&format!("tcp://*:{alive_port}"), |_req: Vec<u8>| async move {
        let mut data = BTreeMap::new();
        data.insert("election".to_string(), Value::String("OK".to_string()));
        encode_text(&Envelope::new("election", data, 1)).unwrap()
    })
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    fake_ref.register("127.0.0.1", alive_port).await; // rank 1

    let clock = Arc::new(LogicalClock::new());
    let ref_client = Arc::new(RefClient::new(fake_ref, clock.clone()));
    let election = Election::new(ref_client, Arc::new(PeerReqPool::new()), clock, "self".to_string());
    election.set_self_rank(5).await;

    assert_eq!(election.start_election().await, None);
}

#[tokio::test]
async fn election_declares_self_coordinator_once_every_lower_rank_peer_is_dead() {
    let fake_ref = FakeRefRegistry::new();
    // Nothing is bound on this port — simulates the coordinator's death.
    fake_ref.register("127.0.0.1", next_loopback_port()).await; // rank 1

    let clock = Arc::new(LogicalClock::new());
    let ref_client = Arc::new(RefClient::new(fake_ref, clock.clone()));
    let election = Election::new(ref_client, Arc::new(PeerReqPool::new()), clock, "self".to_string());
    election.set_self_rank(5).await;

    assert_eq!(election.start_election().await, Some("self".to_string()));
}

// ---------------------------------------------------------------------------
// S4: a Berkeley round pulls both nodes' offsets toward their average.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn berkeley_round_converges_self_and_peer_offsets() {
    let peer_physical = Arc::new(PhysicalClock::new());
    let peer_logical = Arc::new(LogicalClock::new());
    let peer_port = next_loopback_port();

    RepServer::serve(&format!("tcp://*:{peer_port}"), {
        let peer_physical = peer_physical.clone();
        let peer_logical = peer_logical.clone();
        move |req: Vec<u8>| {
            let peer_physical = peer_physical.clone();
            let peer_logical = peer_logical.clone();
            async move { clock_peer_reply(&peer_physical, &peer_logical, &req).await }
        }
    })
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Drive the peer noticeably ahead so the round has real work to do.
    peer_physical.apply_adjustment(1_000).await;

    let fake_ref = FakeRefRegistry::new();
    fake_ref.register("127.0.0.1", peer_port).await;

    let self_physical = Arc::new(PhysicalClock::new());
    let clock = Arc::new(LogicalClock::new());
    let ref_client = Arc::new(RefClient::new(fake_ref, clock.clone()));
    let berkeley = chat_core::berkeley::BerkeleyRound::new(
        ref_client,
        Arc::new(PeerReqPool::new()),
        clock,
        self_physical.clone(),
        "self".to_string(),
    );

    let self_before = self_physical.current_offset().await;
    berkeley.run().await;
    let self_after = self_physical.current_offset().await;
    let peer_after = peer_physical.current_offset().await;

    // The peer was 1000s ahead; the round should have pulled it back down
    // and pushed self up, landing both near the same offset.
    assert!(self_after > self_before);
    assert!(peer_after < 1_000);
    assert!((self_after - peer_after).abs() <= 2);
}

async fn clock_peer_reply(physical: &Arc<PhysicalClock>, logical: &Arc<LogicalClock>, req: &[u8]) -> Vec<u8> {
    let env = decode(req).expect("test peer received malformed envelope");
    logical.observe(env.clock).await;
    match env.service.as_str() {
        "clock" => {
            let time = physical.now().await;
            let mut data = BTreeMap::new();
            data.insert("time".to_string(), Value::from(time));
            let clock = logical.tick_for_send().await;
            encode_text(&Envelope::new("clock", data, clock)).unwrap()
        }
        "adjust" => {
            let adjust = chat_protocol::numeric::as_i64(env.get("adjust"));
            let new_time = physical.apply_adjustment(adjust).await;
            let mut data = BTreeMap::new();
            data.insert("applied".to_string(), Value::from(adjust));
            data.insert("new_time".to_string(), Value::from(new_time));
            let clock = logical.tick_for_send().await;
            encode_text(&Envelope::new("adjust", data, clock)).unwrap()
        }
        other => panic!("unexpected service in berkeley test: {other}"),
    }
}

// ---------------------------------------------------------------------------
// S5: a joining node pulls the coordinator's full log via bootstrap sync.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_sync_pulls_the_coordinators_full_log() {
    let ctx = zmq::Context::new();
    let coordinator_log = temp_log_store();
    let coordinator_clock = Arc::new(LogicalClock::new());
    let coordinator_replication = ReplicationEngine::new(
        coordinator_log.clone(),
        coordinator_clock.clone(),
        throwaway_publisher(&ctx),
    );
    coordinator_replication
        .commit(LogEntry::new("create_channel", BTreeMap::new(), 1))
        .await;
    coordinator_replication
        .commit(LogEntry::new("login", BTreeMap::new(), 2))
        .await;

    let coordinator_port = next_loopback_port();
    RepServer::serve(&format!("tcp://*:{coordinator_port}"), {
        let coordinator_log = coordinator_log.clone();
        let coordinator_clock = coordinator_clock.clone();
        move |req: Vec<u8>| {
            let coordinator_log = coordinator_log.clone();
            let coordinator_clock = coordinator_clock.clone();
            async move { sync_reply(&coordinator_log, &coordinator_clock, &req).await }
        }
    })
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fake_ref = FakeRefRegistry::new();
    fake_ref.register("127.0.0.1", coordinator_port).await;

    let joiner_clock = Arc::new(LogicalClock::new());
    let joiner_log = temp_log_store();
    let joiner_replication = Arc::new(ReplicationEngine::new(
        joiner_log.clone(),
        joiner_clock.clone(),
        throwaway_publisher(&ctx),
    ));
    let ref_client = Arc::new(RefClient::new(fake_ref, joiner_clock.clone()));
    let bootstrap = chat_core::bootstrap::BootstrapSync::new(
        ref_client,
        Arc::new(PeerReqPool::new()),
        joiner_clock,
        joiner_replication,
    );

    bootstrap.sync_from("127.0.0.1").await;

    assert_eq!(joiner_log.len().await, 2);
}

async fn sync_reply(log_store: &Arc<LogStore>, clock: &Arc<LogicalClock>, req: &[u8]) -> Vec<u8> {
    let env = decode(req).expect("test coordinator received malformed envelope");
    clock.observe(env.clock).await;
    let logs = log_store.snapshot().await;
    let mut data = BTreeMap::new();
    data.insert("logs".to_string(), serde_json::to_value(logs).unwrap());
    let reply_clock = clock.tick_for_send().await;
    encode_binary(&Envelope::new("sync_response", data, reply_clock)).unwrap()
}

// ---------------------------------------------------------------------------
// S6: the reference registry prunes servers that stop heartbeating.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ref_registry_prunes_servers_past_the_heartbeat_window() {
    let registry = ref_registry::Registry::new();
    registry.rank("server-a", 7000, 0);
    registry.rank("server-b", 7001, 0);

    // server-a heartbeats again well inside the window; server-b never does.
    registry.heartbeat("server-a", 7000, 10);
    registry.prune(ref_registry::registry::EXPIRY_SECONDS + 1);

    let names: Vec<_> = registry.list().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["server-a".to_string()]);
}
