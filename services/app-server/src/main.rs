mod config;

use std::sync::Arc;
use std::time::Duration;

use chat_core::dispatcher::handle;
use chat_core::election;
use chat_core::ref_client::ZmqRefTransport;
use chat_core::replication;
use chat_core::state::ServerState;
use chat_protocol::encode_binary;
use chat_transport::{PeerReqPool, PubSocket, RepServer, SubLoop};
use config::ServerConfig;
use tracing_subscriber::EnvFilter;

type State = ServerState<ZmqRefTransport>;

#[tokio::main]
async fn main() {
    let cfg = ServerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_level.clone()))
        .init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), name = %cfg.name, "app-server starting");

    std::fs::create_dir_all(&cfg.data_dir).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to create data dir {:?}: {e}", cfg.data_dir);
        std::process::exit(1);
    });

    let ctx = zmq::Context::new();
    let publisher = Arc::new(
        PubSocket::connect(&ctx, &cfg.proxy_pub_addr).unwrap_or_else(|e| {
            eprintln!("FATAL: failed to connect publisher: {e}");
            std::process::exit(1);
        }),
    );

    let peer_pool = Arc::new(PeerReqPool::new());
    let ref_transport = ZmqRefTransport::new(peer_pool.clone(), cfg.ref_addr.clone(), 4_000);

    let state = Arc::new(State::new(
        cfg.host.clone(),
        cfg.rep_port,
        cfg.data_dir.clone(),
        publisher.clone(),
        ref_transport,
        peer_pool,
    ));

    // boot sequence: register with REF, determine the initial coordinator,
    // and pull a bootstrap sync if someone else already leads.
    match state.ref_client.rank(&cfg.host, cfg.rep_port).await {
        Ok(rank) => state.election.set_self_rank(rank).await,
        Err(e) => tracing::warn!(error = %e, "initial REF rank request failed"),
    }
    let initial_coordinator = state.election.determine_coordinator().await;
    state.coordinator.set(initial_coordinator.clone()).await;
    if initial_coordinator != cfg.host {
        state.bootstrap.sync_from(&initial_coordinator).await;
    }

    RepServer::serve(&format!("tcp://*:{}", cfg.rep_port), {
        let state = state.clone();
        move |req: Vec<u8>| {
            let state = state.clone();
            async move { handle(state, req).await }
        }
    })
    .unwrap_or_else(|e| {
        eprintln!("FATAL: failed to bind REP dispatcher: {e}");
        std::process::exit(1);
    });

    let sub_loop = SubLoop::start(&ctx, &cfg.proxy_sub_addr, &[replication::TOPIC, election::TOPIC])
        .unwrap_or_else(|e| {
            eprintln!("FATAL: failed to start subscriber loop: {e}");
            std::process::exit(1);
        });
    spawn_sub_consumer(state.clone(), sub_loop);
    spawn_heartbeat_loop(state.clone(), cfg.clone());
    spawn_coordination_loop(state.clone(), publisher.clone());
    spawn_coordinator_watch_loop(state.clone(), publisher.clone());

    shutdown_signal().await;
    tracing::info!("app-server shutting down");
}

fn spawn_sub_consumer(state: Arc<State>, mut sub_loop: SubLoop) {
    tokio::spawn(async move {
        while let Some((topic, payload)) = sub_loop.receiver.recv().await {
            match topic.as_str() {
                replication::TOPIC => state.replication.apply_bytes(&payload).await,
                election::TOPIC => apply_coordinator_update(&state, &payload).await,
                other => tracing::warn!(topic = other, "dropping message on unknown topic"),
            }
        }
    });
}

async fn apply_coordinator_update(state: &Arc<State>, payload: &[u8]) {
    let Ok(env) = chat_protocol::decode(payload) else {
        tracing::warn!("dropping malformed servers-topic envelope");
        return;
    };
    state.clock.observe(env.clock).await;
    let Some(coordinator) = env.get_str("coordinator").map(str::to_string) else {
        return;
    };
    if state.coordinator.set(coordinator.clone()).await && coordinator != state.self_name {
        let state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(chat_core::bootstrap::POST_ELECTION_SYNC_DELAY).await;
            state.bootstrap.sync_from(&coordinator).await;
        });
    }
}

fn spawn_heartbeat_loop(state: Arc<State>, cfg: ServerConfig) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            if let Err(e) = state.ref_client.heartbeat(&cfg.host, cfg.rep_port).await {
                tracing::warn!(error = %e, "heartbeat failed");
            }
        }
    });
}

/// Every [`chat_core::BERKELEY_TRIGGER_INTERVAL`] committed events, if this
/// node believes itself coordinator, run a Berkeley round and re-announce.
/// Mirrors `maybeTriggerBerkeley`'s call site in `publishLoop`.
fn spawn_coordination_loop(state: Arc<State>, publisher: Arc<PubSocket>) {
    tokio::spawn(async move {
        let mut last_triggered: u64 = 0;
        let mut interval = tokio::time::interval(Duration::from_secs(3));
        loop {
            interval.tick().await;
            let commits = state.replication.commit_count();
            if commits / chat_core::BERKELEY_TRIGGER_INTERVAL
                <= last_triggered / chat_core::BERKELEY_TRIGGER_INTERVAL
            {
                continue;
            }
            last_triggered = commits;

            let coordinator = state.coordinator.get().await.unwrap_or_else(|| {
                // Nobody has announced yet; fall back to the passive
                // determination rather than staying silent forever.
                String::new()
            });
            let is_self = if coordinator.is_empty() {
                state.election.determine_coordinator().await == state.self_name
            } else {
                coordinator == state.self_name
            };
            if !is_self {
                continue;
            }

            state.berkeley.run().await;
            announce_self(&state, &publisher).await;
        }
    });
}

/// Detects coordinator loss: if REF's `list` no longer carries the believed
/// coordinator, a lower-ranked peer has dropped out from under us, so run an
/// active election rather than waiting for the next Berkeley-triggered
/// re-announcement. Mirrors the lifecycle bullet "on detecting coordinator
/// loss, initiate election"; `server_sync.go` defines `startElectionProcess`
/// for exactly this but never wires a caller, so the call site here is this
/// implementation's own addition, not a copy of a dangling original one.
fn spawn_coordinator_watch_loop(state: Arc<State>, publisher: Arc<PubSocket>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let Some(believed) = state.coordinator.get().await else {
                continue;
            };
            if believed == state.self_name {
                continue;
            }
            let Ok(list) = state.ref_client.list().await else {
                continue;
            };
            if list.iter().any(|p| p.name == believed) {
                continue;
            }
            tracing::warn!(coordinator = %believed, "coordinator missing from REF list, starting election");
            if state.election.start_election().await.is_some() {
                announce_self(&state, &publisher).await;
            }
        }
    });
}

async fn announce_self(state: &Arc<State>, publisher: &Arc<PubSocket>) {
    state.coordinator.set(state.self_name.clone()).await;
    let env = state.election.announcement(&state.self_name).await;
    if let Ok(bytes) = encode_binary(&env) {
        if let Err(e) = publisher.publish(election::TOPIC.to_string(), bytes).await {
            tracing::warn!(error = %e, "failed to announce coordinator");
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
