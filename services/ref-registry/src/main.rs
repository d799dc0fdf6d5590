use std::env;
use std::sync::Arc;
use std::time::Duration;

use ref_registry::{handle_request, Registry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let rep_port: u16 = env::var("SERVER_REP_PORT")
        .unwrap_or_else(|_| "6000".to_owned())
        .parse()
        .unwrap_or_else(|e| {
            eprintln!("FATAL: invalid SERVER_REP_PORT: {e}");
            std::process::exit(1);
        });

    let registry = Arc::new(Registry::new());

    spawn_rep_loop(registry.clone(), rep_port);
    spawn_prune_loop(registry.clone());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), rep_port, "ref-registry starting");
    shutdown_signal().await;
    tracing::info!("ref-registry shutting down");
}

fn spawn_rep_loop(registry: Arc<Registry>, rep_port: u16) {
    std::thread::spawn(move || {
        let ctx = zmq::Context::new();
        let socket = ctx.socket(zmq::REP).expect("failed to create REP socket");
        socket.set_linger(0).ok();
        socket
            .bind(&format!("tcp://*:{rep_port}"))
            .unwrap_or_else(|e| {
                eprintln!("FATAL: failed to bind REF REP socket: {e}");
                std::process::exit(1);
            });
        loop {
            let request = match socket.recv_bytes(0) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, "REF recv failed, stopping loop");
                    break;
                }
            };
            let reply = handle_request(&registry, &request);
            if let Err(e) = socket.send(reply, 0) {
                tracing::error!(error = %e, "REF send failed, stopping loop");
                break;
            }
        }
    });
}

fn spawn_prune_loop(registry: Arc<Registry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            registry.prune(chrono::Utc::now().timestamp());
        }
    });
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
