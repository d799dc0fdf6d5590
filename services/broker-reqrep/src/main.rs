//! Request/reply broker: a ROUTER/DEALER blind forwarder. Clients connect
//! REQ sockets to the router side; application servers' REP sockets connect
//! behind the dealer side. `zmq::proxy` shuttles multipart frames (with
//! envelope addressing) in both directions without inspecting them.

use std::env;

use tracing_subscriber::EnvFilter;

fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let router_addr = env::var("BROKER_ROUTER_ADDR").unwrap_or_else(|_| "tcp://*:5559".to_owned());
    let dealer_addr = env::var("BROKER_DEALER_ADDR").unwrap_or_else(|_| "tcp://*:5560".to_owned());

    let ctx = zmq::Context::new();
    let router = ctx.socket(zmq::ROUTER).expect("failed to create ROUTER socket");
    let dealer = ctx.socket(zmq::DEALER).expect("failed to create DEALER socket");

    router.bind(&router_addr).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to bind ROUTER on {router_addr}: {e}");
        std::process::exit(1);
    });
    dealer.bind(&dealer_addr).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to bind DEALER on {dealer_addr}: {e}");
        std::process::exit(1);
    });

    tracing::info!(router_addr, dealer_addr, "broker-reqrep starting proxy loop");

    loop {
        match zmq::proxy(&router, &dealer) {
            Ok(()) => tracing::warn!("zmq::proxy returned cleanly, restarting"),
            Err(e) => tracing::error!(error = %e, "zmq::proxy failed, restarting"),
        }
    }
}
