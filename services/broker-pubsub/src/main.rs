//! Pub/sub broker: an XSUB/XPUB proxy. Publishers (application servers)
//! connect to the XSUB ingress; subscribers connect to the XPUB egress.
//! Grounded on `proxy.go` — `zmq::proxy` restarted on error, with the
//! subscribe-all bootstrap frame `broker.go` sends so early publishes
//! aren't dropped before the first real subscriber attaches.

use std::env;

use tracing_subscriber::EnvFilter;

fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let xsub_port: u16 = env::var("XSUB_PORT")
        .unwrap_or_else(|_| "5557".to_owned())
        .parse()
        .unwrap_or_else(|e| {
            eprintln!("FATAL: invalid XSUB_PORT: {e}");
            std::process::exit(1);
        });
    let xpub_port: u16 = env::var("XPUB_PORT")
        .unwrap_or_else(|_| "5558".to_owned())
        .parse()
        .unwrap_or_else(|e| {
            eprintln!("FATAL: invalid XPUB_PORT: {e}");
            std::process::exit(1);
        });

    let ctx = zmq::Context::new();
    let xsub = ctx.socket(zmq::XSUB).expect("failed to create XSUB socket");
    let xpub = ctx.socket(zmq::XPUB).expect("failed to create XPUB socket");

    xsub.bind(&format!("tcp://*:{xsub_port}")).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to bind XSUB: {e}");
        std::process::exit(1);
    });
    xpub.bind(&format!("tcp://*:{xpub_port}")).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to bind XPUB: {e}");
        std::process::exit(1);
    });

    // \x01 = subscribe to everything. Sent once so messages published before
    // the first real subscriber connects aren't silently dropped.
    xsub.send(&[1u8], 0).expect("failed to send subscribe-all frame");

    tracing::info!(xsub_port, xpub_port, "broker-pubsub starting proxy loop");

    loop {
        match zmq::proxy(&xsub, &xpub) {
            Ok(()) => {
                tracing::warn!("zmq::proxy returned cleanly, restarting");
            }
            Err(e) => {
                tracing::error!(error = %e, "zmq::proxy failed, restarting");
            }
        }
    }
}
