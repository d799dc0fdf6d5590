//! Publisher and subscriber wrappers for the cluster's broadcast topics
//! (`replicate`, `servers`, and per-channel/per-user application topics).
//!
//! Both sides speak two-frame multipart messages: `(topic, payload)`.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::TransportError;

/// A publisher connected to the broker's XSUB ingress. Sends are serialized
/// through a mutex because one socket cannot be written from two threads at
/// once.
pub struct PubSocket {
    socket: Arc<StdMutex<zmq::Socket>>,
}

impl PubSocket {
    pub fn connect(ctx: &zmq::Context, addr: &str) -> Result<Self, TransportError> {
        let socket = ctx
            .socket(zmq::PUB)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        socket
            .set_linger(0)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        socket
            .connect(addr)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(PubSocket {
            socket: Arc::new(StdMutex::new(socket)),
        })
    }

    /// Publish `payload` under `topic` as a two-frame multipart message.
    pub async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<(), TransportError> {
        let socket = self.socket.clone();
        tokio::task::spawn_blocking(move || {
            let socket = socket.lock().expect("pub socket mutex poisoned");
            socket
                .send(topic.as_bytes(), zmq::SNDMORE)
                .map_err(|e| TransportError::Send(e.to_string()))?;
            socket
                .send(payload, 0)
                .map_err(|e| TransportError::Send(e.to_string()))
        })
        .await
        .expect("blocking task panicked")
    }
}

/// A subscriber loop running on a dedicated blocking thread, forwarding each
/// `(topic, payload)` pair to an async consumer via an mpsc channel.
pub struct SubLoop {
    pub receiver: mpsc::Receiver<(String, Vec<u8>)>,
}

impl SubLoop {
    /// Connect to `addr`, subscribe to each prefix in `topics`, and start
    /// forwarding received multipart messages. The blocking recv loop runs
    /// until the socket errors out or the channel's receiver is dropped.
    pub fn start(
        ctx: &zmq::Context,
        addr: &str,
        topics: &[&str],
    ) -> Result<Self, TransportError> {
        let socket = ctx
            .socket(zmq::SUB)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        socket
            .set_linger(0)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        socket
            .connect(addr)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        for topic in topics {
            socket
                .set_subscribe(topic.as_bytes())
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        }

        let (tx, rx) = mpsc::channel(256);
        std::thread::spawn(move || {
            loop {
                let parts = match socket.recv_multipart(0) {
                    Ok(parts) => parts,
                    Err(e) => {
                        error!(error = %e, "sub socket recv failed, stopping loop");
                        break;
                    }
                };
                if parts.len() != 2 {
                    warn!(frames = parts.len(), "dropping malformed multipart message");
                    continue;
                }
                let topic = String::from_utf8_lossy(&parts[0]).into_owned();
                let payload = parts[1].clone();
                if tx.blocking_send((topic, payload)).is_err() {
                    break;
                }
            }
        });

        Ok(SubLoop { receiver: rx })
    }
}
