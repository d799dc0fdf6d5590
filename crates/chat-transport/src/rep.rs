//! The REP-socket dispatch loop shared by every service that answers
//! request/reply dialogs (REF, application servers answering peers, the
//! application server's client-facing dispatcher).
//!
//! `zmq::Socket` is synchronous, so the accept/recv/send loop runs on a
//! dedicated blocking thread; each request is handed to an async handler via
//! [`tokio::runtime::Handle::block_on`], bridging back into the runtime that
//! owns the rest of the server's state.

use std::future::Future;

use tracing::error;

use crate::error::TransportError;

pub struct RepServer;

impl RepServer {
    /// Bind a REP socket on `addr` and serve `handler` forever. `handler`
    /// receives the raw request bytes and must produce the raw reply bytes;
    /// exactly one reply is sent per request, matching strict REP
    /// discipline — a handler that panics mid-request would leave the
    /// socket unable to recv again, so handlers are expected not to panic.
    pub fn serve<F, Fut>(addr: &str, handler: F) -> Result<(), TransportError>
    where
        F: Fn(Vec<u8>) -> Fut + Send + 'static,
        Fut: Future<Output = Vec<u8>>,
    {
        let ctx = zmq::Context::new();
        let socket = ctx
            .socket(zmq::REP)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_linger(0)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .bind(addr)
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        let rt_handle = tokio::runtime::Handle::current();
        std::thread::Builder::new()
            .name(format!("rep-loop-{addr}"))
            .spawn(move || loop {
                let request = match socket.recv_bytes(0) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(error = %e, "rep socket recv failed, stopping loop");
                        break;
                    }
                };
                let reply = rt_handle.block_on(handler(request));
                if let Err(e) = socket.send(reply, 0) {
                    error!(error = %e, "rep socket send failed, stopping loop");
                    break;
                }
            })
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        Ok(())
    }
}
