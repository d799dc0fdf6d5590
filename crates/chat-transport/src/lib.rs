//! ZeroMQ transport primitives shared by every service in the cluster.
//!
//! `zmq`'s sockets are synchronous and `!Send` across await points, so every
//! primitive here either owns its socket on a dedicated blocking thread
//! (`RepServer`, `SubLoop`) or serializes access to a long-lived socket
//! behind a mutex (`PeerReqPool`, `PubSocket`).

pub mod error;
pub mod peer_req;
pub mod pubsub;
pub mod rep;

pub use error::TransportError;
pub use peer_req::PeerReqPool;
pub use pubsub::{PubSocket, SubLoop};
pub use rep::RepServer;

/// Default receive timeout for short request/reply dialogs (REF, election,
/// clock probes).
pub const DEFAULT_REQ_TIMEOUT_MS: i32 = 4_000;
