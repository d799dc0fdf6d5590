//! The distributed coordination core shared by every application server:
//! logical and physical clocks, replication, leader election, Berkeley
//! synchronization, bootstrap sync, and the REP dispatch loop that ties them
//! to the wire.

pub mod berkeley;
pub mod bootstrap;
pub mod clock;
pub mod dispatcher;
pub mod domain;
pub mod election;
pub mod log_store;
pub mod persist;
pub mod physical_clock;
pub mod ref_client;
pub mod replication;
pub mod state;

/// Every N committed replication events, the coordinator runs a Berkeley
/// round — matches the `publishLoop` trigger in `server_sync.go`.
pub const BERKELEY_TRIGGER_INTERVAL: u64 = 10;
