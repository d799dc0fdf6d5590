//! `ServerState`: the single struct every task on an application server
//! shares. One mutex per collection, per the concurrency discipline in the
//! design doc — never hold two data mutexes at once; the logical clock
//! mutex may be acquired while holding a data mutex, never the reverse.

use std::path::PathBuf;
use std::sync::Arc;

use chat_transport::{PeerReqPool, PubSocket};

use crate::berkeley::BerkeleyRound;
use crate::bootstrap::BootstrapSync;
use crate::clock::LogicalClock;
use crate::domain::Domain;
use crate::election::{CoordinatorState, Election};
use crate::log_store::LogStore;
use crate::persist::JsonFile;
use crate::physical_clock::PhysicalClock;
use crate::ref_client::{RefClient, RefTransport};
use crate::replication::ReplicationEngine;

pub struct ServerState<T: RefTransport> {
    pub self_name: String,
    pub self_port: u16,
    pub clock: Arc<LogicalClock>,
    pub physical_clock: Arc<PhysicalClock>,
    pub coordinator: Arc<CoordinatorState>,
    pub replication: Arc<ReplicationEngine>,
    pub domain: Arc<Domain>,
    pub ref_client: Arc<RefClient<T>>,
    pub election: Arc<Election<T>>,
    pub berkeley: Arc<BerkeleyRound<T>>,
    pub bootstrap: Arc<BootstrapSync<T>>,
    pub peer_pool: Arc<PeerReqPool>,
}

impl<T: RefTransport> ServerState<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_name: String,
        self_port: u16,
        data_dir: PathBuf,
        publisher: Arc<PubSocket>,
        ref_transport: T,
        peer_pool: Arc<PeerReqPool>,
    ) -> Self {
        let clock = Arc::new(LogicalClock::new());
        let physical_clock = Arc::new(PhysicalClock::new());
        let coordinator = Arc::new(CoordinatorState::new());

        let logs_file: JsonFile<Vec<chat_protocol::LogEntry>> = JsonFile::new(data_dir.join("logs.json"));
        let log_store = Arc::new(LogStore::load(logs_file));
        let replication = Arc::new(ReplicationEngine::new(log_store, clock.clone(), publisher.clone()));

        let domain = Arc::new(Domain::load(&data_dir, publisher));
        let ref_client = Arc::new(RefClient::new(ref_transport, clock.clone()));
        let election = Arc::new(Election::new(
            ref_client.clone(),
            peer_pool.clone(),
            clock.clone(),
            self_name.clone(),
        ));
        let berkeley = Arc::new(BerkeleyRound::new(
            ref_client.clone(),
            peer_pool.clone(),
            clock.clone(),
            physical_clock.clone(),
            self_name.clone(),
        ));
        let bootstrap = Arc::new(BootstrapSync::new(
            ref_client.clone(),
            peer_pool.clone(),
            clock.clone(),
            replication.clone(),
        ));

        ServerState {
            self_name,
            self_port,
            clock,
            physical_clock,
            coordinator,
            replication,
            domain,
            ref_client,
            election,
            berkeley,
            bootstrap,
            peer_pool,
        }
    }
}
