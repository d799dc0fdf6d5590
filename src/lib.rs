//! Root crate for the workspace's cluster-level integration tests. It holds
//! no runtime code of its own — `tests/integration/cluster_scenarios.rs`
//! wires real `chat-core`/`chat-transport`/`ref-registry` pieces together
//! over loopback sockets to exercise the cluster end to end.
