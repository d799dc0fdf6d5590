use chat_transport::{PeerReqPool, PubSocket, RepServer, SubLoop};

#[tokio::test]
async fn req_rep_round_trip_over_loopback() {
    let addr = "tcp://127.0.0.1:17000";
    RepServer::serve(addr, |req: Vec<u8>| async move {
        let mut reply = b"echo:".to_vec();
        reply.extend_from_slice(&req);
        reply
    })
    .unwrap();

    // give the bind a moment to complete before connecting
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let pool = PeerReqPool::new();
    let reply = pool
        .request(addr, b"hello".to_vec(), 2_000)
        .await
        .unwrap();
    assert_eq!(reply, b"echo:hello".to_vec());
}

#[tokio::test]
async fn pub_sub_delivers_only_subscribed_topics() {
    let ctx = zmq::Context::new();
    let addr = "tcp://127.0.0.1:17001";

    // Use the same socket as both sub-connect-target and pub-bind point via
    // an XPUB/XSUB-free direct PUB bind, since this test exercises the
    // wrapper types rather than a broker.
    let pub_socket = ctx.socket(zmq::PUB).unwrap();
    pub_socket.bind(addr).unwrap();
    // PubSocket wraps a *connecting* publisher; here we only need the raw
    // bind to act as the other end of SubLoop's connect, so we drive sends
    // directly instead of via PubSocket (which assumes connect()).
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut sub = SubLoop::start(&ctx, addr, &["wanted"]).unwrap();

    // subscriptions take a moment to propagate on the wire
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    pub_socket.send("unwanted", zmq::SNDMORE).unwrap();
    pub_socket.send("skip-me", 0).unwrap();
    pub_socket.send("wanted", zmq::SNDMORE).unwrap();
    pub_socket.send("payload", 0).unwrap();

    let (topic, payload) = tokio::time::timeout(std::time::Duration::from_secs(2), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic, "wanted");
    assert_eq!(payload, b"payload".to_vec());

    let _ = PubSocket::connect(&ctx, addr);
}
