use std::{
    net::TcpListener,
    sync::{mpsc, Arc},
    thread,
    time::{Duration, Instant},
};

use zenoh_pico_rs::{
    open_with,
    platform::StdPlatform,
    protocol::{whatami::WhatAmI, ZenohID},
    result::ZError,
    transport::TransportStatus,
    Config, Credentials, Reply, Sample, Session,
};

const WAIT: Duration = Duration::from_secs(5);

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A listening peer and a client connected to it over TCP loopback.
fn pair(credentials: Option<Credentials>) -> (Session<StdPlatform>, Session<StdPlatform>) {
    let endpoint = format!("tcp/127.0.0.1:{}", free_port());

    let mut listen_cfg = Config::new(ZenohID::from(1u128), WhatAmI::Peer).listen(endpoint.as_str());
    listen_cfg.credentials = credentials.clone();
    let listener = thread::spawn(move || open_with(Arc::new(StdPlatform), &listen_cfg));

    let mut connect_cfg = Config::new(ZenohID::from(2u128), WhatAmI::Client).connect(endpoint.as_str());
    connect_cfg.credentials = credentials;
    let deadline = Instant::now() + WAIT;
    let client = loop {
        match open_with(Arc::new(StdPlatform), &connect_cfg) {
            Ok(session) => break session,
            Err(e) => {
                assert!(Instant::now() < deadline, "cannot connect: {e}");
                thread::sleep(Duration::from_millis(20));
            }
        }
    };

    let listener = listener.join().unwrap().unwrap();
    (listener, client)
}

#[test]
fn handshake_exchanges_ids() {
    let (a, b) = pair(None);
    assert_eq!(a.peer_zid(), Some(b.zid()));
    assert_eq!(b.peer_zid(), Some(a.zid()));
    assert_eq!(a.status(), TransportStatus::Established);
    assert_eq!(b.status(), TransportStatus::Established);
    a.close().unwrap();
    drop(b);
}

#[test]
fn publication_reaches_the_subscriber_once() {
    let (a, b) = pair(None);
    let (tx, rx) = mpsc::channel();
    a.declare_subscriber("a/b", move |sample: Sample| {
        let _ = tx.send(sample);
    })
    .unwrap();

    b.publish("a/b", b"hello").unwrap();
    let sample = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(sample.key, "a/b");
    assert_eq!(sample.payload, b"hello");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    let rid = b.declare_resource("a/b").unwrap();
    b.publish("a/b", b"by id").unwrap();
    let sample = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(sample.key, "a/b");
    assert_eq!(sample.payload, b"by id");
    b.undeclare_resource(rid).unwrap();

    a.close().unwrap();
}

#[test]
fn query_is_answered_by_the_remote_queryable() {
    let (a, b) = pair(Some(Credentials::new("user", "secret")));
    let (qtx, qrx) = mpsc::channel();
    b.declare_queryable("a/b", move |query| {
        let _ = qtx.send(query.predicate().to_owned());
        query.reply(query.key(), b"value").unwrap();
    })
    .unwrap();

    let (tx, rx) = mpsc::channel();
    a.query("a/b", "x=1", move |reply: Reply| {
        let _ = tx.send(reply);
    })
    .unwrap();

    assert_eq!(qrx.recv_timeout(WAIT).unwrap(), "x=1");
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        Reply::Data(Sample {
            key: "a/b".into(),
            payload: b"value".to_vec(),
        })
    );
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Reply::Final);

    a.close().unwrap();
}

#[test]
fn remote_close_terminates_the_session() {
    let (a, b) = pair(None);
    a.close().unwrap();

    let deadline = Instant::now() + WAIT;
    while b.status() == TransportStatus::Established {
        assert!(Instant::now() < deadline, "close not noticed");
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(b.status(), TransportStatus::Closed(Some(ZError::TxConnection)));
    assert_eq!(b.publish("a/b", b"x"), Err(ZError::TxConnection));
    assert_eq!(b.close(), Err(ZError::TxConnection));
}
