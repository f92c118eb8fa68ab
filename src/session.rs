//! The application-facing API: declarations, publications, queries and replies over
//! one transport session.
//!
//! Callbacks run on the read thread of the session. They may call back into the
//! session, including [`Session::close`].

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
    platform::Platform,
    protocol::{
        core::{QueryConsolidation, ResKey, SubInfo, SubMode, NO_RESOURCE_ID},
        zenoh::{self, Data, Declaration, Declare, Pull, ZenohBody, ZenohMessage},
        ZenohID,
    },
    result::{ZError, ZResult},
    transport::{TransportHandler, TransportSession, TransportStatus},
    Config,
};

pub mod queryable {
    pub const ALL_KINDS: u64 = 0x01;
    pub const STORAGE: u64 = 0x02;
    pub const EVAL: u64 = 0x04;
}

pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A publication, as delivered to a subscriber or carried by a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Data(Sample),
    /// Every queryable reached has answered; nothing follows.
    Final,
}

pub(crate) trait ReplySink: Send + Sync {
    fn send_reply(&self, qid: u64, key: &str, payload: &[u8]) -> ZResult<()>;
}

/// A query received by a queryable.
pub struct Query {
    key: String,
    predicate: String,
    qid: u64,
    session: Weak<dyn ReplySink>,
}

impl Query {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Sends one reply to the querier.
    pub fn reply(&self, key: &str, payload: &[u8]) -> ZResult<()> {
        let session = self.session.upgrade().ok_or(ZError::TxConnection)?;
        session.send_reply(self.qid, key, payload)
    }
}

impl core::fmt::Debug for Query {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("predicate", &self.predicate)
            .field("qid", &self.qid)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    id: u64,
    key: String,
    mode: SubMode,
}

impl Subscriber {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> SubMode {
        self.mode
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queryable {
    id: u64,
    key: String,
}

impl Queryable {
    pub fn key(&self) -> &str {
        &self.key
    }
}

struct Subscription {
    key: String,
    callback: Callback<Sample>,
}

struct QueryableEntry {
    key: String,
    callback: Callback<Query>,
}

#[derive(Default)]
struct SessionState {
    /// Source of resource, subscriber, queryable, query and pull ids. Never 0.
    next_id: u64,
    local_resources: HashMap<u64, String>,
    /// Resources declared by each remote peer, under the id that peer chose.
    remote_resources: HashMap<(Option<SocketAddr>, u64), String>,
    subscriptions: HashMap<u64, Subscription>,
    queryables: HashMap<u64, QueryableEntry>,
    pending_queries: HashMap<u64, Callback<Reply>>,
}

impl SessionState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn local_rid(&self, key: &str) -> Option<u64> {
        self.local_resources
            .iter()
            .find(|(_, k)| k.as_str() == key)
            .map(|(rid, _)| *rid)
    }

    /// The full key a remote `ResKey` stands for.
    fn resolve(&self, peer: Option<SocketAddr>, key: &ResKey<'_>) -> ZResult<String> {
        let suffix = key.suffix.unwrap_or_default();
        if key.rid == NO_RESOURCE_ID {
            return Ok(suffix.to_owned());
        }
        match self.remote_resources.get(&(peer, key.rid)) {
            Some(prefix) => Ok(format!("{prefix}{suffix}")),
            None => {
                zerror!("Unknown remote resource id {}", key.rid);
                Err(ZError::ResourceDeclarationFailed)
            }
        }
    }
}

struct SessionCore<P: Platform> {
    me: Weak<SessionCore<P>>,
    transport: Arc<TransportSession<P>>,
    state: Mutex<SessionState>,
}

impl<P: Platform> SessionCore<P> {
    fn send<'m>(&self, msg: impl Into<ZenohMessage<'m>>) -> ZResult<()> {
        self.transport
            .send_zenoh_message(&msg.into(), self.transport.reliability())
    }

    fn declare(&self, decl: Declaration<'_>) -> ZResult<()> {
        self.send(Declare::single(decl))
    }

    fn on_declare(&self, declare: Declare<'_>, peer: Option<SocketAddr>) -> ZResult<()> {
        let mut state = self.state.lock();
        for decl in declare.declarations {
            match decl {
                Declaration::Resource { rid, key } => {
                    let name = state.resolve(peer, &key)?;
                    zdebug!("Remote resource {} is {}", rid, name.as_str());
                    state.remote_resources.insert((peer, rid), name);
                }
                Declaration::ForgetResource { rid } => {
                    state.remote_resources.remove(&(peer, rid));
                }
                _ => zdebug!("Ignoring remote declaration"),
            }
        }
        Ok(())
    }

    fn on_data(&self, data: Data<'_>, peer: Option<SocketAddr>) -> ZResult<()> {
        let (key, callbacks) = {
            let state = self.state.lock();
            let key = state.resolve(peer, &data.key)?;
            let callbacks: Vec<_> = state
                .subscriptions
                .values()
                .filter(|s| s.key == key)
                .map(|s| s.callback.clone())
                .collect();
            (key, callbacks)
        };
        if callbacks.is_empty() {
            zdebug!("No subscriber for {}", key.as_str());
        }
        for callback in callbacks {
            callback(Sample {
                key: key.clone(),
                payload: data.payload.to_vec(),
            });
        }
        Ok(())
    }

    fn on_query(&self, query: zenoh::Query<'_>, peer: Option<SocketAddr>) -> ZResult<()> {
        let (key, callbacks) = {
            let state = self.state.lock();
            let key = state.resolve(peer, &query.key)?;
            let callbacks: Vec<_> = state
                .queryables
                .values()
                .filter(|q| q.key == key)
                .map(|q| q.callback.clone())
                .collect();
            (key, callbacks)
        };
        let session: Weak<dyn ReplySink> = self.me.clone();
        for callback in callbacks {
            callback(Query {
                key: key.clone(),
                predicate: query.predicate.to_owned(),
                qid: query.qid,
                session: session.clone(),
            });
        }
        self.send(zenoh::Reply::final_for(query.qid))
    }

    fn on_reply(&self, reply: zenoh::Reply<'_>, peer: Option<SocketAddr>) -> ZResult<()> {
        let (callback, reply) = {
            let mut state = self.state.lock();
            match reply.data {
                Some(data) => {
                    let Some(callback) = state.pending_queries.get(&reply.qid).cloned() else {
                        zwarn!("Reply to unknown query {}", reply.qid);
                        return Ok(());
                    };
                    let sample = Sample {
                        key: state.resolve(peer, &data.key)?,
                        payload: data.payload.to_vec(),
                    };
                    (callback, Reply::Data(sample))
                }
                None => {
                    let Some(callback) = state.pending_queries.remove(&reply.qid) else {
                        zwarn!("Final reply to unknown query {}", reply.qid);
                        return Ok(());
                    };
                    (callback, Reply::Final)
                }
            }
        };
        callback(reply);
        Ok(())
    }
}

impl<P: Platform> ReplySink for SessionCore<P> {
    fn send_reply(&self, qid: u64, key: &str, payload: &[u8]) -> ZResult<()> {
        self.send(zenoh::Reply::new(qid, ResKey::name(key), payload))
    }
}

impl<P: Platform> TransportHandler for SessionCore<P> {
    fn handle_message(&self, msg: ZenohMessage<'_>, peer: Option<SocketAddr>) -> ZResult<()> {
        match msg.body {
            ZenohBody::Declare(declare) => self.on_declare(declare, peer),
            ZenohBody::Data(data) => self.on_data(data, peer),
            ZenohBody::Query(query) => self.on_query(query, peer),
            ZenohBody::Reply(reply) => self.on_reply(reply, peer),
            ZenohBody::Pull(_) => {
                zdebug!("Ignoring pull request");
                Ok(())
            }
        }
    }
}

/// An open zenoh session. Dropping it closes it.
pub struct Session<P: Platform> {
    core: Arc<SessionCore<P>>,
}

impl<P: Platform> Session<P> {
    /// Establishes the transport described by `cfg` and starts receiving on it.
    pub fn open(platform: Arc<P>, cfg: &Config) -> ZResult<Self> {
        let transport = TransportSession::open(platform, cfg)?;
        let core = Arc::new_cyclic(|me| SessionCore {
            me: me.clone(),
            transport: transport.clone(),
            state: Mutex::new(SessionState::default()),
        });
        if let Err(e) = transport.start(core.clone()) {
            zerror!("Cannot start the session tasks: {}", e);
            if transport.close().is_err() {
                zwarn!("Session closed with an error");
            }
            return Err(e);
        }
        Ok(Session { core })
    }

    pub fn zid(&self) -> ZenohID {
        self.core.transport.zid()
    }

    /// The id of the remote side of a unicast session.
    pub fn peer_zid(&self) -> Option<ZenohID> {
        self.core.transport.peer_zid()
    }

    pub fn status(&self) -> TransportStatus {
        self.core.transport.status()
    }

    /// Declares `key` as a resource; publications on it then travel as the returned id.
    pub fn declare_resource(&self, key: &str) -> ZResult<u64> {
        let rid = self.core.state.lock().next_id();
        self.core.declare(Declaration::Resource {
            rid,
            key: ResKey::name(key),
        })?;
        self.core.state.lock().local_resources.insert(rid, key.to_owned());
        Ok(rid)
    }

    pub fn undeclare_resource(&self, rid: u64) -> ZResult<()> {
        if self.core.state.lock().local_resources.remove(&rid).is_none() {
            zwarn!("Resource {} was not declared", rid);
            return Err(ZError::ResourceDeclarationFailed);
        }
        self.core.declare(Declaration::ForgetResource { rid })
    }

    fn subscribe<F>(&self, key: &str, mode: SubMode, callback: F) -> ZResult<Subscriber>
    where
        F: Fn(Sample) + Send + Sync + 'static,
    {
        let info = SubInfo { mode, period: None };
        self.core.declare(Declaration::Subscriber {
            key: ResKey::name(key),
            info,
        })?;

        let mut state = self.core.state.lock();
        let id = state.next_id();
        state.subscriptions.insert(
            id,
            Subscription {
                key: key.to_owned(),
                callback: Arc::new(callback),
            },
        );
        Ok(Subscriber {
            id,
            key: key.to_owned(),
            mode,
        })
    }

    /// Calls `callback` for every publication on exactly `key`.
    pub fn declare_subscriber<F>(&self, key: &str, callback: F) -> ZResult<Subscriber>
    where
        F: Fn(Sample) + Send + Sync + 'static,
    {
        self.subscribe(key, SubMode::Push, callback)
    }

    /// Like [`Session::declare_subscriber`], but publications are only sent on
    /// [`Session::pull`].
    pub fn declare_pull_subscriber<F>(&self, key: &str, callback: F) -> ZResult<Subscriber>
    where
        F: Fn(Sample) + Send + Sync + 'static,
    {
        self.subscribe(key, SubMode::Pull, callback)
    }

    pub fn undeclare_subscriber(&self, sub: Subscriber) -> ZResult<()> {
        let still_used = {
            let mut state = self.core.state.lock();
            state.subscriptions.remove(&sub.id);
            state.subscriptions.values().any(|s| s.key == sub.key)
        };
        if still_used {
            return Ok(());
        }
        self.core.declare(Declaration::ForgetSubscriber {
            key: ResKey::name(&sub.key),
        })
    }

    /// Asks for the publications held for a pull subscriber.
    pub fn pull(&self, sub: &Subscriber) -> ZResult<()> {
        if sub.mode != SubMode::Pull {
            zwarn!("Pull on push subscriber {}", sub.key.as_str());
        }
        let pull_id = self.core.state.lock().next_id();
        self.core.send(Pull {
            key: ResKey::name(&sub.key),
            pull_id,
            max_samples: None,
            is_final: true,
        })
    }

    /// Calls `callback` for every query on exactly `key`.
    pub fn declare_queryable<F>(&self, key: &str, callback: F) -> ZResult<Queryable>
    where
        F: Fn(Query) + Send + Sync + 'static,
    {
        self.core.declare(Declaration::Queryable {
            key: ResKey::name(key),
            kind: queryable::EVAL,
        })?;

        let mut state = self.core.state.lock();
        let id = state.next_id();
        state.queryables.insert(
            id,
            QueryableEntry {
                key: key.to_owned(),
                callback: Arc::new(callback),
            },
        );
        Ok(Queryable {
            id,
            key: key.to_owned(),
        })
    }

    pub fn undeclare_queryable(&self, queryable: Queryable) -> ZResult<()> {
        let still_used = {
            let mut state = self.core.state.lock();
            state.queryables.remove(&queryable.id);
            state.queryables.values().any(|q| q.key == queryable.key)
        };
        if still_used {
            return Ok(());
        }
        self.core.declare(Declaration::ForgetQueryable {
            key: ResKey::name(&queryable.key),
        })
    }

    pub fn publish(&self, key: &str, payload: &[u8]) -> ZResult<()> {
        let rid = self.core.state.lock().local_rid(key);
        let key = match rid {
            Some(rid) => ResKey::rid(rid),
            None => ResKey::name(key),
        };
        self.core.send(Data::new(key, payload))
    }

    /// Sends a query on `key`. `callback` gets every reply, then [`Reply::Final`].
    pub fn query<F>(&self, key: &str, predicate: &str, callback: F) -> ZResult<()>
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        let qid = {
            let mut state = self.core.state.lock();
            let qid = state.next_id();
            state.pending_queries.insert(qid, Arc::new(callback));
            qid
        };
        let sent = self.core.send(zenoh::Query {
            key: ResKey::name(key),
            predicate,
            qid,
            target: None,
            consolidation: QueryConsolidation::default(),
        });
        if sent.is_err() {
            self.core.state.lock().pending_queries.remove(&qid);
        }
        sent
    }

    pub fn send_reply(&self, query: &Query, key: &str, payload: &[u8]) -> ZResult<()> {
        self.core.send_reply(query.qid, key, payload)
    }

    /// Closes the transport. Fails with the cause if the session had already
    /// terminated on an error.
    pub fn close(self) -> ZResult<()> {
        self.core.transport.close()
    }
}

impl<P: Platform> Drop for Session<P> {
    fn drop(&mut self) {
        if let Err(e) = self.core.transport.close() {
            zdebug!("Dropped session had terminated: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        iobuf::ZSlice,
        link::create_link,
        platform::mock::{peer, MockPlatform},
        protocol::{
            transport::{FramePayload, TransportBody, TransportMessage},
            whatami::WhatAmI,
        },
        transport::TransportParams,
        Z_SN_RESOLUTION,
    };

    fn session(p: &Arc<MockPlatform>) -> Session<MockPlatform> {
        let mut link = create_link(p.clone(), "udp/127.0.0.1:7447".parse().unwrap()).unwrap();
        link.open().unwrap();
        let params = TransportParams {
            peer_zid: Some(ZenohID::from(2u128)),
            peer_whatami: Some(WhatAmI::Peer),
            lease: 10_000,
            sn_resolution: Z_SN_RESOLUTION,
            initial_sn_tx: 0,
            initial_sn_rx: 0,
        };
        let transport = Arc::new(TransportSession::new(
            p.clone(),
            link,
            ZenohID::from(1u128),
            params,
        ));
        let core = Arc::new_cyclic(|me| SessionCore {
            me: me.clone(),
            transport,
            state: Mutex::new(SessionState::default()),
        });
        Session { core }
    }

    /// The zenoh messages carried by every frame sent so far, still encoded.
    fn sent(p: &MockPlatform) -> Vec<Vec<u8>> {
        p.sent
            .lock()
            .iter()
            .filter_map(|b| match TransportMessage::decode(&mut ZSlice::new(b)).unwrap().body {
                TransportBody::Frame(f) => match f.payload {
                    FramePayload::Messages(m) => Some(m.to_vec()),
                    FramePayload::Fragment { .. } => None,
                },
                _ => None,
            })
            .collect()
    }

    fn body(bytes: &[u8]) -> ZenohBody<'_> {
        ZenohMessage::decode(&mut ZSlice::new(bytes)).unwrap().body
    }

    fn deliver<'a>(s: &Session<MockPlatform>, msg: impl Into<ZenohMessage<'a>>) -> ZResult<()> {
        s.core.handle_message(msg.into(), Some(peer(1)))
    }

    #[test]
    fn subscriber_gets_exactly_its_key() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let got = Arc::new(Mutex::new(Vec::new()));
        let g = got.clone();
        let sub = s
            .declare_subscriber("a/b", move |sample| g.lock().push(sample))
            .unwrap();
        assert_eq!(sub.mode(), SubMode::Push);

        let sent = sent(&p);
        match body(&sent[0]) {
            ZenohBody::Declare(d) => assert_eq!(
                d.declarations[0],
                Declaration::Subscriber {
                    key: ResKey::name("a/b"),
                    info: SubInfo::default(),
                }
            ),
            other => panic!("unexpected {other:?}"),
        }

        deliver(&s, Data::new(ResKey::name("a/b"), b"hello")).unwrap();
        deliver(&s, Data::new(ResKey::name("a/c"), b"other")).unwrap();
        assert_eq!(
            *got.lock(),
            vec![Sample {
                key: "a/b".into(),
                payload: b"hello".to_vec(),
            }]
        );

        s.undeclare_subscriber(sub).unwrap();
        deliver(&s, Data::new(ResKey::name("a/b"), b"late")).unwrap();
        assert_eq!(got.lock().len(), 1);
    }

    #[test]
    fn remote_resource_ids_are_resolved() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let got = Arc::new(Mutex::new(Vec::new()));
        let g = got.clone();
        s.declare_subscriber("a/b", move |sample: Sample| g.lock().push(sample.key))
            .unwrap();

        deliver(
            &s,
            Declare::single(Declaration::Resource {
                rid: 5,
                key: ResKey::name("a"),
            }),
        )
        .unwrap();
        let key = ResKey {
            rid: 5,
            suffix: Some("/b"),
        };
        deliver(&s, Data::new(key, b"x")).unwrap();
        assert_eq!(*got.lock(), vec!["a/b".to_owned()]);

        assert_eq!(
            deliver(&s, Data::new(ResKey::rid(9), b"x")),
            Err(ZError::ResourceDeclarationFailed)
        );

        deliver(&s, Declare::single(Declaration::ForgetResource { rid: 5 })).unwrap();
        assert_eq!(
            deliver(&s, Data::new(key, b"x")),
            Err(ZError::ResourceDeclarationFailed)
        );
    }

    #[test]
    fn publications_use_the_declared_resource_id() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let rid = s.declare_resource("a/b").unwrap();
        s.publish("a/b", b"1").unwrap();
        s.publish("c", b"2").unwrap();

        let sent = sent(&p);
        assert_eq!(sent.len(), 3);
        match body(&sent[0]) {
            ZenohBody::Declare(d) => assert_eq!(
                d.declarations[0],
                Declaration::Resource {
                    rid,
                    key: ResKey::name("a/b"),
                }
            ),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(body(&sent[1]), ZenohBody::Data(d) if d.key == ResKey::rid(rid)));
        assert!(matches!(body(&sent[2]), ZenohBody::Data(d) if d.key == ResKey::name("c")));

        s.undeclare_resource(rid).unwrap();
        assert_eq!(
            s.undeclare_resource(rid),
            Err(ZError::ResourceDeclarationFailed)
        );
        s.publish("a/b", b"3").unwrap();
        let sent = self::sent(&p);
        assert!(matches!(body(&sent[4]), ZenohBody::Data(d) if d.key == ResKey::name("a/b")));
    }

    #[test]
    fn query_collects_replies_until_final() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let got = Arc::new(Mutex::new(Vec::new()));
        let g = got.clone();
        s.query("a/b", "x=1", move |reply| g.lock().push(reply))
            .unwrap();

        let sent = sent(&p);
        let qid = match body(&sent[0]) {
            ZenohBody::Query(q) => {
                assert_eq!(q.key, ResKey::name("a/b"));
                assert_eq!(q.predicate, "x=1");
                q.qid
            }
            other => panic!("unexpected {other:?}"),
        };

        deliver(&s, zenoh::Reply::new(qid, ResKey::name("a/b"), b"v")).unwrap();
        deliver(&s, zenoh::Reply::final_for(qid)).unwrap();
        deliver(&s, zenoh::Reply::new(qid, ResKey::name("a/b"), b"late")).unwrap();
        deliver(&s, zenoh::Reply::final_for(qid + 1)).unwrap();

        assert_eq!(
            *got.lock(),
            vec![
                Reply::Data(Sample {
                    key: "a/b".into(),
                    payload: b"v".to_vec(),
                }),
                Reply::Final,
            ]
        );
    }

    #[test]
    fn queryable_replies_then_finishes() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let predicates = Arc::new(Mutex::new(Vec::new()));
        let seen = predicates.clone();
        s.declare_queryable("a/b", move |q: Query| {
            seen.lock().push(q.predicate().to_owned());
            q.reply(q.key(), b"v").unwrap();
        })
        .unwrap();

        let query = zenoh::Query {
            key: ResKey::name("a/b"),
            predicate: "x=1",
            qid: 7,
            target: None,
            consolidation: QueryConsolidation::default(),
        };
        deliver(&s, query).unwrap();
        assert_eq!(*predicates.lock(), vec!["x=1".to_owned()]);

        let sent = sent(&p);
        match body(&sent[0]) {
            ZenohBody::Declare(d) => assert!(matches!(
                d.declarations[0],
                Declaration::Queryable { kind: queryable::EVAL, .. }
            )),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            body(&sent[1]),
            ZenohBody::Reply(zenoh::Reply::new(7, ResKey::name("a/b"), b"v"))
        );
        assert_eq!(body(&sent[2]), ZenohBody::Reply(zenoh::Reply::final_for(7)));
    }

    #[test]
    fn query_without_queryable_is_still_finished() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let query = zenoh::Query {
            key: ResKey::name("nobody"),
            predicate: "",
            qid: 3,
            target: None,
            consolidation: QueryConsolidation::default(),
        };
        deliver(&s, query).unwrap();
        let sent = sent(&p);
        assert_eq!(sent.len(), 1);
        assert_eq!(body(&sent[0]), ZenohBody::Reply(zenoh::Reply::final_for(3)));
    }

    #[test]
    fn pull_subscriber_pulls() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let sub = s.declare_pull_subscriber("a/b", |_| {}).unwrap();
        assert_eq!(sub.mode(), SubMode::Pull);
        s.pull(&sub).unwrap();

        let sent = sent(&p);
        assert!(matches!(
            body(&sent[0]),
            ZenohBody::Declare(d) if matches!(
                d.declarations[0],
                Declaration::Subscriber { info: SubInfo { mode: SubMode::Pull, .. }, .. }
            )
        ));
        match body(&sent[1]) {
            ZenohBody::Pull(pull) => {
                assert_eq!(pull.key, ResKey::name("a/b"));
                assert!(pull.is_final);
            }
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn dropping_a_terminated_session_releases_its_link() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        s.core.transport.start(s.core.clone()).unwrap();
        p.push_inbound(&[0x1f, 0x00], peer(1));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while s.status() == TransportStatus::Established {
            assert!(std::time::Instant::now() < deadline, "session did not terminate");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(matches!(s.status(), TransportStatus::Closed(Some(_))));
        assert_eq!(p.open_sockets(), 1);

        drop(s);
        assert_eq!(p.open_sockets(), 0);
    }

    #[test]
    fn closed_session_refuses_to_publish() {
        let p = Arc::new(MockPlatform::default());
        let s = session(&p);
        let core = s.core.clone();
        s.close().unwrap();
        assert_eq!(
            core.transport.status(),
            TransportStatus::Closed(None)
        );
        assert_eq!(
            core.send(Data::new(ResKey::name("a/b"), b"x")),
            Err(ZError::TxConnection)
        );
    }
}
