//! The Open/Accept exchange that establishes a unicast session.
//!
//! ```text
//!     opener                listener
//!       |       OPEN           |
//!       |--------------------->|
//!       |      ACCEPT          |
//!       |<---------------------|
//!       |   (or CLOSE)         |
//! ```
//!
//! Both sides propose a lease and a sequence-number resolution; the smaller of each
//! wins. Each side picks its own initial sequence number.

use std::time::{Duration, Instant};

use heapless::Vec;

use crate::{
    iobuf::ZSlice,
    link::Link,
    platform::Platform,
    protocol::{
        core::{property, Property},
        transport::{
            close::reason, Accept, Close, Open, TransportBody, TransportMessage,
            Z_OPEN_MAX_PROPERTIES,
        },
        ZenohID,
    },
    result::{ZError, ZResult},
    Config, Z_PROTO_VERSION, Z_SN_RESOLUTION,
};

use super::{
    rx::{read_batch, RX_BUF_SIZE},
    seq::random_sn,
    tx::{write_batch, TxBatch},
    TransportParams,
};

pub(crate) struct Unicast<'a, P: Platform> {
    link: &'a Link<P>,
    batch: TxBatch,
    rx: std::vec::Vec<u8>,
}

impl<'a, P: Platform> Unicast<'a, P> {
    pub fn new(link: &'a Link<P>) -> Self {
        Unicast {
            link,
            batch: TxBatch::new(),
            rx: vec![0; RX_BUF_SIZE],
        }
    }

    fn send(&mut self, msg: TransportBody<'_>) -> ZResult<()> {
        let msg = TransportMessage::from(msg);
        write_batch(self.link, &mut self.batch, |b| msg.encode(b))
    }

    fn refuse(&mut self, zid: &ZenohID, reason: u8) -> ZError {
        let close = Close {
            pid: Some(zid.as_slice()),
            reason,
            link_only: false,
        };
        if self.send(TransportBody::Close(close)).is_err() {
            zwarn!("Failed to send Z_CLOSE");
        }
        ZError::TransportOpenFailed
    }

    /// Waits for one batch, until `deadline` if there is one.
    fn recv(&mut self, deadline: Option<Instant>) -> ZResult<usize> {
        let expired = || deadline.is_some_and(|d| Instant::now() >= d);
        loop {
            if let Some((n, _)) = read_batch(self.link, &mut self.rx, expired)? {
                return Ok(n);
            }
            if expired() {
                zwarn!("No answer from the remote side");
                return Err(ZError::TransportOpenFailed);
            }
        }
    }

    /// Opens the session from our side.
    pub fn open_handshake(&mut self, cfg: &Config) -> ZResult<TransportParams> {
        let initial_sn_tx = random_sn(Z_SN_RESOLUTION);

        let mut properties: Vec<Property<'_>, Z_OPEN_MAX_PROPERTIES> = Vec::new();
        if let Some(c) = &cfg.credentials {
            for (key, value) in [(property::USER, &c.user), (property::PASSWORD, &c.password)] {
                properties
                    .push(Property {
                        key,
                        value: value.as_bytes(),
                    })
                    .map_err(|_| ZError::NoBufferSpace)?;
            }
        }

        zdebug!("Sending Z_OPEN");
        self.send(TransportBody::Open(Open {
            version: Z_PROTO_VERSION,
            whatami: cfg.mode,
            pid: cfg.id.as_slice(),
            lease: cfg.lease,
            initial_sn: initial_sn_tx,
            sn_resolution: Z_SN_RESOLUTION,
            properties,
        }))?;

        let deadline = Instant::now() + Duration::from_millis(cfg.lease);
        let n = self.recv(Some(deadline))?;
        let accept = match TransportMessage::decode(&mut ZSlice::new(&self.rx[..n]))?.body {
            TransportBody::Accept(accept) => accept,
            TransportBody::Close(close) => {
                zwarn!("Open refused, reason {}", close.reason);
                return Err(ZError::TransportOpenFailed);
            }
            _ => {
                zerror!("Expected Z_ACCEPT");
                return Err(ZError::UnexpectedMessage);
            }
        };
        zdebug!("Received Z_ACCEPT");

        // Nothing in the Accept may be larger than what the Open proposed.
        if accept.opid != cfg.id.as_slice() || accept.sn_resolution > Z_SN_RESOLUTION {
            zerror!("Z_ACCEPT does not answer our Z_OPEN");
            return Err(ZError::UnexpectedMessage);
        }
        if accept.sn_resolution == 0 || accept.initial_sn >= accept.sn_resolution {
            zerror!("Z_ACCEPT initial sn {} out of range", accept.initial_sn);
            return Err(ZError::UnexpectedMessage);
        }

        Ok(TransportParams {
            peer_zid: Some(ZenohID::try_from_slice(accept.apid)?),
            peer_whatami: Some(accept.whatami),
            lease: cfg.lease.min(accept.lease),
            sn_resolution: accept.sn_resolution,
            initial_sn_tx: initial_sn_tx % accept.sn_resolution,
            initial_sn_rx: accept.initial_sn,
        })
    }

    /// Waits for the remote side to open, then accepts.
    pub fn accept_handshake(&mut self, cfg: &Config) -> ZResult<TransportParams> {
        let n = self.recv(None)?;
        let open = match TransportMessage::decode(&mut ZSlice::new(&self.rx[..n]))?.body {
            TransportBody::Open(open) => open,
            _ => {
                zerror!("Expected Z_OPEN");
                return Err(ZError::UnexpectedMessage);
            }
        };
        zdebug!("Received Z_OPEN");

        let version = open.version;
        let whatami = open.whatami;
        let peer_zid = ZenohID::try_from_slice(open.pid)?;
        let lease = cfg.lease.min(open.lease);
        let proposed_resolution = open.sn_resolution;
        let sn_resolution = Z_SN_RESOLUTION.min(proposed_resolution);
        let initial_sn_rx = open.initial_sn;
        let authorized = match &cfg.credentials {
            Some(c) => {
                open.property(property::USER) == Some(c.user.as_bytes())
                    && open.property(property::PASSWORD) == Some(c.password.as_bytes())
            }
            None => true,
        };
        // Releases the receive buffer for the answer.
        drop(open);

        if version != Z_PROTO_VERSION {
            zwarn!("Unsupported protocol version {}", version);
            return Err(self.refuse(&cfg.id, reason::UNSUPPORTED));
        }
        if !authorized {
            zwarn!("Z_OPEN with wrong credentials");
            return Err(self.refuse(&cfg.id, reason::INVALID));
        }
        if sn_resolution == 0 || initial_sn_rx >= proposed_resolution {
            zwarn!("Z_OPEN initial sn {} out of range", initial_sn_rx);
            return Err(self.refuse(&cfg.id, reason::INVALID));
        }

        let initial_sn_tx = random_sn(sn_resolution);
        zdebug!("Sending Z_ACCEPT");
        self.send(TransportBody::Accept(Accept {
            whatami: cfg.mode,
            opid: peer_zid.as_slice(),
            apid: cfg.id.as_slice(),
            lease,
            initial_sn: initial_sn_tx,
            sn_resolution,
        }))?;

        Ok(TransportParams {
            peer_zid: Some(peer_zid),
            peer_whatami: Some(whatami),
            lease,
            sn_resolution,
            initial_sn_tx,
            initial_sn_rx: initial_sn_rx % sn_resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        iobuf::Writer,
        link::create_link,
        platform::mock::{peer, MockPlatform},
        protocol::whatami::WhatAmI,
        Credentials,
    };

    fn udp_link(p: &Arc<MockPlatform>) -> Link<MockPlatform> {
        let mut link = create_link(p.clone(), "udp/127.0.0.1:7447".parse().unwrap()).unwrap();
        link.open().unwrap();
        link
    }

    fn encode(msg: TransportBody<'_>) -> std::vec::Vec<u8> {
        let mut buf = std::vec::Vec::new();
        TransportMessage::from(msg).encode(&mut buf).unwrap();
        buf
    }

    fn sent(p: &MockPlatform, i: usize) -> std::vec::Vec<u8> {
        p.sent.lock()[i].clone()
    }

    fn cfg(id: u128) -> Config {
        Config::new(ZenohID::from(id), WhatAmI::Peer).lease(2_000)
    }

    #[test]
    fn open_negotiates_the_smaller_values() {
        let p = Arc::new(MockPlatform::default());
        let link = udp_link(&p);
        let local = cfg(1);
        let remote = ZenohID::from(2u128);
        p.push_inbound(
            &encode(TransportBody::Accept(Accept {
                whatami: WhatAmI::Router,
                opid: local.id.as_slice(),
                apid: remote.as_slice(),
                lease: 1_000,
                initial_sn: 5,
                sn_resolution: 1 << 16,
            })),
            peer(1),
        );

        let params = Unicast::new(&link).open_handshake(&local).unwrap();
        assert_eq!(params.peer_zid, Some(remote));
        assert_eq!(params.peer_whatami, Some(WhatAmI::Router));
        assert_eq!(params.lease, 1_000);
        assert_eq!(params.sn_resolution, 1 << 16);
        assert_eq!(params.initial_sn_rx, 5);
        assert!(params.initial_sn_tx < 1 << 16);

        let open = sent(&p, 0);
        match TransportMessage::decode(&mut ZSlice::new(&open)).unwrap().body {
            TransportBody::Open(o) => {
                assert_eq!(o.version, Z_PROTO_VERSION);
                assert_eq!(o.pid, local.id.as_slice());
                assert_eq!(o.lease, 2_000);
                assert!(o.properties.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn open_carries_credentials() {
        let p = Arc::new(MockPlatform::default());
        let link = udp_link(&p);
        let local = cfg(1).credentials(Credentials::new("alice", "secret"));
        // Nothing answers: the opener gives up after the lease.
        let local = local.lease(50);
        assert_eq!(
            Unicast::new(&link).open_handshake(&local).map(|_| ()),
            Err(ZError::TransportOpenFailed)
        );

        let open = sent(&p, 0);
        match TransportMessage::decode(&mut ZSlice::new(&open)).unwrap().body {
            TransportBody::Open(o) => {
                assert_eq!(o.property(property::USER), Some(&b"alice"[..]));
                assert_eq!(o.property(property::PASSWORD), Some(&b"secret"[..]));
            }
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn accept_with_larger_resolution_is_rejected() {
        let p = Arc::new(MockPlatform::default());
        let link = udp_link(&p);
        let local = cfg(1);
        p.push_inbound(
            &encode(TransportBody::Accept(Accept {
                whatami: WhatAmI::Peer,
                opid: local.id.as_slice(),
                apid: &[2],
                lease: 1_000,
                initial_sn: 0,
                sn_resolution: Z_SN_RESOLUTION * 2,
            })),
            peer(1),
        );
        assert_eq!(
            Unicast::new(&link).open_handshake(&local).map(|_| ()),
            Err(ZError::UnexpectedMessage)
        );
    }

    #[test]
    fn close_instead_of_accept_fails_the_open() {
        let p = Arc::new(MockPlatform::default());
        let link = udp_link(&p);
        p.push_inbound(
            &encode(TransportBody::Close(Close {
                pid: None,
                reason: reason::MAX_SESSIONS,
                link_only: false,
            })),
            peer(1),
        );
        assert_eq!(
            Unicast::new(&link).open_handshake(&cfg(1)).map(|_| ()),
            Err(ZError::TransportOpenFailed)
        );
    }

    fn open_from(id: &ZenohID, version: u8, user: Option<&'static [u8]>) -> std::vec::Vec<u8> {
        let mut properties = Vec::new();
        if let Some(user) = user {
            properties
                .push(Property {
                    key: property::USER,
                    value: user,
                })
                .unwrap();
            properties
                .push(Property {
                    key: property::PASSWORD,
                    value: b"secret",
                })
                .unwrap();
        }
        encode(TransportBody::Open(Open {
            version,
            whatami: WhatAmI::Peer,
            pid: id.as_slice(),
            lease: 10_000,
            initial_sn: 9,
            sn_resolution: Z_SN_RESOLUTION,
            properties,
        }))
    }

    #[test]
    fn listener_accepts_an_open() {
        let p = Arc::new(MockPlatform::default());
        let link = udp_link(&p);
        let remote = ZenohID::from(7u128);
        p.push_inbound(&open_from(&remote, Z_PROTO_VERSION, None), peer(1));

        let local = cfg(1);
        let params = Unicast::new(&link).accept_handshake(&local).unwrap();
        assert_eq!(params.peer_zid, Some(remote));
        assert_eq!(params.lease, 2_000);
        assert_eq!(params.initial_sn_rx, 9);

        let accept = sent(&p, 0);
        match TransportMessage::decode(&mut ZSlice::new(&accept)).unwrap().body {
            TransportBody::Accept(a) => {
                assert_eq!(a.opid, remote.as_slice());
                assert_eq!(a.apid, local.id.as_slice());
                assert_eq!(a.initial_sn, params.initial_sn_tx);
            }
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn listener_refuses_other_versions_and_bad_credentials() {
        let remote = ZenohID::from(7u128);
        let cases: [(u8, Option<&'static [u8]>, u8); 2] = [
            (Z_PROTO_VERSION + 1, Some(b"alice"), reason::UNSUPPORTED),
            (Z_PROTO_VERSION, Some(b"mallory"), reason::INVALID),
        ];
        for (version, user, expected) in cases {
            let p = Arc::new(MockPlatform::default());
            let link = udp_link(&p);
            p.push_inbound(&open_from(&remote, version, user), peer(1));

            let local = cfg(1).credentials(Credentials::new("alice", "secret"));
            assert_eq!(
                Unicast::new(&link).accept_handshake(&local).map(|_| ()),
                Err(ZError::TransportOpenFailed)
            );
            let close = sent(&p, 0);
            match TransportMessage::decode(&mut ZSlice::new(&close)).unwrap().body {
                TransportBody::Close(c) => assert_eq!(c.reason, expected),
                other => panic!("unexpected {other:?}"),
            };
        }
    }

    #[test]
    fn tcp_handshake_is_length_prefixed() {
        let p = Arc::new(MockPlatform::default());
        let mut link = create_link(p.clone(), "tcp/127.0.0.1:7447".parse().unwrap()).unwrap();
        link.listen().unwrap();

        let remote = ZenohID::from(7u128);
        let open = open_from(&remote, Z_PROTO_VERSION, None);
        let mut batch = std::vec::Vec::new();
        batch
            .write_exact(&(open.len() as u16).to_le_bytes())
            .unwrap();
        batch.write_exact(&open).unwrap();
        p.push_inbound(&batch, peer(1));

        Unicast::new(&link).accept_handshake(&cfg(1)).unwrap();
        let accept = sent(&p, 0);
        let len = u16::from_le_bytes([accept[0], accept[1]]) as usize;
        assert_eq!(len, accept.len() - 2);
    }
}
