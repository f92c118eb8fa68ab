//! Incoming batches: reading them off a link, then checking each frame against the
//! sequence and fragment state of the peer that sent it.

use std::{
    collections::{hash_map::Entry, HashMap},
    net::SocketAddr,
    time::{Duration, Instant},
};

use crate::{
    link::Link,
    platform::Platform,
    protocol::{
        core::Reliability,
        transport::{Frame, FramePayload},
    },
    result::{ZError, ZResult},
};

use super::{
    defrag::DefragBuffer,
    seq::{RxChannel, SnCheck},
};

const STREAM_LEN_PREFIX: usize = 2;

/// Largest batch a streamed link can announce.
pub(crate) const RX_BUF_SIZE: usize = u16::MAX as usize;

/// Reads the next batch into `buf`, returning its length and sender. `Ok(None)` when
/// the socket timeout elapsed before a batch started, or `stop` asked to give up
/// while waiting for the rest of one.
pub(crate) fn read_batch<P, F>(
    link: &Link<P>,
    buf: &mut [u8],
    stop: F,
) -> ZResult<Option<(usize, Option<SocketAddr>)>>
where
    P: Platform,
    F: Fn() -> bool,
{
    if !link.cap.is_streamed() {
        return match link.read(buf)? {
            (0, _) => Ok(None),
            (n, from) => Ok(Some((n, from))),
        };
    }

    let mut prefix = [0u8; STREAM_LEN_PREFIX];
    if !fill_from_stream(link, &mut prefix, &stop)? {
        return Ok(None);
    }
    let len = usize::from(u16::from_le_bytes(prefix));
    if len == 0 {
        return Ok(None);
    }
    let body = buf.get_mut(..len).ok_or(ZError::NoBufferSpace)?;
    if !fill_from_stream(link, body, &stop)? {
        return Ok(None);
    }
    Ok(Some((len, None)))
}

/// Fills `buf` from a streamed link. `Ok(false)` when nothing arrived before the
/// socket timeout, or when `stop` turned true after a timeout midway.
fn fill_from_stream<P, F>(link: &Link<P>, buf: &mut [u8], stop: &F) -> ZResult<bool>
where
    P: Platform,
    F: Fn() -> bool,
{
    let mut filled = link.read_exact(buf)?.0;
    if filled == 0 && !buf.is_empty() {
        return Ok(false);
    }
    while filled < buf.len() {
        if stop() {
            zwarn!("Dropping a batch cut after {} bytes", filled as u64);
            return Ok(false);
        }
        filled += link.read_exact(&mut buf[filled..])?.0;
    }
    Ok(true)
}

/// What a frame yields once it passed the sequence check.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RxPayload<'a> {
    /// Zenoh messages, back to back.
    Messages(&'a [u8]),
    /// One zenoh message put back together from its fragments.
    Reassembled(Vec<u8>),
}

#[derive(Debug)]
struct PeerRx {
    reliable: Option<RxChannel>,
    best_effort: Option<RxChannel>,
    defrag_reliable: DefragBuffer,
    defrag_best_effort: DefragBuffer,
    last_received: Instant,
}

impl PeerRx {
    fn new(initial_sn: Option<u64>, sn_resolution: u64, now: Instant) -> Self {
        let channel = initial_sn.map(|sn| RxChannel::new(sn, sn_resolution));
        PeerRx {
            reliable: channel,
            best_effort: channel,
            defrag_reliable: DefragBuffer::default(),
            defrag_best_effort: DefragBuffer::default(),
            last_received: now,
        }
    }
}

/// Receive state of a transport session.
///
/// A unicast session has exactly one peer, set up from the handshake. A multicast
/// session learns its peers from their first frame and forgets them once they stay
/// silent for a lease.
#[derive(Debug)]
pub(crate) struct RxState {
    peers: HashMap<Option<SocketAddr>, PeerRx>,
    multicast: bool,
    sn_resolution: u64,
}

impl RxState {
    pub fn unicast(initial_sn: u64, sn_resolution: u64, now: Instant) -> Self {
        let mut peers = HashMap::new();
        peers.insert(None, PeerRx::new(Some(initial_sn), sn_resolution, now));
        RxState {
            peers,
            multicast: false,
            sn_resolution,
        }
    }

    pub fn multicast(sn_resolution: u64) -> Self {
        RxState {
            peers: HashMap::new(),
            multicast: true,
            sn_resolution,
        }
    }

    fn key(&self, from: Option<SocketAddr>) -> Option<SocketAddr> {
        if self.multicast {
            from
        } else {
            None
        }
    }

    /// Records that something arrived from `from`.
    pub fn touch(&mut self, from: Option<SocketAddr>, now: Instant) {
        let key = self.key(from);
        if let Some(peer) = self.peers.get_mut(&key) {
            peer.last_received = now;
        }
    }

    pub fn on_frame<'a>(
        &mut self,
        from: Option<SocketAddr>,
        frame: &Frame<'a>,
        now: Instant,
    ) -> ZResult<Option<RxPayload<'a>>> {
        let key = self.key(from);
        let sn_resolution = self.sn_resolution;
        let multicast = self.multicast;
        let peer = match self.peers.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) if multicast => {
                zinfo!("New multicast peer");
                e.insert(PeerRx::new(None, sn_resolution, now))
            }
            Entry::Vacant(_) => {
                zerror!("Frame received without an established peer");
                return Err(ZError::UnexpectedMessage);
            }
        };
        peer.last_received = now;

        let (channel, defrag) = match frame.reliability {
            Reliability::Reliable => (&mut peer.reliable, &mut peer.defrag_reliable),
            Reliability::BestEffort => (&mut peer.best_effort, &mut peer.defrag_best_effort),
        };
        let channel = channel.get_or_insert_with(|| RxChannel::new(frame.sn, sn_resolution));
        let check = match frame.reliability {
            Reliability::Reliable => channel.check_reliable(frame.sn)?,
            Reliability::BestEffort => channel.check_best_effort(frame.sn),
        };
        if check == SnCheck::Duplicate {
            return Ok(None);
        }

        match frame.payload {
            FramePayload::Messages(bytes) => {
                if !defrag.is_empty() {
                    zwarn!("Complete frame interrupts a fragmented message, discarding it");
                    defrag.clear();
                }
                Ok(Some(RxPayload::Messages(bytes)))
            }
            FramePayload::Fragment { offset, last, data } => {
                Ok(defrag.push(offset, last, data).map(RxPayload::Reassembled))
            }
        }
    }

    /// Fails with [`ZError::LeaseExpired`] once the unicast peer has been silent for
    /// longer than `lease`. Silent multicast peers are dropped instead.
    pub fn check_lease(&mut self, now: Instant, lease: Duration) -> ZResult<()> {
        if self.multicast {
            self.peers.retain(|_, peer| {
                let alive = now.duration_since(peer.last_received) <= lease;
                if !alive {
                    zinfo!("Forgetting silent multicast peer");
                }
                alive
            });
            return Ok(());
        }

        match self.peers.get(&None) {
            Some(peer) if now.duration_since(peer.last_received) > lease => {
                zwarn!("Lease of {} ms expired", lease.as_millis() as u64);
                Err(ZError::LeaseExpired)
            }
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
