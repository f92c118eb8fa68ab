//! The transport session engine.
//!
//! A [`TransportSession`] owns one [`Link`]. Once established it runs two threads on
//! it: the read loop, which checks sequence numbers, reassembles fragments and hands
//! zenoh messages to a [`TransportHandler`], and the lease loop, which sends
//! keep-alives and notices a silent peer. Any error in either loop terminates the
//! session and is kept as its cause.

use std::{
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::{
    link::{create_link, Endpoint, Link},
    platform::Platform,
    protocol::{
        core::Reliability,
        transport::{close::reason, Close, KeepAlive, TransportBody, TransportMessages},
        whatami::WhatAmI,
        zenoh::{ZenohMessage, ZenohMessages},
        ZenohID,
    },
    result::{ZError, ZResult},
    Config, Z_LEASE_EXPIRE_FACTOR, Z_SN_RESOLUTION,
};

mod defrag;
mod rx;
mod seq;
mod tx;
mod unicast;

use rx::{read_batch, RxPayload, RxState, RX_BUF_SIZE};
use tx::TxState;
use unicast::Unicast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportStatus {
    Established,
    /// Closed locally with `None`, or terminated by the recorded error.
    Closed(Option<ZError>),
}

/// What the handshake settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransportParams {
    pub peer_zid: Option<ZenohID>,
    pub peer_whatami: Option<WhatAmI>,
    /// Milliseconds.
    pub lease: u64,
    pub sn_resolution: u64,
    pub initial_sn_tx: u64,
    pub initial_sn_rx: u64,
}

/// Stop request shared by the background loops. Waiting on it is interrupted by
/// [`CancellationToken::cancel`].
#[derive(Debug, Default)]
pub(crate) struct CancellationToken {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

impl CancellationToken {
    /// True the first time only.
    pub fn cancel(&self) -> bool {
        let mut cancelled = self.cancelled.lock();
        let first = !*cancelled;
        *cancelled = true;
        self.cond.notify_all();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Sleeps up to `timeout`; returns whether cancellation was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        if !*cancelled {
            self.cond.wait_for(&mut cancelled, timeout);
        }
        *cancelled
    }
}

/// Receives the zenoh messages of an established session, on its read thread.
///
/// An error returned here terminates the session.
pub trait TransportHandler: Send + Sync + 'static {
    fn handle_message(&self, msg: ZenohMessage<'_>, peer: Option<SocketAddr>) -> ZResult<()>;
}

struct TransportTasks {
    read: JoinHandle<()>,
    lease: JoinHandle<()>,
}

pub struct TransportSession<P: Platform> {
    zid: ZenohID,
    params: TransportParams,
    reliability: Reliability,
    platform: Arc<P>,
    /// Taken out once, by `close`.
    link: RwLock<Option<Link<P>>>,
    tx: Mutex<TxState>,
    rx: Mutex<RxState>,
    status: Mutex<TransportStatus>,
    cancel: CancellationToken,
    tasks: Mutex<Option<TransportTasks>>,
}

impl<P: Platform> TransportSession<P> {
    /// Opens the link named by `cfg` and establishes a session over it.
    ///
    /// Unicast links go through the Open/Accept handshake, actively with a `connect`
    /// endpoint, passively with a `listen` one. Multicast links listen and are
    /// established right away. On failure nothing stays open.
    pub fn open(platform: Arc<P>, cfg: &Config) -> ZResult<Arc<Self>> {
        let (locator, listen) = match (&cfg.connect, &cfg.listen) {
            (Some(locator), _) => (locator, false),
            (None, Some(locator)) => (locator, true),
            (None, None) => {
                zerror!("No endpoint to connect to or listen on");
                return Err(ZError::InvalidLocator);
            }
        };
        let endpoint: Endpoint = locator.parse()?;
        let mut link = create_link(platform.clone(), endpoint)?;

        let multicast = link.cap.is_multicast();
        let ready = if listen || multicast {
            link.listen()
        } else {
            link.open()
        };
        if let Err(e) = ready {
            zerror!("Failed to open link {}: {}", locator.as_str(), e);
            link.free();
            return Err(e);
        }

        let params = if multicast {
            Ok(TransportParams {
                peer_zid: None,
                peer_whatami: None,
                lease: cfg.lease,
                sn_resolution: Z_SN_RESOLUTION,
                initial_sn_tx: seq::random_sn(Z_SN_RESOLUTION),
                initial_sn_rx: 0,
            })
        } else if listen {
            Unicast::new(&link).accept_handshake(cfg)
        } else {
            Unicast::new(&link).open_handshake(cfg)
        };

        match params {
            Ok(params) => {
                zinfo!("Session established on {}", locator.as_str());
                Ok(Arc::new(Self::new(platform, link, cfg.id, params)))
            }
            Err(e) => {
                zerror!("Handshake failed: {}", e);
                link.close();
                link.free();
                Err(e)
            }
        }
    }

    pub(crate) fn new(platform: Arc<P>, link: Link<P>, zid: ZenohID, params: TransportParams) -> Self {
        let now = platform.now();
        let rx = if link.cap.is_multicast() {
            RxState::multicast(params.sn_resolution)
        } else {
            RxState::unicast(params.initial_sn_rx, params.sn_resolution, now)
        };
        let reliability = if link.cap.reliable() {
            Reliability::Reliable
        } else {
            Reliability::BestEffort
        };
        TransportSession {
            zid,
            reliability,
            platform,
            link: RwLock::new(Some(link)),
            tx: Mutex::new(TxState::new(params.initial_sn_tx, params.sn_resolution)),
            rx: Mutex::new(rx),
            status: Mutex::new(TransportStatus::Established),
            cancel: CancellationToken::default(),
            tasks: Mutex::new(None),
            params,
        }
    }

    pub fn zid(&self) -> ZenohID {
        self.zid
    }

    pub fn peer_zid(&self) -> Option<ZenohID> {
        self.params.peer_zid
    }

    pub fn peer_whatami(&self) -> Option<WhatAmI> {
        self.params.peer_whatami
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.params.lease)
    }

    /// The channel data is sent on: reliable when the link is.
    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    pub fn status(&self) -> TransportStatus {
        *self.status.lock()
    }

    /// Starts the read and lease loops.
    pub fn start<H: TransportHandler>(self: &Arc<Self>, handler: Arc<H>) -> ZResult<()> {
        let session = self.clone();
        let read = thread::Builder::new()
            .name("zenoh-read".into())
            .spawn(move || session.read_loop(&*handler))
            .map_err(|_| ZError::TransportOpenFailed)?;

        let session = self.clone();
        let lease = match thread::Builder::new()
            .name("zenoh-lease".into())
            .spawn(move || session.lease_loop())
        {
            Ok(lease) => lease,
            Err(_) => {
                self.cancel.cancel();
                if read.join().is_err() {
                    zerror!("Read task panicked");
                }
                return Err(ZError::TransportOpenFailed);
            }
        };

        *self.tasks.lock() = Some(TransportTasks { read, lease });
        Ok(())
    }

    pub fn send_zenoh_message(&self, msg: &ZenohMessage<'_>, reliability: Reliability) -> ZResult<()> {
        if let TransportStatus::Closed(cause) = self.status() {
            return Err(cause.unwrap_or(ZError::TxConnection));
        }
        let mut tx = self.tx.lock();
        let link = self.link.read();
        let link = link.as_ref().ok_or(ZError::TxConnection)?;
        tx.send_zenoh_message(link, msg, reliability)
    }

    fn send_transport_message(&self, body: TransportBody<'_>) -> ZResult<()> {
        let mut tx = self.tx.lock();
        let link = self.link.read();
        let link = link.as_ref().ok_or(ZError::TxConnection)?;
        tx.send_transport_message(link, &body.into())
    }

    fn send_close(&self, reason: u8) {
        let close = Close {
            pid: Some(self.zid.as_slice()),
            reason,
            link_only: false,
        };
        if self.send_transport_message(TransportBody::Close(close)).is_err() {
            zwarn!("Failed to send Z_CLOSE");
        }
    }

    /// Records `cause` and stops both loops. Only the first cause is kept.
    fn terminate(&self, cause: ZError) {
        {
            let mut status = self.status.lock();
            if *status != TransportStatus::Established {
                drop(status);
                self.cancel.cancel();
                return;
            }
            *status = TransportStatus::Closed(Some(cause));
        }
        zerror!("Session terminated: {}", cause);

        let reason = match cause {
            ZError::TxConnection | ZError::IoGeneric => None,
            ZError::LeaseExpired => Some(reason::EXPIRED),
            _ => Some(reason::INVALID),
        };
        if let Some(reason) = reason {
            self.send_close(reason);
        }
        self.cancel.cancel();
    }

    /// Stops both loops, then closes and frees the link.
    ///
    /// Safe to call from any thread, including from a handler running on the read
    /// loop. Returns the cause if the session had already terminated on an error.
    pub fn close(&self) -> ZResult<()> {
        let cause = {
            let mut status = self.status.lock();
            let current = *status;
            if current == TransportStatus::Established {
                *status = TransportStatus::Closed(None);
            }
            current
        };
        let cause = match cause {
            TransportStatus::Established => {
                zinfo!("Closing session");
                self.send_close(reason::GENERIC);
                None
            }
            TransportStatus::Closed(cause) => cause,
        };

        self.cancel.cancel();
        self.join_tasks();

        if let Some(mut link) = self.link.write().take() {
            link.close();
            link.free();
        }

        match cause {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn join_tasks(&self) {
        let Some(tasks) = self.tasks.lock().take() else {
            return;
        };
        let current = thread::current().id();
        for handle in [tasks.read, tasks.lease] {
            // A handler closing the session runs on the read thread; it exits on its own.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                zerror!("Transport task panicked");
            }
        }
    }

    fn read_loop<H: TransportHandler>(&self, handler: &H) {
        let mut buf = vec![0u8; RX_BUF_SIZE];
        while !self.cancel.is_cancelled() {
            let read = {
                let link = self.link.read();
                match link.as_ref() {
                    Some(link) => read_batch(link, &mut buf, || self.cancel.is_cancelled()),
                    None => break,
                }
            };
            let result = match read {
                Ok(Some((n, from))) => self.receive_batch(&buf[..n], from, handler),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                if !self.cancel.is_cancelled() {
                    self.terminate(e);
                }
                break;
            }
        }
        zdebug!("Read loop stopped");
    }

    /// Processes the transport messages of one batch received from `from`.
    pub(crate) fn receive_batch<H: TransportHandler>(
        &self,
        batch: &[u8],
        from: Option<SocketAddr>,
        handler: &H,
    ) -> ZResult<()> {
        for msg in TransportMessages::new(batch) {
            let msg = msg.inspect_err(|e| {
                if e.is_parse_error() {
                    zerror!("Malformed batch: {}", e);
                }
            })?;
            let now = self.platform.now();
            match msg.body {
                TransportBody::Frame(frame) => {
                    // The rx state is not kept locked while handlers run.
                    let payload = self.rx.lock().on_frame(from, &frame, now)?;
                    match payload {
                        Some(RxPayload::Messages(bytes)) => {
                            self.dispatch(ZenohMessages::new(bytes), from, handler)?
                        }
                        Some(RxPayload::Reassembled(bytes)) => {
                            self.dispatch(ZenohMessages::new(&bytes), from, handler)?
                        }
                        None => {}
                    }
                }
                TransportBody::KeepAlive(_) => {
                    zdebug!("Received Z_KEEP_ALIVE");
                    self.rx.lock().touch(from, now);
                }
                TransportBody::Close(close) => {
                    zinfo!("Peer closed the session, reason {}", close.reason);
                    return Err(ZError::TxConnection);
                }
                _ => {
                    zdebug!("Ignoring session-control message on an established session");
                    self.rx.lock().touch(from, now);
                }
            }
        }
        Ok(())
    }

    fn dispatch<H: TransportHandler>(
        &self,
        msgs: ZenohMessages<'_>,
        from: Option<SocketAddr>,
        handler: &H,
    ) -> ZResult<()> {
        for msg in msgs {
            handler.handle_message(msg?, from)?;
        }
        Ok(())
    }

    fn lease_loop(&self) {
        let period = self.lease() / Z_LEASE_EXPIRE_FACTOR as u32;
        while !self.cancel.wait_timeout(period) {
            if let Err(e) = self.lease_tick() {
                self.terminate(e);
                break;
            }
        }
        zdebug!("Lease loop stopped");
    }

    fn lease_tick(&self) -> ZResult<()> {
        self.rx.lock().check_lease(self.platform.now(), self.lease())?;

        let mut tx = self.tx.lock();
        if !tx.transmitted {
            zdebug!("Sending Z_KEEP_ALIVE");
            let pid = self.params.peer_zid.is_none().then(|| self.zid.as_slice());
            let link = self.link.read();
            let link = link.as_ref().ok_or(ZError::TxConnection)?;
            tx.send_transport_message(link, &TransportBody::KeepAlive(KeepAlive { pid }).into())?;
        }
        tx.transmitted = false;
        Ok(())
    }
}
