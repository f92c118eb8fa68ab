//! An in-memory platform: every socket is a number, sends are recorded and receives
//! are served from a queue.

use std::{
    collections::VecDeque,
    io,
    net::{IpAddr, SocketAddr},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

use super::Platform;

#[derive(Debug, Default)]
pub(crate) struct MockPlatform {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub left_groups: AtomicUsize,
    /// The open call (counting from 0) that fails, if any.
    pub fail_open_at: Mutex<Option<usize>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub inbox: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
    /// Local address reported for multicast senders; `peer(40000)` when unset.
    pub multicast_laddr: Mutex<Option<SocketAddr>>,
}

pub(crate) fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], port))
}

impl MockPlatform {
    pub fn failing_at(n: usize) -> Self {
        let p = MockPlatform::default();
        *p.fail_open_at.lock() = Some(n);
        p
    }

    pub fn push_inbound(&self, bytes: &[u8], from: SocketAddr) {
        self.inbox.lock().push_back((bytes.to_vec(), from));
    }

    pub fn open_sockets(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    fn open(&self) -> io::Result<usize> {
        let n = self.opened.load(Ordering::SeqCst);
        if *self.fail_open_at.lock() == Some(n) {
            return Err(io::ErrorKind::AddrNotAvailable.into());
        }
        Ok(self.opened.fetch_add(1, Ordering::SeqCst))
    }

    fn pop(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock();
        let Some((mut bytes, from)) = inbox.pop_front() else {
            return Err(io::ErrorKind::WouldBlock.into());
        };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        if n < bytes.len() {
            inbox.push_front((bytes.split_off(n), from));
        }
        Ok((n, from))
    }
}

impl Platform for MockPlatform {
    type Socket = usize;

    fn resolve(&self, address: &str, port: &str) -> io::Result<SocketAddr> {
        let ip: IpAddr = address
            .parse()
            .map_err(|_| io::Error::from(io::ErrorKind::NotFound))?;
        let port = port
            .parse()
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        Ok(SocketAddr::new(ip, port))
    }

    fn tcp_open(&self, _: SocketAddr, _: Duration) -> io::Result<usize> {
        self.open()
    }

    fn tcp_listen(&self, _: SocketAddr, _: Duration) -> io::Result<usize> {
        self.open()
    }

    fn udp_open(&self, _: SocketAddr, _: Duration) -> io::Result<usize> {
        self.open()
    }

    fn udp_listen(&self, _: SocketAddr, _: Duration) -> io::Result<usize> {
        self.open()
    }

    fn udp_multicast_open(
        &self,
        _: SocketAddr,
        _: Option<IpAddr>,
        _: Duration,
    ) -> io::Result<(usize, SocketAddr)> {
        let laddr = (*self.multicast_laddr.lock()).unwrap_or(peer(40000));
        Ok((self.open()?, laddr))
    }

    fn udp_multicast_listen(&self, _: SocketAddr, _: Option<IpAddr>, _: Duration) -> io::Result<usize> {
        self.open()
    }

    fn udp_multicast_leave(&self, _: &usize, _: SocketAddr, _: Option<IpAddr>) -> io::Result<()> {
        self.left_groups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self, _: &usize) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn send(&self, _: &usize, buf: &[u8]) -> io::Result<usize> {
        self.sent.lock().push(buf.to_vec());
        Ok(buf.len())
    }

    fn send_to(&self, socket: &usize, buf: &[u8], _: SocketAddr) -> io::Result<usize> {
        self.send(socket, buf)
    }

    fn recv(&self, _: &usize, buf: &mut [u8]) -> io::Result<usize> {
        self.pop(buf).map(|(n, _)| n)
    }

    fn recv_from(&self, _: &usize, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.pop(buf)
    }
}
