//! The I/O driver the links are written against.
//!
//! Links never touch sockets directly: every open, send, receive and close goes
//! through a [`Platform`], so the whole stack can run over something other than
//! `std::net`, and tests can count what was opened and closed.

use std::{
    io,
    net::{IpAddr, SocketAddr},
    time::{Duration, Instant},
};

mod net;

#[cfg(test)]
pub(crate) mod mock;

pub use net::{StdPlatform, StdSocket};

pub trait Platform: Send + Sync + 'static {
    type Socket: Send + Sync;

    /// Resolves `address` (IP literal or host name) and `port` to one socket address.
    fn resolve(&self, address: &str, port: &str) -> io::Result<SocketAddr>;

    /// Connects a stream socket. `timeout` bounds the connect and every later read.
    fn tcp_open(&self, raddr: SocketAddr, timeout: Duration) -> io::Result<Self::Socket>;

    /// Binds `laddr` and accepts exactly one incoming stream.
    fn tcp_listen(&self, laddr: SocketAddr, timeout: Duration) -> io::Result<Self::Socket>;

    /// A datagram socket on an ephemeral port, sending towards `raddr`.
    fn udp_open(&self, raddr: SocketAddr, timeout: Duration) -> io::Result<Self::Socket>;

    /// A datagram socket bound to `laddr`.
    fn udp_listen(&self, laddr: SocketAddr, timeout: Duration) -> io::Result<Self::Socket>;

    /// A socket sending to the multicast `group` through `iface`, returned with the
    /// local address it sends from.
    fn udp_multicast_open(
        &self,
        group: SocketAddr,
        iface: Option<IpAddr>,
        timeout: Duration,
    ) -> io::Result<(Self::Socket, SocketAddr)>;

    /// A socket bound to the port of `group` that joined the group on `iface`.
    fn udp_multicast_listen(
        &self,
        group: SocketAddr,
        iface: Option<IpAddr>,
        timeout: Duration,
    ) -> io::Result<Self::Socket>;

    fn udp_multicast_leave(
        &self,
        socket: &Self::Socket,
        group: SocketAddr,
        iface: Option<IpAddr>,
    ) -> io::Result<()>;

    /// Shuts the socket down; it is released when dropped.
    fn close(&self, socket: &Self::Socket);

    fn send(&self, socket: &Self::Socket, buf: &[u8]) -> io::Result<usize>;

    fn send_to(&self, socket: &Self::Socket, buf: &[u8], raddr: SocketAddr) -> io::Result<usize>;

    /// Fails with `WouldBlock` or `TimedOut` once the socket timeout elapses.
    fn recv(&self, socket: &Self::Socket, buf: &mut [u8]) -> io::Result<usize>;

    fn recv_from(&self, socket: &Self::Socket, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// True for the errors a socket reports when its read timeout elapsed.
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
