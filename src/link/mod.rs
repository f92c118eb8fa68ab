use std::{net::SocketAddr, sync::Arc, time::Duration};

use crate::{
    platform::Platform,
    result::{ZError, ZResult},
    Z_CONFIG_SOCKET_TIMEOUT_DEFAULT,
};

pub mod locator;
pub mod manager;
pub mod tcp;
pub mod udp;

pub use locator::{Endpoint, Locator};
pub use manager::create_link;

/// Endpoint key holding the socket timeout, in milliseconds.
pub const CONFIG_TOUT_KEY: &str = "tout";
/// Endpoint key holding the interface address a multicast link uses, or `auto`.
pub const CONFIG_IFACE_KEY: &str = "iface";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportCap {
    Unicast = 0,
    Multicast = 1,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportFlow {
    Datagram = 0,
    Stream = 1,
}

/// Bit 6 transport, bit 5 flow, bit 4 reliability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkCapabilities(u8);

impl LinkCapabilities {
    const TRANSPORT: u8 = 1 << 6;
    const FLOW: u8 = 1 << 5;
    const RELIABLE: u8 = 1 << 4;

    pub fn new(transport: TransportCap, flow: TransportFlow, reliable: bool) -> Self {
        let mut lc = LinkCapabilities(0);
        lc.set_transport(transport);
        lc.set_flow(flow);
        lc.set_reliable(reliable);
        lc
    }

    fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn transport(&self) -> TransportCap {
        if self.0 & Self::TRANSPORT != 0 {
            TransportCap::Multicast
        } else {
            TransportCap::Unicast
        }
    }

    pub fn set_transport(&mut self, t: TransportCap) {
        self.set(Self::TRANSPORT, t == TransportCap::Multicast);
    }

    pub fn flow(&self) -> TransportFlow {
        if self.0 & Self::FLOW != 0 {
            TransportFlow::Stream
        } else {
            TransportFlow::Datagram
        }
    }

    pub fn set_flow(&mut self, f: TransportFlow) {
        self.set(Self::FLOW, f == TransportFlow::Stream);
    }

    pub fn reliable(&self) -> bool {
        self.0 & Self::RELIABLE != 0
    }

    pub fn set_reliable(&mut self, r: bool) {
        self.set(Self::RELIABLE, r);
    }

    pub fn is_streamed(&self) -> bool {
        self.flow() == TransportFlow::Stream
    }

    pub fn is_multicast(&self) -> bool {
        self.transport() == TransportCap::Multicast
    }
}

/// Per-transport state. Every link operation dispatches on it.
pub(crate) enum LinkSocket<S> {
    Tcp(tcp::TcpLink<S>),
    UdpUnicast(udp::unicast::UdpUnicastLink<S>),
    UdpMulticast(udp::multicast::UdpMulticastLink<S>),
}

/// One transport connection, exclusively owned by the session that created it.
pub struct Link<P: Platform> {
    pub cap: LinkCapabilities,
    pub mtu: u16,
    pub endpoint: Endpoint,
    platform: Arc<P>,
    socket: LinkSocket<P::Socket>,
}

impl<P: Platform> Link<P> {
    pub(crate) fn new(
        cap: LinkCapabilities,
        mtu: u16,
        endpoint: Endpoint,
        platform: Arc<P>,
        socket: LinkSocket<P::Socket>,
    ) -> Self {
        Link {
            cap,
            mtu,
            endpoint,
            platform,
            socket,
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Establishes the sending path.
    pub fn open(&mut self) -> ZResult<()> {
        zdebug!("Opening link {}", self.endpoint.locator.scheme.as_str());
        let p = &*self.platform;
        let ep = &self.endpoint;
        match &mut self.socket {
            LinkSocket::Tcp(l) => l.open(p, ep),
            LinkSocket::UdpUnicast(l) => l.open(p, ep),
            LinkSocket::UdpMulticast(l) => l.open(p, ep),
        }
    }

    /// Establishes the receiving path. Nothing stays open when it fails.
    pub fn listen(&mut self) -> ZResult<()> {
        zdebug!("Listening on link {}", self.endpoint.locator.scheme.as_str());
        let p = &*self.platform;
        let ep = &self.endpoint;
        match &mut self.socket {
            LinkSocket::Tcp(l) => l.listen(p, ep),
            LinkSocket::UdpUnicast(l) => l.listen(p, ep),
            LinkSocket::UdpMulticast(l) => l.listen(p, ep),
        }
    }

    /// Releases sockets and group memberships. Call at most once per open or listen.
    pub fn close(&mut self) {
        zdebug!("Closing link {}", self.endpoint.locator.scheme.as_str());
        let p = &*self.platform;
        match &mut self.socket {
            LinkSocket::Tcp(l) => l.close(p),
            LinkSocket::UdpUnicast(l) => l.close(p),
            LinkSocket::UdpMulticast(l) => l.close(p),
        }
    }

    /// Drops everything the link owns. Callable whether or not it was ever opened.
    pub fn free(self) {}

    pub fn write(&self, bytes: &[u8]) -> ZResult<usize> {
        let p = &*self.platform;
        match &self.socket {
            LinkSocket::Tcp(l) => l.write(p, bytes),
            LinkSocket::UdpUnicast(l) => l.write(p, bytes),
            LinkSocket::UdpMulticast(l) => l.write(p, bytes),
        }
    }

    /// Sends the whole buffer; datagram links send it as one datagram.
    pub fn write_all(&self, bytes: &[u8]) -> ZResult<usize> {
        match &self.socket {
            LinkSocket::Tcp(l) => l.write_all(&*self.platform, bytes),
            _ => self.write(bytes),
        }
    }

    /// Receives at most `buf.len()` bytes. `Ok((0, None))` means the socket timeout
    /// elapsed with nothing to read.
    pub fn read(&self, buf: &mut [u8]) -> ZResult<(usize, Option<SocketAddr>)> {
        let p = &*self.platform;
        match &self.socket {
            LinkSocket::Tcp(l) => l.read(p, buf).map(|n| (n, None)),
            LinkSocket::UdpUnicast(l) => l.read(p, buf),
            LinkSocket::UdpMulticast(l) => l.read(p, buf),
        }
    }

    /// Receives `buf.len()` bytes, or fewer if the socket timeout elapses first. The
    /// count tells how much of `buf` was filled.
    pub fn read_exact(&self, buf: &mut [u8]) -> ZResult<(usize, Option<SocketAddr>)> {
        let mut filled = 0;
        let mut from = None;
        while filled < buf.len() {
            let (n, addr) = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            from = from.or(addr);
            filled += n;
        }
        Ok((filled, from))
    }
}

/// Reads must time out for the read loop to notice cancellation, so `tout=0` is refused.
pub(crate) fn socket_timeout(endpoint: &Endpoint) -> ZResult<Duration> {
    match endpoint.get(CONFIG_TOUT_KEY) {
        Some(tout) => match tout.parse() {
            Ok(0) | Err(_) => {
                zwarn!("Invalid socket timeout {}", tout);
                Err(ZError::TransportOpenFailed)
            }
            Ok(ms) => Ok(Duration::from_millis(ms)),
        },
        None => Ok(Duration::from_millis(Z_CONFIG_SOCKET_TIMEOUT_DEFAULT)),
    }
}

pub(crate) fn resolve<P: Platform>(platform: &P, endpoint: &Endpoint) -> ZResult<SocketAddr> {
    let locator = &endpoint.locator;
    let port = locator.port.as_deref().ok_or(ZError::InvalidLocator)?;
    platform.resolve(&locator.address, port).map_err(|e| {
        zwarn!("Cannot resolve {}: {}", locator.address.as_str(), e.kind().to_string().as_str());
        ZError::TransportOpenFailed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_bits() {
        let lc = LinkCapabilities::new(TransportCap::Multicast, TransportFlow::Datagram, false);
        assert!(lc.is_multicast());
        assert!(!lc.is_streamed());
        assert!(!lc.reliable());

        let mut lc = LinkCapabilities::new(TransportCap::Unicast, TransportFlow::Stream, true);
        assert_eq!(lc.transport(), TransportCap::Unicast);
        assert!(lc.is_streamed());
        assert!(lc.reliable());
        lc.set_reliable(false);
        assert!(!lc.reliable());
        assert!(lc.is_streamed());
    }

    #[test]
    fn timeout_from_endpoint() {
        let ep: Endpoint = "udp/127.0.0.1:7447?tout=250".parse().unwrap();
        assert_eq!(socket_timeout(&ep), Ok(Duration::from_millis(250)));
        let ep: Endpoint = "udp/127.0.0.1:7447#tout=abc".parse().unwrap();
        assert_eq!(socket_timeout(&ep), Err(ZError::TransportOpenFailed));
        let ep: Endpoint = "udp/127.0.0.1:7447".parse().unwrap();
        assert_eq!(
            socket_timeout(&ep),
            Ok(Duration::from_millis(Z_CONFIG_SOCKET_TIMEOUT_DEFAULT))
        );
    }

    #[test]
    fn socket_timeout_must_be_positive() {
        let tout = |ep: &str| socket_timeout(&ep.parse::<Endpoint>().unwrap());
        assert_eq!(
            tout("tcp/127.0.0.1:7447"),
            Ok(Duration::from_millis(Z_CONFIG_SOCKET_TIMEOUT_DEFAULT))
        );
        assert_eq!(tout("tcp/127.0.0.1:7447#tout=250"), Ok(Duration::from_millis(250)));
        assert_eq!(tout("tcp/127.0.0.1:7447#tout=0"), Err(ZError::TransportOpenFailed));
        assert_eq!(tout("tcp/127.0.0.1:7447#tout=soon"), Err(ZError::TransportOpenFailed));
    }
}
