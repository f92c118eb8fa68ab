//! Multicast links need two sockets: one bound to the group port that joined the
//! group, which only receives, and one on an ephemeral port that sends to the group.
//! Datagrams coming back from our own sending socket are skipped on reception.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use crate::{
    link::{
        resolve, socket_timeout, Endpoint, Link, LinkCapabilities, LinkSocket, TransportCap,
        TransportFlow, CONFIG_IFACE_KEY,
    },
    platform::{is_timeout, Platform},
    result::{ZError, ZResult},
    Z_CONFIG_SOCKET_TIMEOUT_DEFAULT, Z_LINK_UDP_MULTICAST_MTU,
};

const IFACE_AUTO: &str = "auto";

pub(crate) struct UdpMulticastLink<S> {
    group: Option<SocketAddr>,
    iface: Option<IpAddr>,
    /// Receives from the group.
    sock: Option<S>,
    /// Sends to the group.
    msock: Option<S>,
    laddr: Option<SocketAddr>,
}

pub(crate) fn new_link<P: Platform>(platform: Arc<P>, endpoint: Endpoint) -> Link<P> {
    Link::new(
        LinkCapabilities::new(TransportCap::Multicast, TransportFlow::Datagram, false),
        Z_LINK_UDP_MULTICAST_MTU,
        endpoint,
        platform,
        LinkSocket::UdpMulticast(UdpMulticastLink {
            group: None,
            iface: None,
            sock: None,
            msock: None,
            laddr: None,
        }),
    )
}

/// The interface is mandatory: an address, or `auto` to let the system pick.
fn iface(ep: &Endpoint) -> ZResult<Option<IpAddr>> {
    match ep.get(CONFIG_IFACE_KEY) {
        Some(IFACE_AUTO) => Ok(None),
        Some(iface) => iface
            .parse()
            .map(Some)
            .map_err(|_| ZError::TransportOpenFailed),
        None => {
            zwarn!("Multicast endpoint without {} key", CONFIG_IFACE_KEY);
            Err(ZError::TransportOpenFailed)
        }
    }
}

/// Leaves the group and closes the receiving socket unless disarmed.
struct JoinGuard<'a, P: Platform> {
    platform: &'a P,
    sock: Option<P::Socket>,
    group: SocketAddr,
    iface: Option<IpAddr>,
}

impl<P: Platform> JoinGuard<'_, P> {
    fn disarm(mut self) -> Option<P::Socket> {
        self.sock.take()
    }
}

impl<P: Platform> Drop for JoinGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(sock) = self.sock.take() {
            leave_and_close(self.platform, &sock, self.group, self.iface);
        }
    }
}

fn leave_and_close<P: Platform>(p: &P, sock: &P::Socket, group: SocketAddr, iface: Option<IpAddr>) {
    if p.udp_multicast_leave(sock, group, iface).is_err() {
        zwarn!("Failed to leave multicast group");
    }
    p.close(sock);
}

impl<S> UdpMulticastLink<S> {
    fn open_sender<P: Platform<Socket = S>>(
        &mut self,
        p: &P,
        group: SocketAddr,
        iface: Option<IpAddr>,
        timeout: Duration,
    ) -> ZResult<()> {
        let (msock, laddr) = p.udp_multicast_open(group, iface, timeout).map_err(|e| {
            zwarn!("Multicast open failed: {}", e.kind().to_string().as_str());
            ZError::TransportOpenFailed
        })?;
        self.msock = Some(msock);
        self.laddr = Some(laddr);
        Ok(())
    }

    pub fn open<P: Platform<Socket = S>>(&mut self, p: &P, ep: &Endpoint) -> ZResult<()> {
        let iface = iface(ep)?;
        let timeout = socket_timeout(ep)?;
        let group = resolve(p, ep)?;
        self.open_sender(p, group, iface, timeout)?;
        self.group = Some(group);
        self.iface = iface;
        Ok(())
    }

    pub fn listen<P: Platform<Socket = S>>(&mut self, p: &P, ep: &Endpoint) -> ZResult<()> {
        let iface = iface(ep)?;
        let group = resolve(p, ep)?;
        let timeout = Duration::from_millis(Z_CONFIG_SOCKET_TIMEOUT_DEFAULT);

        let sock = p.udp_multicast_listen(group, iface, timeout).map_err(|e| {
            zwarn!("Multicast join failed: {}", e.kind().to_string().as_str());
            ZError::TransportOpenFailed
        })?;
        let guard = JoinGuard {
            platform: p,
            sock: Some(sock),
            group,
            iface,
        };
        self.open_sender(p, group, iface, timeout)?;

        self.sock = guard.disarm();
        self.group = Some(group);
        self.iface = iface;
        Ok(())
    }

    pub fn close<P: Platform<Socket = S>>(&mut self, p: &P) {
        if let (Some(sock), Some(group)) = (self.sock.take(), self.group) {
            leave_and_close(p, &sock, group, self.iface);
        }
        if let Some(msock) = self.msock.take() {
            p.close(&msock);
        }
    }

    pub fn write<P: Platform<Socket = S>>(&self, p: &P, bytes: &[u8]) -> ZResult<usize> {
        let (Some(msock), Some(group)) = (&self.msock, self.group) else {
            return Err(ZError::IoGeneric);
        };
        p.send_to(msock, bytes, group).map_err(|_| ZError::IoGeneric)
    }

    /// A sender bound to the unspecified address is known by its port alone, since
    /// its datagrams carry the address of whichever interface sent them.
    fn sent_by_us(&self, from: SocketAddr) -> bool {
        match self.laddr {
            Some(laddr) if laddr.ip().is_unspecified() => laddr.port() == from.port(),
            Some(laddr) => laddr == from,
            None => false,
        }
    }

    pub fn read<P: Platform<Socket = S>>(
        &self,
        p: &P,
        buf: &mut [u8],
    ) -> ZResult<(usize, Option<SocketAddr>)> {
        let sock = self.sock.as_ref().ok_or(ZError::IoGeneric)?;
        loop {
            match p.recv_from(sock, buf) {
                Ok((_, from)) if self.sent_by_us(from) => continue,
                Ok((n, from)) => return Ok((n, Some(from))),
                Err(e) if is_timeout(&e) => return Ok((0, None)),
                Err(_) => return Err(ZError::IoGeneric),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::link::create_link;
    use crate::platform::mock::{peer, MockPlatform};

    const GROUP: &str = "udp/224.0.0.224:7447#iface=auto";

    #[test]
    fn multicast_capabilities() {
        let p = Arc::new(MockPlatform::default());
        let link = create_link(p, GROUP.parse().unwrap()).unwrap();
        assert!(link.cap.is_multicast());
        assert!(!link.cap.reliable());
        assert!(!link.cap.is_streamed());
        assert_eq!(link.mtu, Z_LINK_UDP_MULTICAST_MTU);
    }

    #[test]
    fn listen_then_close_releases_both_sockets() {
        let p = Arc::new(MockPlatform::default());
        let mut link = create_link(p.clone(), GROUP.parse().unwrap()).unwrap();
        link.listen().unwrap();
        assert_eq!(p.open_sockets(), 2);
        link.close();
        link.free();
        assert_eq!(p.open_sockets(), 0);
        assert_eq!(p.left_groups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_sender_rolls_back_the_receiver() {
        let p = Arc::new(MockPlatform::failing_at(1));
        let mut link = create_link(p.clone(), GROUP.parse().unwrap()).unwrap();
        assert_eq!(link.listen(), Err(ZError::TransportOpenFailed));
        assert_eq!(p.opened.load(Ordering::SeqCst), 1);
        assert_eq!(p.open_sockets(), 0);
        assert_eq!(p.left_groups.load(Ordering::SeqCst), 1);

        // Nothing is left for close to release twice.
        link.close();
        link.free();
        assert_eq!(p.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_or_bad_iface_fails_to_open() {
        let p = Arc::new(MockPlatform::default());
        let mut link = create_link(p.clone(), "udp/224.0.0.224:7447".parse().unwrap()).unwrap();
        assert_eq!(link.open(), Err(ZError::TransportOpenFailed));
        let mut link =
            create_link(p.clone(), "udp/224.0.0.224:7447?iface=eth0".parse().unwrap()).unwrap();
        assert_eq!(link.open(), Err(ZError::TransportOpenFailed));
        assert_eq!(p.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn own_datagrams_are_skipped() {
        let p = Arc::new(MockPlatform::default());
        let mut link = create_link(p.clone(), GROUP.parse().unwrap()).unwrap();
        link.listen().unwrap();

        // The mock sends from peer(40000).
        p.push_inbound(b"mine", peer(40000));
        p.push_inbound(b"theirs", peer(5));
        let mut buf = [0u8; 16];
        assert_eq!(link.read(&mut buf), Ok((6, Some(peer(5)))));
        assert_eq!(&buf[..6], b"theirs");

        assert_eq!(link.write(b"x"), Ok(1));
        link.close();
    }

    #[test]
    fn own_datagrams_are_skipped_when_bound_to_any_address() {
        let p = Arc::new(MockPlatform::default());
        *p.multicast_laddr.lock() = Some(SocketAddr::from(([0, 0, 0, 0], 40000)));
        let mut link = create_link(p.clone(), GROUP.parse().unwrap()).unwrap();
        link.listen().unwrap();

        p.push_inbound(b"mine", peer(40000));
        p.push_inbound(b"theirs", peer(5));
        let mut buf = [0u8; 16];
        assert_eq!(link.read(&mut buf), Ok((6, Some(peer(5)))));
        assert_eq!(link.read(&mut buf), Ok((0, None)));
        link.close();
    }
}
