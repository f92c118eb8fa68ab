use std::{net::SocketAddr, sync::Arc};

use parking_lot::Mutex;

use crate::{
    link::{resolve, socket_timeout, Endpoint, Link, LinkCapabilities, LinkSocket, TransportCap, TransportFlow},
    platform::{is_timeout, Platform},
    result::{ZError, ZResult},
    Z_LINK_UDP_UNICAST_MTU,
};

pub(crate) struct UdpUnicastLink<S> {
    sock: Option<S>,
    /// Fixed by `open`; a listening link learns it from the first datagram it gets.
    raddr: Mutex<Option<SocketAddr>>,
}

pub(crate) fn new_link<P: Platform>(platform: Arc<P>, endpoint: Endpoint) -> Link<P> {
    Link::new(
        LinkCapabilities::new(TransportCap::Unicast, TransportFlow::Datagram, false),
        Z_LINK_UDP_UNICAST_MTU,
        endpoint,
        platform,
        LinkSocket::UdpUnicast(UdpUnicastLink {
            sock: None,
            raddr: Mutex::new(None),
        }),
    )
}

impl<S> UdpUnicastLink<S> {
    fn sock(&self) -> ZResult<&S> {
        self.sock.as_ref().ok_or(ZError::IoGeneric)
    }

    pub fn open<P: Platform<Socket = S>>(&mut self, p: &P, ep: &Endpoint) -> ZResult<()> {
        let raddr = resolve(p, ep)?;
        let timeout = socket_timeout(ep)?;
        let sock = p.udp_open(raddr, timeout).map_err(|e| {
            zwarn!("UDP open failed: {}", e.kind().to_string().as_str());
            ZError::TransportOpenFailed
        })?;
        self.sock = Some(sock);
        *self.raddr.lock() = Some(raddr);
        Ok(())
    }

    pub fn listen<P: Platform<Socket = S>>(&mut self, p: &P, ep: &Endpoint) -> ZResult<()> {
        let laddr = resolve(p, ep)?;
        let timeout = socket_timeout(ep)?;
        let sock = p.udp_listen(laddr, timeout).map_err(|e| {
            zwarn!("UDP listen failed: {}", e.kind().to_string().as_str());
            ZError::TransportOpenFailed
        })?;
        self.sock = Some(sock);
        Ok(())
    }

    pub fn close<P: Platform<Socket = S>>(&mut self, p: &P) {
        if let Some(sock) = self.sock.take() {
            p.close(&sock);
        }
    }

    pub fn write<P: Platform<Socket = S>>(&self, p: &P, bytes: &[u8]) -> ZResult<usize> {
        let raddr = (*self.raddr.lock()).ok_or(ZError::IoGeneric)?;
        p.send_to(self.sock()?, bytes, raddr)
            .map_err(|_| ZError::IoGeneric)
    }

    pub fn read<P: Platform<Socket = S>>(
        &self,
        p: &P,
        buf: &mut [u8],
    ) -> ZResult<(usize, Option<SocketAddr>)> {
        match p.recv_from(self.sock()?, buf) {
            Ok((n, from)) => {
                self.raddr.lock().get_or_insert(from);
                Ok((n, Some(from)))
            }
            Err(e) if is_timeout(&e) => Ok((0, None)),
            Err(_) => Err(ZError::IoGeneric),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::create_link;
    use crate::platform::mock::{peer, MockPlatform};

    #[test]
    fn udp_unicast_is_best_effort_datagram() {
        let p = Arc::new(MockPlatform::default());
        let link = create_link(p, "udp/127.0.0.1:7447".parse().unwrap()).unwrap();
        assert!(!link.cap.reliable());
        assert!(!link.cap.is_streamed());
        assert!(!link.cap.is_multicast());
        assert_eq!(link.mtu, Z_LINK_UDP_UNICAST_MTU);
    }

    #[test]
    fn listener_answers_the_first_sender() {
        let p = Arc::new(MockPlatform::default());
        let mut link = create_link(p.clone(), "udp/0.0.0.0:7447".parse().unwrap()).unwrap();
        link.listen().unwrap();
        assert_eq!(link.write(b"early"), Err(ZError::IoGeneric));

        p.push_inbound(b"open", peer(9000));
        let mut buf = [0u8; 16];
        assert_eq!(link.read(&mut buf), Ok((4, Some(peer(9000)))));
        assert_eq!(link.write(b"accept"), Ok(6));
        assert_eq!(p.sent.lock().as_slice(), &[b"accept".to_vec()]);

        link.close();
        link.free();
        assert_eq!(p.open_sockets(), 0);
    }
}
