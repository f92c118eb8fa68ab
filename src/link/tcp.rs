use crate::{
    platform::{is_timeout, Platform},
    result::{ZError, ZResult},
    Z_LINK_TCP_MTU,
};

use super::{resolve, socket_timeout, Endpoint, Link, LinkCapabilities, LinkSocket, TransportCap, TransportFlow};

pub const SCHEME: &str = "tcp";

pub(crate) struct TcpLink<S> {
    sock: Option<S>,
}

pub(crate) fn new_link<P: Platform>(
    platform: std::sync::Arc<P>,
    endpoint: Endpoint,
) -> ZResult<Link<P>> {
    if endpoint.locator.port.is_none() {
        return Err(ZError::InvalidLocator);
    }
    Ok(Link::new(
        LinkCapabilities::new(TransportCap::Unicast, TransportFlow::Stream, true),
        Z_LINK_TCP_MTU,
        endpoint,
        platform,
        LinkSocket::Tcp(TcpLink { sock: None }),
    ))
}

impl<S> TcpLink<S> {
    fn sock(&self) -> ZResult<&S> {
        self.sock.as_ref().ok_or(ZError::IoGeneric)
    }

    pub fn open<P: Platform<Socket = S>>(&mut self, p: &P, ep: &Endpoint) -> ZResult<()> {
        let raddr = resolve(p, ep)?;
        let timeout = socket_timeout(ep)?;
        let sock = p.tcp_open(raddr, timeout).map_err(|e| {
            zwarn!("TCP connect failed: {}", e.kind().to_string().as_str());
            ZError::TransportOpenFailed
        })?;
        self.sock = Some(sock);
        Ok(())
    }

    pub fn listen<P: Platform<Socket = S>>(&mut self, p: &P, ep: &Endpoint) -> ZResult<()> {
        let laddr = resolve(p, ep)?;
        let timeout = socket_timeout(ep)?;
        let sock = p.tcp_listen(laddr, timeout).map_err(|e| {
            zwarn!("TCP listen failed: {}", e.kind().to_string().as_str());
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
        p.send(self.sock()?, bytes).map_err(|_| ZError::IoGeneric)
    }

    pub fn write_all<P: Platform<Socket = S>>(&self, p: &P, bytes: &[u8]) -> ZResult<usize> {
        let sock = self.sock()?;
        let mut sent = 0;
        while sent < bytes.len() {
            match p.send(sock, &bytes[sent..]) {
                Ok(0) => return Err(ZError::TxConnection),
                Ok(n) => sent += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => return Err(ZError::IoGeneric),
            }
        }
        Ok(sent)
    }

    /// A closed stream is [`ZError::TxConnection`]; a timeout reads nothing.
    pub fn read<P: Platform<Socket = S>>(&self, p: &P, buf: &mut [u8]) -> ZResult<usize> {
        match p.recv(self.sock()?, buf) {
            Ok(0) if !buf.is_empty() => Err(ZError::TxConnection),
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(_) => Err(ZError::IoGeneric),
        }
    }
}
