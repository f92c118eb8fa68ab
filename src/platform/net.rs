use std::{
    io::{self, Read, Write},
    net::{
        IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs,
        UdpSocket,
    },
    time::Duration,
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::Platform;

/// [`Platform`] over `std::net`, with `socket2` for the options std does not expose.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdPlatform;

#[derive(Debug)]
pub enum StdSocket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl StdSocket {
    fn udp(&self) -> io::Result<&UdpSocket> {
        match self {
            StdSocket::Udp(s) => Ok(s),
            StdSocket::Tcp(_) => Err(io::ErrorKind::Unsupported.into()),
        }
    }
}

fn timeout_or_none(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

fn unspecified(addr: &SocketAddr) -> IpAddr {
    match addr {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

fn tcp_stream(stream: TcpStream, timeout: Duration) -> io::Result<StdSocket> {
    stream.set_read_timeout(timeout_or_none(timeout))?;
    stream.set_nodelay(true)?;
    Ok(StdSocket::Tcp(stream))
}

impl Platform for StdPlatform {
    type Socket = StdSocket;

    fn resolve(&self, address: &str, port: &str) -> io::Result<SocketAddr> {
        let port: u16 = port
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid port"))?;
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }
        (address, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::ErrorKind::NotFound.into())
    }

    fn tcp_open(&self, raddr: SocketAddr, timeout: Duration) -> io::Result<StdSocket> {
        let stream = match timeout_or_none(timeout) {
            Some(t) => TcpStream::connect_timeout(&raddr, t)?,
            None => TcpStream::connect(raddr)?,
        };
        tcp_stream(stream, timeout)
    }

    fn tcp_listen(&self, laddr: SocketAddr, timeout: Duration) -> io::Result<StdSocket> {
        let socket = Socket::new(Domain::for_address(laddr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(laddr))?;
        socket.listen(1)?;
        let listener = TcpListener::from(socket);
        let (stream, _) = listener.accept()?;
        tcp_stream(stream, timeout)
    }

    fn udp_open(&self, raddr: SocketAddr, timeout: Duration) -> io::Result<StdSocket> {
        let socket = UdpSocket::bind(SocketAddr::new(unspecified(&raddr), 0))?;
        socket.set_read_timeout(timeout_or_none(timeout))?;
        Ok(StdSocket::Udp(socket))
    }

    fn udp_listen(&self, laddr: SocketAddr, timeout: Duration) -> io::Result<StdSocket> {
        let socket = Socket::new(Domain::for_address(laddr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(laddr))?;
        socket.set_read_timeout(timeout_or_none(timeout))?;
        Ok(StdSocket::Udp(UdpSocket::from(socket)))
    }

    fn udp_multicast_open(
        &self,
        group: SocketAddr,
        iface: Option<IpAddr>,
        timeout: Duration,
    ) -> io::Result<(StdSocket, SocketAddr)> {
        let socket = Socket::new(Domain::for_address(group), Type::DGRAM, Some(Protocol::UDP))?;
        let bind_ip = iface.unwrap_or_else(|| unspecified(&group));
        socket.bind(&SockAddr::from(SocketAddr::new(bind_ip, 0)))?;
        match (group, iface) {
            (SocketAddr::V4(_), Some(IpAddr::V4(ip))) => socket.set_multicast_if_v4(&ip)?,
            (SocketAddr::V6(_), _) => socket.set_multicast_if_v6(0)?,
            _ => {}
        }
        socket.set_read_timeout(timeout_or_none(timeout))?;

        let socket = UdpSocket::from(socket);
        let laddr = socket.local_addr()?;
        Ok((StdSocket::Udp(socket), laddr))
    }

    fn udp_multicast_listen(
        &self,
        group: SocketAddr,
        iface: Option<IpAddr>,
        timeout: Duration,
    ) -> io::Result<StdSocket> {
        let socket = Socket::new(Domain::for_address(group), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(SocketAddr::new(unspecified(&group), group.port())))?;
        match (group.ip(), iface) {
            (IpAddr::V4(g), Some(IpAddr::V4(ip))) => socket.join_multicast_v4(&g, &ip)?,
            (IpAddr::V4(g), _) => socket.join_multicast_v4(&g, &Ipv4Addr::UNSPECIFIED)?,
            (IpAddr::V6(g), _) => socket.join_multicast_v6(&g, 0)?,
        }
        socket.set_read_timeout(timeout_or_none(timeout))?;
        Ok(StdSocket::Udp(UdpSocket::from(socket)))
    }

    fn udp_multicast_leave(
        &self,
        socket: &StdSocket,
        group: SocketAddr,
        iface: Option<IpAddr>,
    ) -> io::Result<()> {
        let socket = socket.udp()?;
        match (group.ip(), iface) {
            (IpAddr::V4(g), Some(IpAddr::V4(ip))) => socket.leave_multicast_v4(&g, &ip),
            (IpAddr::V4(g), _) => socket.leave_multicast_v4(&g, &Ipv4Addr::UNSPECIFIED),
            (IpAddr::V6(g), _) => socket.leave_multicast_v6(&g, 0),
        }
    }

    fn close(&self, socket: &StdSocket) {
        if let StdSocket::Tcp(s) = socket {
            // The peer may already be gone.
            let _ = s.shutdown(Shutdown::Both);
        }
    }

    fn send(&self, socket: &StdSocket, buf: &[u8]) -> io::Result<usize> {
        match socket {
            StdSocket::Tcp(s) => {
                let mut s: &TcpStream = s;
                s.write(buf)
            }
            StdSocket::Udp(s) => s.send(buf),
        }
    }

    fn send_to(&self, socket: &StdSocket, buf: &[u8], raddr: SocketAddr) -> io::Result<usize> {
        socket.udp()?.send_to(buf, raddr)
    }

    fn recv(&self, socket: &StdSocket, buf: &mut [u8]) -> io::Result<usize> {
        match socket {
            StdSocket::Tcp(s) => {
                let mut s: &TcpStream = s;
                s.read(buf)
            }
            StdSocket::Udp(s) => s.recv(buf),
        }
    }

    fn recv_from(&self, socket: &StdSocket, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        socket.udp()?.recv_from(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_literal_and_invalid_port() {
        let p = StdPlatform;
        assert_eq!(
            p.resolve("::1", "7447").unwrap(),
            "[::1]:7447".parse::<SocketAddr>().unwrap()
        );
        assert!(p.resolve("127.0.0.1", "port").is_err());
    }

    #[test]
    fn udp_loopback_send_and_timeout() {
        let p = StdPlatform;
        let rx = p
            .udp_listen("127.0.0.1:0".parse().unwrap(), Duration::from_millis(50))
            .unwrap();
        let laddr = rx.udp().unwrap().local_addr().unwrap();
        let tx = p.udp_open(laddr, Duration::from_millis(50)).unwrap();

        p.send_to(&tx, b"ping", laddr).unwrap();
        let mut buf = [0u8; 16];
        let (n, _) = p.recv_from(&rx, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");

        let err = p.recv_from(&rx, &mut buf).unwrap_err();
        assert!(super::super::is_timeout(&err));
    }
}
