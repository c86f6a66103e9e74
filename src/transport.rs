use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Datagram I/O as seen by a [`crate::Session`].
///
/// Every receive is bounded: `recv_from` gives up after `wait` and returns
/// `Ok(None)`.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<()>;

    async fn recv_from(
        &mut self,
        buf: &mut [u8],
        wait: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Pin the transport to `peer`; datagrams from anywhere else must not be
    /// delivered afterwards.
    async fn connect(&mut self, peer: SocketAddr) -> io::Result<()>;
}

pub struct UdpTransport {
    socket: UdpSocket,
    connected: bool,
}

impl UdpTransport {
    /// Bind an ephemeral local port in the address family of `peer`.
    pub async fn bind_for(peer: SocketAddr) -> io::Result<Self> {
        let any: IpAddr = match peer {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind(SocketAddr::new(any, 0)).await?;
        Ok(Self::from_socket(socket))
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            connected: false,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    async fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<()> {
        let n = if self.connected {
            self.socket.send(buf).await?
        } else {
            self.socket.send_to(buf, peer).await?
        };
        if n != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("only sent {n} bytes of {}", buf.len()),
            ));
        }
        Ok(())
    }

    async fn recv_from(
        &mut self,
        buf: &mut [u8],
        wait: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match timeout(wait, self.socket.recv_from(buf)).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn connect(&mut self, peer: SocketAddr) -> io::Result<()> {
        self.socket.connect(peer).await?;
        self.connected = true;
        Ok(())
    }
}
