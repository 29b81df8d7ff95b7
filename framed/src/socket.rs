//! The DHCP UDP endpoint (§4.5).
//!
//! Binds with broadcast and address-reuse enabled and exposes a plain
//! datagram-in, datagram-out interface. Message parsing stays in the
//! engine (§4.4 step 1); this layer only moves bytes.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Large enough to decode any option list RFC 2131 permits.
pub const BUFFER_CAPACITY: usize = 8192;

/// A UDP socket bound for DHCP server traffic.
pub struct DhcpFramed {
    socket: UdpSocket,
}

impl DhcpFramed {
    /// Binds `addr`, enabling `SO_BROADCAST` and `SO_REUSEADDR` before
    /// the bind so a restart does not race a lingering socket in
    /// `TIME_WAIT` (§4.5).
    pub fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let domain = socket2::Domain::for_address(addr);
        let socket = socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        log::debug!("bound DHCP socket on {}", addr);
        Ok(DhcpFramed { socket })
    }

    /// Receives one datagram. The engine is responsible for decoding it
    /// and for dropping anything that fails to parse.
    pub async fn recv(&self) -> std::io::Result<(SocketAddr, Vec<u8>)> {
        let mut buf = vec![0u8; BUFFER_CAPACITY];
        let (amount, addr) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(amount);
        Ok((addr, buf))
    }

    /// Sends a single datagram to `addr`.
    pub async fn send_to(&self, addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()> {
        let sent = self.socket.send_to(bytes, addr).await?;
        if sent != bytes.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write entire datagram to socket",
            ));
        }
        Ok(())
    }

    /// The local address the socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_datagram_between_two_bound_sockets() {
        let server = DhcpFramed::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let client = DhcpFramed::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr = server.local_addr().unwrap();

        client.send_to(server_addr, b"hello dhcp").await.unwrap();
        let (from, bytes) = server.recv().await.unwrap();

        assert_eq!(bytes, b"hello dhcp");
        assert_eq!(from, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn two_sockets_can_bind_the_same_port_with_reuse_address() {
        let first = DhcpFramed::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        drop(first);

        // SO_REUSEADDR means a fresh bind to the same port does not race
        // a lingering TIME_WAIT socket from the one just dropped.
        let second = DhcpFramed::bind(addr);
        assert!(second.is_ok());
    }
}
