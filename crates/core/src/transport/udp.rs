use std::net::{SocketAddr, UdpSocket};

use crate::error::Result;

/// UDP transport for outbound RTP packet delivery.
///
/// Binds a single ephemeral socket on the wildcard address of the
/// destination's family and sends every packet to one destination.
///
/// This layer is address-only: it knows nothing about samples or RTP. The
/// [`RtpSink`](super::RtpSink) packetizes before calling
/// [`send`](Self::send).
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for RTP towards `destination`.
    pub fn bind(destination: SocketAddr) -> Result<Self> {
        let local = if destination.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local)?;
        tracing::debug!(local = %socket.local_addr()?, %destination, "RTP socket bound");
        Ok(Self {
            socket,
            destination,
        })
    }

    /// Send one datagram to the destination.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        Ok(self.socket.send_to(payload, self.destination)?)
    }
}
