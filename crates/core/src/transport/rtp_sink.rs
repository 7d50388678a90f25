use std::net::SocketAddr;

use super::udp::UdpTransport;
use crate::error::Result;
use crate::media::MediaSink;
use crate::media::h264::H264Packetizer;

/// [`MediaSink`] that re-packetizes samples as RTP and sends them over UDP.
///
/// Every packet of a sample carries the timestamp last given to
/// [`set_outgoing_timestamp`](MediaSink::set_outgoing_timestamp); the last
/// one has the marker bit set.
#[derive(Debug)]
pub struct RtpSink {
    transport: UdpTransport,
    packetizer: H264Packetizer,
    packets_sent: u64,
}

impl RtpSink {
    pub fn bind(destination: SocketAddr, packetizer: H264Packetizer) -> Result<Self> {
        Ok(Self::new(UdpTransport::bind(destination)?, packetizer))
    }

    pub fn new(transport: UdpTransport, packetizer: H264Packetizer) -> Self {
        Self {
            transport,
            packetizer,
            packets_sent: 0,
        }
    }

    /// The packetizer, e.g. to describe the stream once parameter sets have
    /// been seen.
    pub fn packetizer(&self) -> &H264Packetizer {
        &self.packetizer
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }
}

impl MediaSink for RtpSink {
    fn set_outgoing_timestamp(&mut self, timestamp: u32) {
        self.packetizer.set_timestamp(timestamp);
    }

    fn try_send(&mut self, sample: &[u8]) -> Result<bool> {
        let packets = self.packetizer.packetize_sample(sample);
        if packets.is_empty() {
            tracing::warn!(bytes = sample.len(), "sample produced no RTP packets");
            return Ok(false);
        }

        for packet in &packets {
            let written = self.transport.send(packet)?;
            if written != packet.len() {
                tracing::warn!(written, len = packet.len(), "short UDP write");
                return Ok(false);
            }
            self.packets_sent += 1;
        }
        Ok(true)
    }
}
