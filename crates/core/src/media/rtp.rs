use crate::error::{MalformedKind, ReplayError, Result};

/// Length of the RTP fixed header (RFC 3550 §5.1).
pub const FIXED_HEADER_LEN: usize = 12;

/// Parsed RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |            CSRC list (CC x 32 bits, skipped)                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Only lives for the duration of one packet's parse. The header extension
/// and padding flags are recorded but not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    /// Parse the fixed header and return it with the payload that follows
    /// the CSRC list.
    ///
    /// Lengths are checked before any field is read: a packet shorter than
    /// 12 bytes, or one whose CSRC list runs past its end, is
    /// [`ReplayError::MalformedPacket`].
    pub fn parse(packet: &[u8]) -> Result<(Self, &[u8])> {
        if packet.len() < FIXED_HEADER_LEN {
            return Err(ReplayError::malformed(MalformedKind::TooShort {
                len: packet.len(),
            }));
        }

        let header = RtpHeader {
            version: packet[0] >> 6,
            padding: packet[0] & 0x20 != 0,
            extension: packet[0] & 0x10 != 0,
            csrc_count: packet[0] & 0x0f,
            marker: packet[1] & 0x80 != 0,
            payload_type: packet[1] & 0x7f,
            sequence: u16::from_be_bytes([packet[2], packet[3]]),
            timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
        };

        let payload_start = FIXED_HEADER_LEN + 4 * usize::from(header.csrc_count);
        if payload_start > packet.len() {
            return Err(ReplayError::malformed(MalformedKind::CsrcOverrun {
                csrc_count: header.csrc_count,
                len: packet.len(),
            }));
        }

        Ok((header, &packet[payload_start..]))
    }
}

/// Outbound RTP fixed header builder.
///
/// Keeps the per-stream state a sender needs between packets:
/// - **Sequence number**: 16-bit, wrapping — incremented on every packet.
/// - **Timestamp**: set explicitly per access unit from the replayed
///   capture's timestamps rather than advanced by a frame rate.
/// - **SSRC** and payload type: fixed for the stream.
///
/// Version is always 2. Padding, extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpSequencer {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpSequencer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP sequencer created"
        );
        Self {
            pt,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC.
    ///
    /// Per RFC 3550 §8.1, the SSRC should be chosen randomly to minimize
    /// the probability of collisions between independent sessions.
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::new(pt, rand::random::<u32>())
    }

    /// Sequence number the next [`write`](Self::write) will use.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Timestamp stamped on subsequent packets until changed again.
    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// Serialize a 12-byte RTP fixed header and advance the sequence number.
    ///
    /// For H.264 the `marker` bit is set on the last RTP packet of an access
    /// unit (RFC 6184 §5.1).
    pub fn write(&mut self, marker: bool) -> [u8; FIXED_HEADER_LEN] {
        let mut header = [0u8; FIXED_HEADER_LEN];
        header[0] = 2 << 6;
        header[1] = ((marker as u8) << 7) | (self.pt & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(first: u8, second: u8, seq: u16, ts: u32, ssrc: u32, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![first, second];
        p.extend_from_slice(&seq.to_be_bytes());
        p.extend_from_slice(&ts.to_be_bytes());
        p.extend_from_slice(&ssrc.to_be_bytes());
        p.extend_from_slice(payload);
        p
    }

    #[test]
    fn parses_fixed_header_fields() {
        let p = packet(0x80 | 0x20 | 0x10, 0x80 | 102, 0x1234, 90_000, 0xAABBCCDD, &[0x65]);
        let (h, payload) = RtpHeader::parse(&p).unwrap();
        assert_eq!(h.version, 2);
        assert!(h.padding);
        assert!(h.extension);
        assert_eq!(h.csrc_count, 0);
        assert!(h.marker);
        assert_eq!(h.payload_type, 102);
        assert_eq!(h.sequence, 0x1234);
        assert_eq!(h.timestamp, 90_000);
        assert_eq!(h.ssrc, 0xAABBCCDD);
        assert_eq!(payload, &[0x65]);
    }

    #[test]
    fn short_packet_is_malformed() {
        let err = RtpHeader::parse(&[0x80; 11]).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::MalformedPacket {
                kind: MalformedKind::TooShort { len: 11 }
            }
        ));
    }

    #[test]
    fn csrc_list_is_skipped() {
        let mut payload = vec![0, 0, 0, 7, 0, 0, 0, 8];
        payload.push(0x41);
        let p = packet(0x82, 96, 1, 2, 3, &payload);
        let (h, rest) = RtpHeader::parse(&p).unwrap();
        assert_eq!(h.csrc_count, 2);
        assert_eq!(rest, &[0x41]);
    }

    #[test]
    fn csrc_overrun_is_malformed() {
        let p = packet(0x8f, 96, 1, 2, 3, &[0; 8]);
        let err = RtpHeader::parse(&p).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn sequencer_writes_parseable_headers() {
        let mut s = RtpSequencer::new(102, 1);
        s.set_timestamp(3000);
        let first = s.write(false);
        let second = s.write(true);

        let (h1, _) = RtpHeader::parse(&first).unwrap();
        let (h2, _) = RtpHeader::parse(&second).unwrap();
        assert_eq!(h1.version, 2);
        assert_eq!(h1.payload_type, 102);
        assert_eq!(h1.timestamp, 3000);
        assert!(!h1.marker);
        assert!(h2.marker);
        assert_eq!(h2.sequence, h1.sequence + 1);
        assert_eq!(h2.ssrc, 1);
    }

    #[test]
    fn sequence_wraps() {
        let mut s = RtpSequencer::new(96, 0xAABBCCDD);
        s.sequence = u16::MAX;
        let buf = s.write(false);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), u16::MAX);
        assert_eq!(s.sequence(), 0);
    }

    #[test]
    fn random_ssrc_differs() {
        let s1 = RtpSequencer::with_random_ssrc(96);
        let s2 = RtpSequencer::with_random_ssrc(96);
        assert_ne!(s1.ssrc, s2.ssrc);
    }
}
