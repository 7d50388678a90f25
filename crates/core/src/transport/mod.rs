//! Outbound media transport.
//!
//! Replayed samples leave the process as RTP over UDP:
//!
//! - [`udp`]: a single ephemeral socket sending datagrams to one
//!   destination.
//! - [`rtp_sink`]: the [`MediaSink`](crate::media::MediaSink) that
//!   packetizes each sample (RFC 6184) and hands the packets to [`udp`].
//!
//! Session negotiation (ICE, DTLS-SRTP, RTCP feedback) is left to whatever
//! receives the stream; the session description from [`crate::sdp`] is
//! enough for a plain RTP receiver.

pub mod rtp_sink;
pub mod udp;

pub use rtp_sink::RtpSink;
pub use udp::UdpTransport;
