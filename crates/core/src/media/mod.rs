//! H.264 over RTP: depacketizing recorded packets and packetizing replayed
//! samples.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping).
//! - **Timestamp** (32-bit) — media clock, 90 kHz for H.264 video.
//! - **SSRC** (32-bit) — identifies the stream.
//! - **Marker bit** — set on the last packet of an access unit.
//!
//! ## Inbound path
//!
//! | Step | Module | Output |
//! |------|--------|--------|
//! | RTP payload → Annex B fragments | [`depacketize`] | start-coded byte pieces |
//! | Annex B stream → NAL units | [`h264::segment`] | [`h264::NalUnit`] |
//! | NAL units → access units | [`sample`] | length-prefixed [`sample::Sample`] |
//!
//! ## Outbound path
//!
//! A finished sample is handed to a [`MediaSink`]. [`h264::H264Packetizer`]
//! turns it back into RTP for the UDP sink in [`crate::transport`].

pub mod depacketize;
pub mod h264;
pub mod rtp;
pub mod sample;

use crate::error::Result;

/// Destination for replayed samples.
///
/// Implementations own the outbound transport; the scheduler only sets the
/// timestamp and sends, one call at a time, never concurrently.
///
/// ## Failure signalling
///
/// - `Ok(true)`: the sample was accepted.
/// - `Ok(false)`: the sink refused the sample.
/// - `Err(_)`: a fault inside the sink.
///
/// The scheduler aborts playback on either of the last two.
pub trait MediaSink {
    /// RTP timestamp to stamp on the next sample.
    fn set_outgoing_timestamp(&mut self, timestamp: u32);

    /// Send one length-prefixed access unit.
    fn try_send(&mut self, sample: &[u8]) -> Result<bool>;
}

impl<S: MediaSink + ?Sized> MediaSink for Box<S> {
    fn set_outgoing_timestamp(&mut self, timestamp: u32) {
        (**self).set_outgoing_timestamp(timestamp);
    }

    fn try_send(&mut self, sample: &[u8]) -> Result<bool> {
        (**self).try_send(sample)
    }
}
