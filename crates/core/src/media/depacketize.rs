//! RTP → Annex B depacketization (RFC 6184).
//!
//! Each packet becomes zero or more start-code-delimited fragments:
//!
//! | Payload type | RFC 6184 | Output |
//! |--------------|----------|--------|
//! | 1–23 Single NAL | §5.6 | `00 00 00 01` + payload |
//! | 24 STAP-A | §5.7.1 | `00 00 00 01` + unit, per aggregated unit |
//! | 28 FU-A start | §5.8 | `00 00 00 01` + rebuilt NAL header + data |
//! | 28 FU-A middle/end | §5.8 | data only |
//! | anything else | | nothing |
//!
//! FU-A continuation data carries no start code: concatenating every
//! packet's fragments in capture order appends it to the NAL its start
//! fragment opened. Packets are never reordered and losses are not
//! detected, so a lost or reordered fragment corrupts its NAL.

use std::collections::HashMap;

use super::h264::{NAL_TYPE_FU_A, NAL_TYPE_SINGLE_MAX, NAL_TYPE_STAP_A, START_CODE};
use super::rtp::RtpHeader;
use crate::error::{MalformedKind, ReplayError, Result};

/// Largest packet the recorder's capture buffer held.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65_535;

const STAP_A_SIZE_LEN: usize = 2;
const FU_HEADER_LEN: usize = 2;

/// FU-A reassembly state for one SSRC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NalFragmentState {
    pub in_progress: bool,
    /// `F|NRI|Type` rebuilt from the FU indicator and FU header.
    pub reconstructed_header: u8,
}

/// Output of one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depacketized {
    pub header: RtpHeader,
    pub fragments: Vec<Vec<u8>>,
    /// Set when this packet carried an FU-A end fragment.
    pub fragment_end: bool,
}

impl Depacketized {
    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    /// All fragments concatenated, as the packet contributes to the stream.
    pub fn concat(&self) -> Vec<u8> {
        self.fragments.concat()
    }
}

/// Parse one RTP packet and reconstruct its Annex B fragments.
///
/// Errors are recoverable: the caller skips the packet and continues.
pub fn depacketize(packet: &[u8], state: &mut NalFragmentState) -> Result<Depacketized> {
    let (header, payload) = RtpHeader::parse(packet)?;
    depacketize_payload(header, payload, state)
}

fn depacketize_payload(
    header: RtpHeader,
    payload: &[u8],
    state: &mut NalFragmentState,
) -> Result<Depacketized> {
    let Some(&nal_header) = payload.first() else {
        return Err(ReplayError::malformed(MalformedKind::EmptyPayload));
    };
    let nal_type = nal_header & 0x1f;

    let mut out = Depacketized {
        header,
        fragments: Vec::new(),
        fragment_end: false,
    };

    match nal_type {
        1..=NAL_TYPE_SINGLE_MAX => {
            out.fragments.push(with_start_code(&[], payload));
        }
        NAL_TYPE_STAP_A => {
            out.fragments = unpack_stap_a(&payload[1..], header.sequence);
        }
        NAL_TYPE_FU_A => {
            if payload.len() < FU_HEADER_LEN {
                return Err(ReplayError::malformed(
                    MalformedKind::TruncatedFragmentHeader { len: payload.len() },
                ));
            }
            let fu_header = payload[1];
            let start = fu_header & 0x80 != 0;
            let end = fu_header & 0x40 != 0;
            let data = &payload[FU_HEADER_LEN..];

            if start {
                if state.in_progress {
                    tracing::debug!(
                        seq = header.sequence,
                        previous_header = state.reconstructed_header,
                        "FU-A start while fragment in progress, restarting"
                    );
                }
                let nri = (nal_header & 0x60) >> 5;
                state.reconstructed_header = (nri << 5) | (fu_header & 0x1f);
                state.in_progress = true;
                out.fragments
                    .push(with_start_code(&[state.reconstructed_header], data));
            } else {
                if !state.in_progress {
                    tracing::debug!(seq = header.sequence, "FU-A continuation without start");
                }
                out.fragments.push(data.to_vec());
            }

            if end {
                state.in_progress = false;
                out.fragment_end = true;
            }
        }
        0 => {
            tracing::trace!(seq = header.sequence, "NAL type 0 ignored");
        }
        other => return Err(ReplayError::UnknownNalType(other)),
    }

    Ok(out)
}

fn with_start_code(nal_header: &[u8], data: &[u8]) -> Vec<u8> {
    let mut fragment = Vec::with_capacity(START_CODE.len() + nal_header.len() + data.len());
    fragment.extend_from_slice(&START_CODE);
    fragment.extend_from_slice(nal_header);
    fragment.extend_from_slice(data);
    fragment
}

/// Split a STAP-A body (after its 1-byte header) into start-coded units.
///
/// A zero size consumes exactly its two size bytes. A size that runs past
/// the end of the packet ends the packet; units before it are kept.
fn unpack_stap_a(mut body: &[u8], seq: u16) -> Vec<Vec<u8>> {
    let mut fragments = Vec::new();
    while body.len() >= STAP_A_SIZE_LEN {
        let size = usize::from(u16::from_be_bytes([body[0], body[1]]));
        body = &body[STAP_A_SIZE_LEN..];
        if size == 0 {
            tracing::trace!(seq, "zero-size STAP-A unit skipped");
            continue;
        }
        if size > body.len() {
            tracing::warn!(seq, size, available = body.len(), "STAP-A unit truncated");
            break;
        }
        let (unit, rest) = body.split_at(size);
        fragments.push(with_start_code(&[], unit));
        body = rest;
    }
    fragments
}

/// Counters gathered while depacketizing a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepacketizerStats {
    pub packets: u64,
    pub fragments: u64,
    pub malformed: u64,
    pub unknown_type: u64,
    pub fu_a_completed: u64,
    /// Highest RTP sequence number seen (numeric, not wrap-aware).
    pub highest_sequence: Option<u16>,
}

/// Stateful depacketizer keeping one [`NalFragmentState`] per SSRC.
#[derive(Debug)]
pub struct Depacketizer {
    states: HashMap<u32, NalFragmentState>,
    max_packet_size: usize,
    stats: DepacketizerStats,
}

impl Default for Depacketizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

impl Depacketizer {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            states: HashMap::new(),
            max_packet_size,
            stats: DepacketizerStats::default(),
        }
    }

    pub fn stats(&self) -> &DepacketizerStats {
        &self.stats
    }

    pub fn fragment_state(&self, ssrc: u32) -> Option<&NalFragmentState> {
        self.states.get(&ssrc)
    }

    /// Depacketize one packet, updating per-SSRC state and counters.
    pub fn push(&mut self, packet: &[u8]) -> Result<Depacketized> {
        let result = self.push_inner(packet);
        match &result {
            Ok(out) => {
                self.stats.packets += 1;
                self.stats.fragments += out.fragments.len() as u64;
                if out.fragment_end {
                    self.stats.fu_a_completed += 1;
                }
                tracing::trace!(
                    seq = out.header.sequence,
                    ts = out.header.timestamp,
                    fragments = out.fragments.len(),
                    "packet depacketized"
                );
            }
            Err(ReplayError::UnknownNalType(nal_type)) => {
                self.stats.packets += 1;
                self.stats.unknown_type += 1;
                tracing::warn!(nal_type, "unsupported NAL unit type, packet skipped");
            }
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, len = packet.len(), "packet skipped");
            }
        }
        result
    }

    fn push_inner(&mut self, packet: &[u8]) -> Result<Depacketized> {
        if packet.len() > self.max_packet_size {
            return Err(ReplayError::malformed(MalformedKind::Oversized {
                len: packet.len(),
                max: self.max_packet_size,
            }));
        }
        let (header, payload) = RtpHeader::parse(packet)?;

        if self
            .stats
            .highest_sequence
            .is_none_or(|highest| header.sequence > highest)
        {
            self.stats.highest_sequence = Some(header.sequence);
        }

        let state = self.states.entry(header.ssrc).or_default();
        depacketize_payload(header, payload, state)
    }
}
