use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::rtp::RtpSequencer;
use super::sample::LengthPrefixedUnits;

/// Annex B 4-byte start code.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];
/// Annex B 3-byte start code.
pub const SHORT_START_CODE: [u8; 3] = [0, 0, 1];

pub const NAL_TYPE_NON_IDR_SLICE: u8 = 1;
pub const NAL_TYPE_IDR_SLICE: u8 = 5;
pub const NAL_TYPE_SPS: u8 = 7;
pub const NAL_TYPE_PPS: u8 = 8;
/// Highest type carried as a Single NAL Unit packet (RFC 6184 §5.6).
pub const NAL_TYPE_SINGLE_MAX: u8 = 23;
pub const NAL_TYPE_STAP_A: u8 = 24;
pub const NAL_TYPE_FU_A: u8 = 28;

const DEFAULT_MTU: usize = 1400;

/// Whether a NAL type closes an access unit (coded slice or IDR slice).
pub fn is_boundary_type(nal_type: u8) -> bool {
    nal_type == NAL_TYPE_NON_IDR_SLICE || nal_type == NAL_TYPE_IDR_SLICE
}

/// One H.264 NAL unit, header byte included.
///
/// ```text
/// +---------------+
/// |0|1|2|3|4|5|6|7|
/// +-+-+-+-+-+-+-+-+
/// |F|NRI|  Type   |
/// +---------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    data: Vec<u8>,
}

impl NalUnit {
    /// Wrap raw NAL bytes. Returns `None` for an empty buffer, which has no
    /// header to classify.
    pub fn from_bytes(data: Vec<u8>) -> Option<Self> {
        if data.is_empty() {
            None
        } else {
            Some(Self { data })
        }
    }

    pub fn header(&self) -> u8 {
        self.data[0]
    }

    pub fn forbidden_zero_bit(&self) -> bool {
        self.header() & 0x80 != 0
    }

    pub fn nri(&self) -> u8 {
        (self.header() & 0x60) >> 5
    }

    pub fn unit_type(&self) -> u8 {
        self.header() & 0x1f
    }

    pub fn is_boundary(&self) -> bool {
        is_boundary_type(self.unit_type())
    }

    /// Bytes following the header byte.
    pub fn payload(&self) -> &[u8] {
        &self.data[1..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Split a reconstructed Annex B byte stream into NAL units.
///
/// The stream is split on the 4-byte start code, dropping empty tokens.
/// Within each token every 3-byte start code is removed and the remaining
/// pieces are joined, so one token always yields exactly one unit: 3-byte
/// codes never open a new unit here. They only appear when positional FU-A
/// concatenation recreates the pattern.
///
/// Genuine payload bytes equal to `00 00 01` are stripped as well. H.264
/// emulation prevention normally rules that pattern out inside a NAL, but a
/// stream that violates it is silently altered.
pub fn segment(stream: &[u8]) -> Vec<NalUnit> {
    split_non_empty(stream, &START_CODE)
        .into_iter()
        .filter_map(|token| {
            let unit = split_non_empty(token, &SHORT_START_CODE).concat();
            let unit = NalUnit::from_bytes(unit);
            if unit.is_none() {
                tracing::trace!(token_len = token.len(), "token empty after start code strip");
            }
            unit
        })
        .collect()
}

/// Re-encode units as an Annex B stream with 4-byte start codes.
pub fn serialize(units: &[NalUnit]) -> Vec<u8> {
    let len = units.iter().map(|u| u.data.len() + START_CODE.len()).sum();
    let mut out = Vec::with_capacity(len);
    for unit in units {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(&unit.data);
    }
    out
}

/// Leftmost, non-overlapping split on `delim`, without empty tokens.
fn split_non_empty<'a>(data: &'a [u8], delim: &[u8]) -> Vec<&'a [u8]> {
    let mut tokens = Vec::new();
    let mut last = 0usize;
    while let Some(pos) = find(&data[last..], delim) {
        if pos > 0 {
            tokens.push(&data[last..last + pos]);
        }
        last += pos + delim.len();
    }
    if last < data.len() {
        tokens.push(&data[last..]);
    }
    tokens
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// H.264 RTP packetizer (RFC 6184) for replayed access units.
///
/// Takes samples in length-prefixed framing (each NAL preceded by a 4-byte
/// big-endian length) and produces RTP packets using two modes:
///
/// - **Single NAL Unit** (§5.6): NALs that fit within the MTU are sent
///   as-is in a single RTP packet (12-byte header + NAL bytes).
///
/// - **FU-A Fragmentation** (§5.8): NALs exceeding the MTU are split
///   across multiple RTP packets, each carrying a 2-byte FU header:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU - 2 bytes)
///   ```
///
/// The RTP timestamp is not derived from a frame rate: the caller sets it
/// per sample from the recorded timestamps via
/// [`set_timestamp`](Self::set_timestamp). The marker bit is set on the last
/// packet of each sample.
///
/// SPS/PPS are captured from the first samples that carry them so the
/// session description can advertise `profile-level-id` and
/// `sprop-parameter-sets` (RFC 6184 §8.1).
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpSequencer,
    mtu: usize,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl H264Packetizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self::from_sequencer(RtpSequencer::new(pt, ssrc))
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::from_sequencer(RtpSequencer::with_random_ssrc(pt))
    }

    fn from_sequencer(header: RtpSequencer) -> Self {
        Self {
            header,
            mtu: DEFAULT_MTU,
            sps: None,
            pps: None,
        }
    }

    /// Maximum RTP payload size. Values below 3 cannot carry an FU-A
    /// fragment and are raised to 3.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(3);
        self
    }

    pub fn payload_type(&self) -> u8 {
        self.header.pt
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    /// 90 kHz clock rate per RFC 6184 §8.1.
    pub fn clock_rate(&self) -> u32 {
        90_000
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.header.set_timestamp(timestamp);
    }

    /// Packetize one length-prefixed sample into RTP packets.
    pub fn packetize_sample(&mut self, sample: &[u8]) -> Vec<Vec<u8>> {
        let nal_units: Vec<&[u8]> = LengthPrefixedUnits::new(sample).collect();
        self.capture_parameter_sets(&nal_units);

        let mut packets = Vec::new();
        for (i, nal) in nal_units.iter().enumerate() {
            let is_last = i + 1 == nal_units.len();
            packets.append(&mut self.packetize_nal(nal, is_last));
        }

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = packets.len(),
            sample_bytes = sample.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "sample packetized"
        );

        packets
    }

    fn capture_parameter_sets(&mut self, nal_units: &[&[u8]]) {
        if self.sps.is_some() && self.pps.is_some() {
            return;
        }
        for nal in nal_units.iter().filter(|n| !n.is_empty()) {
            let nal_type = nal[0] & 0x1f;
            if nal_type == NAL_TYPE_SPS && self.sps.is_none() {
                self.sps = Some(nal.to_vec());
                tracing::debug!("H.264 SPS captured from sample ({} bytes)", nal.len());
            } else if nal_type == NAL_TYPE_PPS && self.pps.is_none() {
                self.pps = Some(nal.to_vec());
                tracing::debug!("H.264 PPS captured from sample ({} bytes)", nal.len());
            }
        }
    }

    fn packetize_nal(&mut self, nal_unit: &[u8], is_last_nal: bool) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();

        if nal_unit.is_empty() {
            return packets;
        }

        if nal_unit.len() <= self.mtu {
            let hdr = self.header.write(is_last_nal);
            let mut packet = Vec::with_capacity(hdr.len() + nal_unit.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(nal_unit);
            packets.push(packet);
            return packets;
        }

        let nal_header = nal_unit[0];
        let nal_type = nal_header & 0x1f;
        let fu_indicator = (nal_header & 0x60) | NAL_TYPE_FU_A;
        let payload = &nal_unit[1..];
        let max_fragment = self.mtu - 2;

        let mut chunks = payload.chunks(max_fragment).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let last_fragment = chunks.peek().is_none();
            let start_bit = if first { 0x80 } else { 0x00 };
            let end_bit = if last_fragment { 0x40 } else { 0x00 };

            let hdr = self.header.write(is_last_nal && last_fragment);
            let mut packet = Vec::with_capacity(hdr.len() + 2 + chunk.len());
            packet.extend_from_slice(&hdr);
            packet.push(fu_indicator);
            packet.push(start_bit | end_bit | nal_type);
            packet.extend_from_slice(chunk);
            packets.push(packet);
            first = false;
        }

        tracing::trace!(
            nal_type,
            nal_size = nal_unit.len(),
            fragments = packets.len(),
            "FU-A fragmented NAL unit"
        );

        packets
    }

    /// `profile-level-id` from the captured SPS: profile_idc, constraint flags, level_idc.
    pub fn profile_level_id(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        if sps.len() < 4 {
            return None;
        }
        Some(format!("{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
    }

    pub fn sprop_parameter_sets(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        let pps = self.pps.as_deref()?;
        Some(format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ))
    }

    /// `a=rtpmap` and `a=fmtp` lines for this stream, rtpmap first.
    pub fn sdp_attributes(&self) -> Vec<String> {
        let pt = self.payload_type();
        let mut fmtp = format!("a=fmtp:{pt} packetization-mode=1");
        if let Some(pl) = self.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={pl}"));
        }
        if let Some(sprop) = self.sprop_parameter_sets() {
            fmtp.push_str(&format!(";sprop-parameter-sets={sprop}"));
        }
        vec![format!("a=rtpmap:{pt} H264/{}", self.clock_rate()), fmtp]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    fn unit(bytes: &[u8]) -> NalUnit {
        NalUnit::from_bytes(bytes.to_vec()).unwrap()
    }

    fn length_prefixed(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in nals {
            out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
            out.extend_from_slice(nal);
        }
        out
    }

    // --- NAL header ---

    #[test]
    fn header_fields() {
        let u = unit(&[0x65, 0x88]);
        assert!(!u.forbidden_zero_bit());
        assert_eq!(u.nri(), 3);
        assert_eq!(u.unit_type(), 5);
        assert!(u.is_boundary());
        assert_eq!(u.payload(), &[0x88]);

        let sps = unit(&[0x67, 0x42]);
        assert!(!sps.is_boundary());
        assert!(NalUnit::from_bytes(Vec::new()).is_none());
    }

    // --- Segmentation ---

    #[test]
    fn segments_four_byte_start_codes() {
        let stream = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68, 0xCE];
        let units = segment(&stream);
        assert_eq!(units, vec![unit(&[0x67, 0x42]), unit(&[0x68, 0xCE])]);
    }

    #[test]
    fn three_byte_start_codes_are_stripped_not_split() {
        let stream = [0, 0, 0, 1, 0x65, 0xAA, 0, 0, 1, 0xBB, 0xCC];
        let units = segment(&stream);
        assert_eq!(units, vec![unit(&[0x65, 0xAA, 0xBB, 0xCC])]);
    }

    #[test]
    fn leading_garbage_becomes_its_own_unit() {
        let stream = [0x41, 0x01, 0, 0, 0, 1, 0x65, 0x02];
        let units = segment(&stream);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_bytes(), &[0x41, 0x01]);
    }

    #[test]
    fn empty_and_start_code_only_streams() {
        assert!(segment(&[]).is_empty());
        assert!(segment(&START_CODE).is_empty());
        assert!(segment(&[0, 0, 0, 1, 0, 0, 1]).is_empty());
    }

    #[test]
    fn segment_of_serialized_units_is_identity() {
        let units = vec![
            unit(&[0x67, 0x42, 0x00, 0x1e, 0x9a]),
            unit(&[0x68, 0xce, 0x38, 0x80]),
            unit(&[0x65, 0x88, 0x84, 0x21]),
            unit(&[0x41, 0x9a, 0x02]),
        ];
        assert_eq!(segment(&serialize(&units)), units);
    }

    // --- Packetization ---

    #[test]
    fn small_sample_single_nal_packets() {
        let mut p = H264Packetizer::new(102, 1);
        p.set_timestamp(9000);
        let sample = length_prefixed(&[&[0x67, 0x42, 0x00, 0x1e], &[0x65, 0xAA, 0xBB]]);
        let packets = p.packetize_sample(&sample);
        assert_eq!(packets.len(), 2);

        let (h0, payload0) = RtpHeader::parse(&packets[0]).unwrap();
        let (h1, payload1) = RtpHeader::parse(&packets[1]).unwrap();
        assert!(!h0.marker);
        assert!(h1.marker, "marker on last packet of the access unit");
        assert_eq!(h0.timestamp, 9000);
        assert_eq!(h1.timestamp, 9000);
        assert_eq!(payload0, &[0x67, 0x42, 0x00, 0x1e]);
        assert_eq!(payload1, &[0x65, 0xAA, 0xBB]);
    }

    #[test]
    fn large_nal_fragmented() {
        let mut p = H264Packetizer::new(96, 0x11223344).with_mtu(100);
        let mut nal = vec![0x65];
        nal.extend(vec![0xAA; 250]);
        let packets = p.packetize_sample(&length_prefixed(&[&nal]));
        assert_eq!(packets.len(), 3);

        assert_eq!(packets[0][12] & 0x1f, NAL_TYPE_FU_A);
        assert_eq!(packets[0][12] & 0x60, 0x60, "NRI carried in FU indicator");
        assert_eq!(packets[0][13], 0x80 | 5);
        assert_eq!(packets[1][13], 5);

        let last = packets.last().unwrap();
        assert_eq!(last[13], 0x40 | 5);
        assert_eq!(last[1] & 0x80, 0x80);
        assert_eq!(packets[0][1] & 0x80, 0);

        let carried: usize = packets.iter().map(|p| p.len() - 14).sum();
        assert_eq!(carried, 250);
    }

    #[test]
    fn captures_parameter_sets_for_sdp() {
        let mut p = H264Packetizer::new(102, 1);
        assert_eq!(
            p.sdp_attributes(),
            vec!["a=rtpmap:102 H264/90000", "a=fmtp:102 packetization-mode=1"]
        );

        let sample = length_prefixed(&[
            &[0x67, 0x42, 0x00, 0x1e],
            &[0x68, 0xce, 0x38, 0x80],
            &[0x65, 0x88, 0x00],
        ]);
        p.packetize_sample(&sample);
        assert_eq!(p.profile_level_id().as_deref(), Some("42001e"));
        let fmtp = &p.sdp_attributes()[1];
        assert!(fmtp.contains("profile-level-id=42001e"));
        assert!(fmtp.contains("sprop-parameter-sets=Z0IAHg==,aM44gA=="));
    }
}
