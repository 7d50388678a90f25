//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! Describes the replayed video track so a plain RTP receiver (or a
//! signaling layer) can consume it:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=<user> <sess-id> <sess-ver> IN IP4 <addr>  ← origin
//! s=<session-name>                             ← session name
//! c=IN IP4 <addr>                              ← destination address
//! t=0 0                                        ← timing (unbounded)
//! a=tool:rtp-replay                            ← generating software
//! a=sendonly                                   ← direction
//! m=video <port> RTP/AVP <pt>                  ← media description
//! a=rtpmap:<pt> H264/90000                     ← codec/clock rate
//! a=fmtp:<pt> packetization-mode=1[;...]       ← codec parameters
//! a=mid:<cname>                                ← media id
//! a=ssrc:<ssrc> cname:<cname>                  ← source (RFC 5576)
//! a=ssrc:<ssrc> msid:<msid> <cname>
//! a=msid:<msid> <cname>                        ← stream/track (RFC 8830)
//! ```

use std::net::SocketAddr;

use crate::media::h264::H264Packetizer;
use crate::replayer::ReplayConfig;

/// Generate a session description for the outbound track.
///
/// Call after the first sample has been packetized to include
/// `profile-level-id` and `sprop-parameter-sets`.
pub fn generate_sdp(
    packetizer: &H264Packetizer,
    destination: SocketAddr,
    config: &ReplayConfig,
) -> String {
    let family = if destination.is_ipv4() { "IP4" } else { "IP6" };
    let ip = destination.ip();
    let pt = packetizer.payload_type();
    let ssrc = packetizer.ssrc();

    let mut sdp: Vec<String> = vec![
        "v=0".to_string(),
        format!(
            "o={} {} {} IN {} {}",
            config.sdp_username, config.sdp_session_id, config.sdp_session_version, family, ip
        ),
        format!("s={}", config.sdp_session_name),
        format!("c=IN {} {}", family, ip),
        "t=0 0".to_string(),
        "a=tool:rtp-replay".to_string(),
        "a=sendonly".to_string(),
        format!("m=video {} RTP/AVP {}", destination.port(), pt),
    ];
    sdp.extend(packetizer.sdp_attributes());
    sdp.push(format!("a=mid:{}", config.cname));
    sdp.push(format!("a=ssrc:{} cname:{}", ssrc, config.cname));
    sdp.push(format!("a=ssrc:{} msid:{} {}", ssrc, config.msid, config.cname));
    sdp.push(format!("a=msid:{} {}", config.msid, config.cname));

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
