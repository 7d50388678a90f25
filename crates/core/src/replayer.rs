use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::capture::CaptureFormat;
use crate::error::{ReplayError, Result};
use crate::media::MediaSink;
use crate::media::depacketize::DEFAULT_MAX_PACKET_SIZE;
use crate::media::h264::H264Packetizer;
use crate::playlist::Playlist;
use crate::scheduler::{PlaybackReport, Scheduler};
use crate::session::{PeerRegistry, PeerState};
use crate::transport::RtpSink;

/// Replay configuration.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Record header layout of the capture file.
    pub capture_format: CaptureFormat,
    /// Packets larger than this are rejected as malformed.
    pub max_packet_size: usize,
    /// Outbound RTP payload type.
    pub payload_type: u8,
    /// Outbound SSRC. `None` picks a random one.
    pub ssrc: Option<u32>,
    /// Largest outbound RTP payload before FU-A fragmentation.
    pub mtu: usize,
    /// Canonical name of the outbound track (`a=ssrc:... cname:`).
    pub cname: String,
    /// Media stream id of the outbound track (`a=msid:`).
    pub msid: String,
    /// Sleep between samples according to their recorded timestamps.
    pub pacing: bool,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP origin session id field.
    pub sdp_session_id: String,
    /// SDP origin session version field.
    pub sdp_session_version: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            capture_format: CaptureFormat::Plain,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            payload_type: 102,
            ssrc: Some(1),
            mtu: 1400,
            cname: "video-stream".to_string(),
            msid: "stream1".to_string(),
            pacing: true,
            sdp_username: "-".to_string(),
            sdp_session_id: "0".to_string(),
            sdp_session_version: "0".to_string(),
            sdp_session_name: "Replay".to_string(),
        }
    }
}

impl ReplayConfig {
    /// Packetizer for the outbound track described by this config.
    pub fn packetizer(&self) -> H264Packetizer {
        let packetizer = match self.ssrc {
            Some(ssrc) => H264Packetizer::new(self.payload_type, ssrc),
            None => H264Packetizer::with_random_ssrc(self.payload_type),
        };
        packetizer.with_mtu(self.mtu)
    }
}

/// Prepares captures and plays them to sinks or registered peers.
///
/// Owns the configuration, a [`PeerRegistry`] and a stop flag shared with
/// every scheduler it starts.
pub struct Replayer {
    config: ReplayConfig,
    peers: PeerRegistry,
    stop: Arc<AtomicBool>,
}

impl Replayer {
    pub fn new(config: ReplayConfig) -> Self {
        Self::with_registry(config, PeerRegistry::new())
    }

    pub fn with_registry(config: ReplayConfig, peers: PeerRegistry) -> Self {
        Self {
            config,
            peers,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Stops playback before the next send or sleep.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        tracing::info!("replay stopping");
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Read and prepare a whole capture. Fails only if it cannot be opened.
    pub fn prepare(&self, capture: impl AsRef<Path>) -> Result<Playlist> {
        Playlist::from_capture(capture, &self.config)
    }

    fn scheduler(&self) -> Scheduler {
        let scheduler = Scheduler::new().with_stop_flag(self.stop.clone());
        if self.config.pacing {
            scheduler
        } else {
            scheduler.without_pacing()
        }
    }

    /// Play a prepared capture into any sink.
    pub fn play<S: MediaSink + ?Sized>(
        &self,
        playlist: &Playlist,
        sink: &mut S,
    ) -> Result<PlaybackReport> {
        self.scheduler().run(playlist.entries(), sink)
    }

    /// Play to a ready peer over RTP/UDP.
    ///
    /// A peer that is not [`PeerState::Ready`] is left untouched and gets
    /// [`ReplayError::PeerNotReady`]. Otherwise the peer is closed when
    /// playback completes and marked failed when its socket cannot be bound
    /// or a send fails; both remove it from the registry.
    pub fn play_to_peer(&self, peer_id: &str, playlist: &Playlist) -> Result<PlaybackReport> {
        self.play_to_peer_with(peer_id, playlist, |destination| {
            RtpSink::bind(destination, self.config.packetizer())
        })
    }

    fn play_to_peer_with(
        &self,
        peer_id: &str,
        playlist: &Playlist,
        bind: impl FnOnce(SocketAddr) -> Result<RtpSink>,
    ) -> Result<PlaybackReport> {
        let peer = self
            .peers
            .get(peer_id)
            .ok_or_else(|| ReplayError::SessionNotFound(peer_id.to_string()))?;
        if !peer.is_ready() {
            let state = peer.state();
            tracing::warn!(peer_id, ?state, "peer not ready, not playing");
            return Err(ReplayError::PeerNotReady {
                id: peer_id.to_string(),
                state: format!("{:?}", state),
            });
        }

        let mut sink = match bind(peer.destination) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!(peer_id, error = %e, "cannot bind RTP socket for peer");
                self.peers.set_state(peer_id, PeerState::Failed)?;
                return Err(e);
            }
        };
        let result = self.play(playlist, &mut sink);
        let state = match &result {
            Ok(_) | Err(ReplayError::Stopped) => PeerState::Closed,
            Err(_) => PeerState::Failed,
        };
        self.peers.set_state(peer_id, state)?;
        tracing::info!(peer_id, packets = sink.packets_sent(), ?state, "peer playback finished");
        result
    }
}
