//! Error types for the RTP replay library.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while preparing or replaying a capture.
///
/// Variants map to specific failure modes across the pipeline:
///
/// - **Capture**: [`CaptureOpen`](Self::CaptureOpen) — the capture file could
///   not be opened. Fatal, aborts before anything is parsed.
/// - **Depacketizing**: [`MalformedPacket`](Self::MalformedPacket),
///   [`UnknownNalType`](Self::UnknownNalType) — recoverable, the offending
///   packet is skipped and preparation continues.
/// - **Playback**: [`SendFailure`](Self::SendFailure),
///   [`Sink`](Self::Sink), [`Stopped`](Self::Stopped) — terminal for the
///   scheduler.
/// - **Sessions**: [`SessionNotFound`](Self::SessionNotFound),
///   [`PeerNotReady`](Self::PeerNotReady).
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture file could not be opened.
    #[error("cannot open capture {}: {source}", path.display())]
    CaptureOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An RTP packet failed an explicit length or capacity check.
    #[error("malformed RTP packet: {kind}")]
    MalformedPacket { kind: MalformedKind },

    /// The payload's NAL type is not one the depacketizer understands.
    #[error("unsupported NAL unit type {0}")]
    UnknownNalType(u8),

    /// The media sink refused or failed a sample; playback was aborted.
    #[error("send of sample {index} failed: {reason}")]
    SendFailure { index: usize, reason: String },

    /// A fault raised inside a [`MediaSink`](crate::media::MediaSink).
    #[error("media sink error: {0}")]
    Sink(String),

    /// No peer with the given ID exists in the [`PeerRegistry`](crate::session::PeerRegistry).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The peer's track has not opened, so nothing may be sent to it yet.
    #[error("peer {id} is not ready ({state})")]
    PeerNotReady { id: String, state: String },

    /// Playback was stopped by the caller before all samples were sent.
    #[error("playback stopped")]
    Stopped,
}

/// Specific kind of malformed-packet failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedKind {
    /// Shorter than the 12-byte fixed RTP header.
    TooShort { len: usize },
    /// The CSRC list runs past the end of the packet.
    CsrcOverrun { csrc_count: u8, len: usize },
    /// Header present but no payload byte to classify.
    EmptyPayload,
    /// FU-A payload without room for the FU indicator and FU header.
    TruncatedFragmentHeader { len: usize },
    /// Larger than the configured maximum packet size.
    Oversized { len: usize, max: usize },
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "{len} bytes is shorter than the RTP header"),
            Self::CsrcOverrun { csrc_count, len } => {
                write!(f, "{csrc_count} CSRC entries overrun a {len}-byte packet")
            }
            Self::EmptyPayload => write!(f, "empty payload"),
            Self::TruncatedFragmentHeader { len } => {
                write!(f, "FU-A payload of {len} bytes has no FU header")
            }
            Self::Oversized { len, max } => write!(f, "{len} bytes exceeds maximum of {max}"),
        }
    }
}

impl ReplayError {
    pub(crate) fn malformed(kind: MalformedKind) -> Self {
        Self::MalformedPacket { kind }
    }

    /// Whether preparation can skip past this error and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedPacket { .. } | Self::UnknownNalType(_))
    }
}

/// Convenience alias for `Result<T, ReplayError>`.
pub type Result<T> = std::result::Result<T, ReplayError>;
