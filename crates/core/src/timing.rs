//! Inter-frame delays from RTP timestamps.
//!
//! H.264 video uses a 90 kHz media clock (RFC 6184 §8.1), so a timestamp
//! delta of 90 ticks is one millisecond:
//!
//! ```text
//! delay_ms = (ts - previous_boundary_ts) / 90
//! ```
//!
//! The first boundary seeds the baseline with its own timestamp, giving a
//! delay of 0. Deltas are computed on the raw 32-bit values widened to
//! `i64`: a timestamp that wraps or goes backwards yields a negative delay,
//! which is kept as is. The scheduler treats it like zero.

use crate::media::depacketize::Depacketized;
use crate::media::h264::{START_CODE, is_boundary_type};

/// Media clock rate for H.264 video.
pub const CLOCK_RATE: u32 = 90_000;

const TICKS_PER_MILLI: i64 = (CLOCK_RATE / 1000) as i64;

/// Timestamp and pacing delay of one boundary NAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingEntry {
    pub timestamp: u32,
    pub delay_millis: i64,
}

#[derive(Debug, Default)]
pub struct TimingReconstructor {
    previous: Option<u32>,
    entries: Vec<TimingEntry>,
}

impl TimingReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one boundary timestamp.
    pub fn observe(&mut self, timestamp: u32) -> TimingEntry {
        let previous = *self.previous.get_or_insert(timestamp);
        let delay_millis = (i64::from(timestamp) - i64::from(previous)) / TICKS_PER_MILLI;
        if delay_millis < 0 {
            tracing::debug!(timestamp, previous, delay_millis, "timestamp went backwards");
        }
        self.previous = Some(timestamp);

        let entry = TimingEntry {
            timestamp,
            delay_millis,
        };
        self.entries.push(entry);
        entry
    }

    /// Record an entry for every boundary NAL that starts in this packet.
    ///
    /// Returns how many were recorded. Continuation fragments never count:
    /// their NAL was already counted at its start fragment.
    pub fn observe_packet(&mut self, packet: &Depacketized) -> usize {
        let starts = boundary_starts(&packet.fragments);
        for _ in 0..starts {
            self.observe(packet.timestamp());
        }
        starts
    }

    pub fn into_entries(self) -> Vec<TimingEntry> {
        self.entries
    }
}

/// Count fragments that open a slice or IDR slice NAL: a start code
/// followed by a boundary-type header byte.
pub fn boundary_starts(fragments: &[Vec<u8>]) -> usize {
    fragments
        .iter()
        .filter(|f| f.len() > START_CODE.len() && f.starts_with(&START_CODE))
        .filter(|f| is_boundary_type(f[START_CODE.len()] & 0x1f))
        .count()
}

/// Delays for a sequence of boundary timestamps.
pub fn delays(timestamps: &[u32]) -> Vec<i64> {
    let mut timing = TimingReconstructor::new();
    timestamps
        .iter()
        .map(|&ts| timing.observe(ts).delay_millis)
        .collect()
}
