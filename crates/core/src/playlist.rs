//! Eager preparation of a capture into paced samples.
//!
//! ```text
//! CaptureRecord ─► Depacketizer ─► Annex B stream ─► segment ─► SampleBuilder ─┐
//!                       │                                                      ├─► ScheduleEntry
//!                       └──────────► TimingReconstructor ──────────────────────┘
//! ```
//!
//! The whole capture is processed before anything is sent. Samples and
//! timing entries are paired by position: the n-th boundary NAL in the
//! stream closes the n-th sample and produced the n-th timing entry.

use std::path::Path;

use crate::capture::{CaptureReader, CaptureRecord};
use crate::error::Result;
use crate::media::depacketize::{Depacketizer, DepacketizerStats};
use crate::media::h264;
use crate::media::sample::{Sample, build_samples};
use crate::replayer::ReplayConfig;
use crate::timing::TimingReconstructor;

/// A finished sample with its boundary timestamp and the pause to observe
/// after sending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub sample: Sample,
    pub timestamp: u32,
    pub delay_millis: i64,
}

/// What preparation saw, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareStats {
    pub records: u64,
    /// Records whose valid flag was not set. They are processed anyway.
    pub invalid_records: u64,
    pub stream_bytes: usize,
    pub nal_units: usize,
    pub samples: usize,
    pub timing_entries: usize,
    pub depacketizer: DepacketizerStats,
}

#[derive(Debug, Default)]
pub struct Playlist {
    entries: Vec<ScheduleEntry>,
    stats: PrepareStats,
}

impl Playlist {
    /// Open a capture file and prepare it. Fails only if the file cannot be
    /// opened.
    pub fn from_capture(path: impl AsRef<Path>, config: &ReplayConfig) -> Result<Self> {
        let reader = CaptureReader::open(path, config.capture_format)?;
        Ok(Self::prepare(reader, config.max_packet_size))
    }

    /// Run every record through depacketizing, segmentation, sample building
    /// and timing. Malformed packets and unknown NAL types are skipped.
    pub fn prepare(records: impl IntoIterator<Item = CaptureRecord>, max_packet_size: usize) -> Self {
        let mut depacketizer = Depacketizer::new(max_packet_size);
        let mut timing = TimingReconstructor::new();
        let mut stream = Vec::new();
        let mut stats = PrepareStats::default();

        for record in records {
            stats.records += 1;
            if !record.valid {
                stats.invalid_records += 1;
            }
            let Ok(packet) = depacketizer.push(&record.payload) else {
                continue;
            };
            timing.observe_packet(&packet);
            for fragment in &packet.fragments {
                stream.extend_from_slice(fragment);
            }
        }

        let units = h264::segment(&stream);
        let samples = build_samples(&units);
        let timings = timing.into_entries();

        stats.stream_bytes = stream.len();
        stats.nal_units = units.len();
        stats.samples = samples.len();
        stats.timing_entries = timings.len();
        stats.depacketizer = depacketizer.stats().clone();

        if samples.len() != timings.len() {
            tracing::warn!(
                samples = samples.len(),
                timing_entries = timings.len(),
                "sample and timing counts differ, extra entries dropped"
            );
        }

        let entries: Vec<ScheduleEntry> = samples
            .into_iter()
            .zip(timings)
            .map(|(sample, timing)| ScheduleEntry {
                sample,
                timestamp: timing.timestamp,
                delay_millis: timing.delay_millis,
            })
            .collect();

        tracing::info!(
            records = stats.records,
            nal_units = stats.nal_units,
            samples = entries.len(),
            skipped = stats.depacketizer.malformed + stats.depacketizer.unknown_type,
            "capture prepared"
        );

        Self { entries, stats }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ScheduleEntry> {
        self.entries
    }

    pub fn stats(&self) -> &PrepareStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of positive delays: the wall-clock length of a paced replay.
    pub fn paced_duration_millis(&self) -> i64 {
        self.entries.iter().map(|e| e.delay_millis.max(0)).sum()
    }
}
