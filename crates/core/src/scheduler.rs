//! Paced emission of prepared samples.
//!
//! ## Per-sample state machine
//!
//! ```text
//! Armed ──► Sending ──┬──► Paced ──► (next sample: Armed)
//!                     └──► Aborted            (terminal)
//! ```
//!
//! After the last sample the scheduler is `Completed`. A refused or failed
//! send aborts the whole run: no retry, no skipping ahead. Pacing is a
//! blocking sleep on the calling thread; an optional stop flag is checked
//! before each send and each sleep, never during one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{ReplayError, Result};
use crate::media::MediaSink;
use crate::playlist::ScheduleEntry;

/// Where the scheduler is in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Armed,
    Sending,
    Paced,
    Aborted,
    Completed,
}

/// Outcome of a run that reached the end of the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub sent: usize,
    pub bytes: usize,
    /// Total pause requested between samples.
    pub paced_millis: i64,
}

type Sleeper = Box<dyn FnMut(Duration) + Send>;

pub struct Scheduler {
    state: PlaybackState,
    pacing: bool,
    stop: Option<Arc<AtomicBool>>,
    sleeper: Sleeper,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Armed,
            pacing: true,
            stop: None,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Send back to back, ignoring delays.
    pub fn without_pacing(mut self) -> Self {
        self.pacing = false;
        self
    }

    /// Checked before every send and every sleep; `true` stops playback.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Replace the blocking sleep, e.g. with a recording fake in tests.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + Send + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    fn transition(&mut self, next: PlaybackState, index: usize) {
        tracing::trace!(index, from = ?self.state, to = ?next, "playback state");
        self.state = next;
    }

    /// Abort with [`ReplayError::Stopped`] if the stop flag is raised.
    fn check_stop(&mut self, index: usize, report: &PlaybackReport) -> Result<()> {
        let stopped = self
            .stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::SeqCst));
        if !stopped {
            return Ok(());
        }
        self.transition(PlaybackState::Aborted, index);
        tracing::info!(index, sent = report.sent, "playback stopped");
        Err(ReplayError::Stopped)
    }

    /// Send every entry in order, pacing by its delay.
    ///
    /// Returns [`ReplayError::SendFailure`] with the index of the sample that
    /// failed (equal to the number sent successfully), or
    /// [`ReplayError::Stopped`] if the stop flag was raised.
    pub fn run<S: MediaSink + ?Sized>(
        &mut self,
        entries: &[ScheduleEntry],
        sink: &mut S,
    ) -> Result<PlaybackReport> {
        let mut report = PlaybackReport {
            sent: 0,
            bytes: 0,
            paced_millis: 0,
        };
        tracing::info!(samples = entries.len(), pacing = self.pacing, "playback starting");

        for (index, entry) in entries.iter().enumerate() {
            self.transition(PlaybackState::Armed, index);
            self.check_stop(index, &report)?;

            self.transition(PlaybackState::Sending, index);
            sink.set_outgoing_timestamp(entry.timestamp);
            let reason = match sink.try_send(entry.sample.as_bytes()) {
                Ok(true) => None,
                Ok(false) => Some("sink refused sample".to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = reason {
                self.transition(PlaybackState::Aborted, index);
                tracing::warn!(index, sent = report.sent, %reason, "send failed, aborting playback");
                return Err(ReplayError::SendFailure { index, reason });
            }
            report.sent += 1;
            report.bytes += entry.sample.len();

            self.transition(PlaybackState::Paced, index);
            tracing::debug!(
                index,
                ts = entry.timestamp,
                bytes = entry.sample.len(),
                delay_ms = entry.delay_millis,
                "sample sent"
            );
            if self.pacing && entry.delay_millis > 0 {
                self.check_stop(index, &report)?;
                report.paced_millis += entry.delay_millis;
                (self.sleeper)(Duration::from_millis(entry.delay_millis as u64));
            }
        }

        self.state = PlaybackState::Completed;
        tracing::info!(sent = report.sent, bytes = report.bytes, "playback complete");
        Ok(report)
    }
}
