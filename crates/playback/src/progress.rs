//! Playback progress publishing.
//!
//! The scheduler publishes one percentage per queued block. The consumer (UI
//! or telemetry) may lag; publishing never blocks the producer and values
//! that do not fit are dropped.
//!
//! # Overflow handling
//!
//! [`ProgressSink`] is implemented for an embassy [`Sender`] using
//! `try_send`. When the channel reaches capacity the newest value is dropped
//! and a warning is logged. A later value always supersedes an earlier one,
//! so nothing needs to be replayed.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;

/// Destination of progress percentages.
pub trait ProgressSink {
    /// Publish `percent` without blocking.
    fn publish(&mut self, percent: u32);
}

/// Sink that discards every value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn publish(&mut self, _percent: u32) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for &mut T {
    fn publish(&mut self, percent: u32) {
        (**self).publish(percent);
    }
}

impl<M: RawMutex, const N: usize> ProgressSink for Sender<'_, M, u32, N> {
    fn publish(&mut self, percent: u32) {
        if self.try_send(percent).is_err() {
            warn!("progress channel full, dropped {}%", percent);
        }
    }
}

/// `floor(cycle * 100 / total_blocks)`, or 0 for an empty stream.
#[must_use]
pub fn progress_percent(cycle: u32, total_blocks: u32) -> u32 {
    u64::from(cycle)
        .saturating_mul(100)
        .checked_div(u64::from(total_blocks))
        .map_or(0, |pct| u32::try_from(pct).unwrap_or(u32::MAX))
}
