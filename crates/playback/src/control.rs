//! Play/stop control events.
//!
//! Both are boolean events: raised by the UI or a button task, observed by a
//! scheduler. A stop request is advisory; the playback scheduler checks it
//! once per block, the duplex loop once per pass.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Play and stop triggers for one stream.
pub struct StreamControl {
    play: Signal<CriticalSectionRawMutex, ()>,
    stop: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for StreamControl {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamControl {
    /// Both events clear; usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            play: Signal::new(),
            stop: Signal::new(),
        }
    }

    /// Raise the play trigger.
    pub fn request_play(&self) {
        self.play.signal(());
    }

    /// Raise the stop trigger.
    pub fn request_stop(&self) {
        self.stop.signal(());
    }

    /// `true` while a stop is pending.
    pub fn stop_requested(&self) -> bool {
        self.stop.signaled()
    }

    /// `true` while a play trigger is pending.
    pub fn play_requested(&self) -> bool {
        self.play.signaled()
    }

    /// Wait for the play trigger and consume it.
    pub async fn wait_play(&self) {
        self.play.wait().await;
    }

    /// Drop a pending play trigger.
    pub fn clear_play(&self) {
        self.play.reset();
    }

    /// Drop a pending stop request.
    pub fn clear_stop(&self) {
        self.stop.reset();
    }

    /// Drop both pending requests.
    pub fn clear(&self) {
        self.play.reset();
        self.stop.reset();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_level_until_cleared() {
        let control = StreamControl::new();
        assert!(!control.stop_requested());
        control.request_stop();
        assert!(control.stop_requested());
        assert!(control.stop_requested());
        control.clear_stop();
        assert!(!control.stop_requested());
    }

    #[tokio::test]
    async fn test_wait_play_consumes_trigger() {
        let control = StreamControl::new();
        control.request_play();
        control.wait_play().await;
        assert!(!control.play_requested());
    }

    #[test]
    fn test_clear_drops_both() {
        let control = StreamControl::new();
        control.request_play();
        control.request_stop();
        control.clear();
        assert!(!control.play_requested());
        assert!(!control.stop_requested());
    }
}
