//! Exclusive ownership of the audio interface.
//!
//! Playback and duplex share SSIF0; only one may run. A scheduler holds a
//! [`SessionGuard`] for its whole lifetime and the interface is released when
//! the guard drops.

use core::sync::atomic::{AtomicBool, Ordering};

/// In-use latch for one audio interface. Place in a `static`.
#[derive(Debug, Default)]
pub struct AudioSession {
    in_use: AtomicBool,
}

impl AudioSession {
    /// Unclaimed interface.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
        }
    }

    /// Claim the interface, or `None` when another stream holds it.
    pub fn try_claim(&'static self) -> Option<SessionGuard> {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard { session: self })
    }

    /// `true` while a guard is alive.
    pub fn is_claimed(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Proof of exclusive access; releases the interface on drop.
#[derive(Debug)]
pub struct SessionGuard {
    session: &'static AudioSession,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.in_use.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_fails_until_release() {
        static SESSION: AudioSession = AudioSession::new();
        let guard = SESSION.try_claim().unwrap();
        assert!(SESSION.is_claimed());
        assert!(SESSION.try_claim().is_none());
        drop(guard);
        assert!(!SESSION.is_claimed());
        assert!(SESSION.try_claim().is_some());
    }
}
