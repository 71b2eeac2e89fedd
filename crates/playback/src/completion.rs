//! Completion plumbing between interrupt context and the schedulers.
//!
//! Playback uses [`CompletionQueue`]: a bounded channel the scheduler awaits.
//! Duplex uses [`DuplexFlags`]: atomic counters the scheduler polls without
//! ever blocking. Both implement [`CompletionHandler`] and are registered with
//! the channel at configure time, so they must live in a `static`.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embassy_sync::channel::Channel;
use platform::dma_safety::TRANSFER_BUFFER_COUNT;
use platform::{ChannelId, CompletionEvent, CompletionHandler, DmaError, StreamDirection};

/// Queue depth for playback completions. At most `N - 1` transfers are in
/// flight, plus one channel error.
pub const COMPLETION_QUEUE_DEPTH: usize = TRANSFER_BUFFER_COUNT + 1;

/// Bounded queue of completion events for the blocking playback path.
pub struct CompletionQueue<const DEPTH: usize = COMPLETION_QUEUE_DEPTH> {
    events: Channel<CriticalSectionRawMutex, CompletionEvent, DEPTH>,
}

impl<const DEPTH: usize> Default for CompletionQueue<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DEPTH: usize> CompletionQueue<DEPTH> {
    /// Empty queue; usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
        }
    }

    /// Wait for the next event.
    pub async fn next(&self) -> CompletionEvent {
        self.events.receive().await
    }

    /// Take the next event if one is queued.
    pub fn try_next(&self) -> Option<CompletionEvent> {
        self.events.try_receive().ok()
    }

    /// Drop every queued event.
    pub fn clear(&self) {
        while self.events.try_receive().is_ok() {}
    }
}

impl<const DEPTH: usize> CompletionHandler for CompletionQueue<DEPTH> {
    fn on_transfer_complete(&self, event: CompletionEvent) {
        if self.events.try_send(event).is_err() {
            warn!("completion queue full, event dropped");
        }
    }
}

/// Non-blocking completion flags for the duplex scheduler.
///
/// Completions are counted rather than latched in a bool, so a second
/// completion arriving before the scheduler polls is not lost.
pub struct DuplexFlags {
    inbound_pending: AtomicU32,
    outbound_pending: AtomicU32,
    inbound_completed: AtomicU32,
    eligible_after: AtomicU32,
    first_outbound_eligible: AtomicBool,
    fault: CriticalSectionMutex<Cell<Option<(ChannelId, DmaError)>>>,
}

impl Default for DuplexFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplexFlags {
    /// Flags that allow outbound transfers after one full ring of captures.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Safety: ring depth is a small constant
    pub const fn new() -> Self {
        Self::with_eligible_after(TRANSFER_BUFFER_COUNT as u32)
    }

    /// Flags that allow outbound transfers after `inbound_blocks` captures.
    #[must_use]
    pub const fn with_eligible_after(inbound_blocks: u32) -> Self {
        Self {
            inbound_pending: AtomicU32::new(0),
            outbound_pending: AtomicU32::new(0),
            inbound_completed: AtomicU32::new(0),
            eligible_after: AtomicU32::new(inbound_blocks),
            first_outbound_eligible: AtomicBool::new(false),
            fault: CriticalSectionMutex::new(Cell::new(None)),
        }
    }

    /// Clear all counters and the eligibility latch for a new session.
    pub fn reset(&self) {
        self.inbound_pending.store(0, Ordering::Release);
        self.outbound_pending.store(0, Ordering::Release);
        self.inbound_completed.store(0, Ordering::Release);
        self.first_outbound_eligible.store(false, Ordering::Release);
        self.fault.lock(|f| f.set(None));
    }

    /// Consume one inbound completion, if any.
    pub fn take_inbound(&self) -> bool {
        take_one(&self.inbound_pending)
    }

    /// Consume one outbound completion, if any.
    pub fn take_outbound(&self) -> bool {
        take_one(&self.outbound_pending)
    }

    /// Latched once enough captures have completed; never reset mid-session.
    pub fn first_outbound_eligible(&self) -> bool {
        self.first_outbound_eligible.load(Ordering::Acquire)
    }

    /// Inbound completions seen this session.
    pub fn inbound_completed(&self) -> u32 {
        self.inbound_completed.load(Ordering::Acquire)
    }

    /// Take the first channel fault reported since the last call.
    pub fn take_fault(&self) -> Option<(ChannelId, DmaError)> {
        self.fault.lock(Cell::take)
    }
}

impl CompletionHandler for DuplexFlags {
    fn on_transfer_complete(&self, event: CompletionEvent) {
        match event {
            CompletionEvent::BufferReady(token) => match token.direction {
                StreamDirection::Inbound => {
                    let done = self
                        .inbound_completed
                        .fetch_add(1, Ordering::AcqRel)
                        .wrapping_add(1);
                    if done >= self.eligible_after.load(Ordering::Acquire) {
                        self.first_outbound_eligible.store(true, Ordering::Release);
                    }
                    self.inbound_pending.fetch_add(1, Ordering::AcqRel);
                }
                StreamDirection::Outbound => {
                    self.outbound_pending.fetch_add(1, Ordering::AcqRel);
                }
            },
            CompletionEvent::ChannelError { channel, error } => {
                self.fault.lock(|f| {
                    if f.get().is_none() {
                        f.set(Some((channel, error)));
                    }
                });
            }
        }
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}
