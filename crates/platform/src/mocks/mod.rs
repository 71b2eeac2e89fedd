//! Mock implementations for testing
//!
//! [`MockByteSource`] serves a byte slice through [`ByteSource`] and counts
//! every call. [`MockDmaController`] runs the real [`ChannelTable`] state
//! machine, records every submitted transfer and fires completions only when
//! a test asks for them, which makes interleavings with the producer
//! deterministic.

#![cfg(any(test, feature = "std"))]

use core::cell::RefCell;
use std::collections::VecDeque;
use std::vec::Vec;

use critical_section::Mutex;

use crate::dma::{
    ChannelHint, ChannelId, ChannelResourceManager, ChannelSetup, ChannelState, ChannelTable,
    CompletionEvent, CompletionHandler, CompletionToken, DmaError, TransferDirection,
    CHANNEL_COUNT,
};
use crate::storage::ByteSource;

// ── Byte source ──────────────────────────────────────────────────────────────

/// Error injected by [`MockByteSource::fail_reads_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockSourceError;

/// In-memory [`ByteSource`] over a borrowed slice.
pub struct MockByteSource<'a> {
    data: &'a [u8],
    pos: u32,
    max_chunk: Option<usize>,
    fail_after: Option<usize>,
    read_calls: usize,
    seek_calls: usize,
}

impl<'a> MockByteSource<'a> {
    /// Serve `data` from offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            max_chunk: None,
            fail_after: None,
            read_calls: 0,
            seek_calls: 0,
        }
    }

    /// Cap every read at `chunk` bytes, like a sector-at-a-time card.
    #[must_use]
    pub fn with_max_chunk(mut self, chunk: usize) -> Self {
        self.max_chunk = Some(chunk.max(1));
        self
    }

    /// Let `reads` reads succeed, then fail every following one.
    #[must_use]
    pub fn fail_reads_after(mut self, reads: usize) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Number of `read` calls so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls
    }

    /// Number of `seek` calls so far.
    pub fn seek_calls(&self) -> usize {
        self.seek_calls
    }
}

impl ByteSource for MockByteSource<'_> {
    type Error = MockSourceError;

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_calls = self.read_calls.saturating_add(1);
        if self.fail_after.is_some_and(|limit| self.read_calls > limit) {
            return Err(MockSourceError);
        }
        let start = (self.pos as usize).min(self.data.len());
        let remaining = self.data.get(start..).unwrap_or_default();
        let mut n = remaining.len().min(buf.len());
        if let Some(chunk) = self.max_chunk {
            n = n.min(chunk);
        }
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), remaining.get(..n)) {
            dst.copy_from_slice(src);
        }
        self.pos = self.pos.saturating_add(u32::try_from(n).unwrap_or(u32::MAX));
        Ok(n)
    }

    async fn seek(&mut self, offset: u32) -> Result<u32, Self::Error> {
        self.seek_calls = self.seek_calls.saturating_add(1);
        self.pos = offset;
        Ok(offset)
    }

    fn tell(&self) -> u32 {
        self.pos
    }
}

// ── DMA controller ───────────────────────────────────────────────────────────

/// One transfer handed to [`MockDmaController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransfer {
    /// Channel the transfer was submitted on.
    pub channel: ChannelId,
    /// Token submitted with the buffer.
    pub token: CompletionToken,
    /// `true` for `queue_next`, `false` for `start`.
    pub chained: bool,
    /// Buffer contents: bytes sent for outbound transfers, bytes written by
    /// the simulated capture for inbound ones.
    pub bytes: Vec<u8>,
}

#[derive(Clone, Copy)]
struct ChannelBinding {
    direction: TransferDirection,
    handler: &'static dyn CompletionHandler,
}

struct MockDmaState {
    table: ChannelTable<CHANNEL_COUNT>,
    bindings: [Option<ChannelBinding>; CHANNEL_COUNT],
    pending: [VecDeque<(CompletionToken, u32)>; CHANNEL_COUNT],
    max_outstanding: [u8; CHANNEL_COUNT],
    submitted: Vec<SubmittedTransfer>,
    capture_byte: u8,
}

/// Simulated DMA controller.
///
/// Methods take `&self`; [`ChannelResourceManager`] is implemented for
/// `&MockDmaController` so a scheduler can own a reference while the test
/// drives completions through another one.
pub struct MockDmaController {
    state: Mutex<RefCell<MockDmaState>>,
}

impl Default for MockDmaController {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDmaController {
    /// Controller with the driver already initialised.
    pub fn new() -> Self {
        let controller = Self::uninitialised();
        critical_section::with(|cs| {
            let mut s = controller.state.borrow_ref_mut(cs);
            // Fresh table: init cannot fail.
            let _ = s.table.init();
        });
        controller
    }

    /// Controller whose driver has not been initialised.
    pub fn uninitialised() -> Self {
        Self {
            state: Mutex::new(RefCell::new(MockDmaState {
                table: ChannelTable::new(),
                bindings: [None; CHANNEL_COUNT],
                pending: core::array::from_fn(|_| VecDeque::new()),
                max_outstanding: [0; CHANNEL_COUNT],
                submitted: Vec::new(),
                capture_byte: 0,
            })),
        }
    }

    /// Driver teardown.
    ///
    /// # Errors
    ///
    /// Fails while any channel is `Open` or in `Transfer`.
    pub fn deinit(&self) -> Result<(), DmaError> {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).table.deinit())
    }

    /// Finish the running transfer on `channel` and notify its handler.
    ///
    /// Returns the token of the finished transfer, or `None` when the
    /// channel had nothing running.
    pub fn complete_next(&self, channel: ChannelId) -> Option<CompletionToken> {
        let fired = critical_section::with(|cs| {
            let mut s = self.state.borrow_ref_mut(cs);
            let idx = usize::from(channel.raw());
            let (token, _) = s.pending.get_mut(idx)?.pop_front()?;
            s.table.complete_one(channel).ok()?;
            let binding = s.bindings.get(idx).copied().flatten()?;
            Some((binding.handler, token))
        });
        // Handler runs outside the mock's own critical section, as an ISR
        // would run outside the driver's register access.
        let (handler, token) = fired?;
        handler.on_transfer_complete(CompletionEvent::BufferReady(token));
        Some(token)
    }

    /// Finish every outstanding transfer on `channel`, oldest first.
    pub fn complete_all(&self, channel: ChannelId) -> usize {
        let mut n = 0usize;
        while self.complete_next(channel).is_some() {
            n = n.saturating_add(1);
        }
        n
    }

    /// Simulate a bus fault: the chain is dropped, the channel returns to
    /// `Open` and the handler receives `ChannelError`.
    pub fn fail(&self, channel: ChannelId, error: DmaError) {
        let handler = critical_section::with(|cs| {
            let mut s = self.state.borrow_ref_mut(cs);
            let idx = usize::from(channel.raw());
            if let Some(q) = s.pending.get_mut(idx) {
                q.clear();
            }
            let _ = s.table.cancel(channel);
            s.bindings.get(idx).copied().flatten().map(|b| b.handler)
        });
        if let Some(handler) = handler {
            handler.on_transfer_complete(CompletionEvent::ChannelError { channel, error });
        }
    }

    /// Deliver an arbitrary event to `channel`'s handler, bypassing the
    /// state machine. Used to inject orphaned or duplicated completions.
    pub fn inject(&self, channel: ChannelId, event: CompletionEvent) {
        let handler = critical_section::with(|cs| {
            let s = self.state.borrow_ref(cs);
            s.bindings
                .get(usize::from(channel.raw()))
                .copied()
                .flatten()
                .map(|b| b.handler)
        });
        if let Some(handler) = handler {
            handler.on_transfer_complete(event);
        }
    }

    /// Every transfer submitted so far, in submission order.
    pub fn submitted(&self) -> Vec<SubmittedTransfer> {
        critical_section::with(|cs| self.state.borrow_ref(cs).submitted.clone())
    }

    /// Number of transfers submitted so far.
    pub fn submitted_count(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).submitted.len())
    }

    /// Number of transfers submitted on `channel`.
    pub fn submitted_on(&self, channel: ChannelId) -> usize {
        critical_section::with(|cs| {
            self.state
                .borrow_ref(cs)
                .submitted
                .iter()
                .filter(|t| t.channel == channel)
                .count()
        })
    }

    /// Transfers currently outstanding on `channel`.
    pub fn outstanding(&self, channel: ChannelId) -> u8 {
        critical_section::with(|cs| self.state.borrow_ref(cs).table.outstanding(channel))
    }

    /// Channel state as the driver sees it.
    pub fn channel_state(&self, channel: ChannelId) -> ChannelState {
        critical_section::with(|cs| self.state.borrow_ref(cs).table.state(channel))
    }

    /// Highest number of transfers ever outstanding at once on `channel`.
    pub fn max_outstanding(&self, channel: ChannelId) -> u8 {
        critical_section::with(|cs| {
            self.state
                .borrow_ref(cs)
                .max_outstanding
                .get(usize::from(channel.raw()))
                .copied()
                .unwrap_or(0)
        })
    }

    /// Channels currently allocated (`Open` or `Transfer`).
    pub fn allocated_channels(&self) -> Vec<ChannelId> {
        critical_section::with(|cs| {
            let s = self.state.borrow_ref(cs);
            (0..CHANNEL_COUNT)
                .filter_map(|i| u8::try_from(i).ok())
                .map(ChannelId::new)
                .filter(|ch| {
                    matches!(
                        s.table.state(*ch),
                        ChannelState::Open | ChannelState::Transfer
                    )
                })
                .collect()
        })
    }

    fn submit(
        &self,
        channel: ChannelId,
        buffer: &mut [u8],
        token: CompletionToken,
        chained: bool,
    ) -> Result<(), DmaError> {
        critical_section::with(|cs| {
            let mut s = self.state.borrow_ref_mut(cs);
            if chained {
                s.table.queue_next(channel, buffer)?;
            } else {
                s.table.start(channel, buffer)?;
            }
            let idx = usize::from(channel.raw());
            let direction = s
                .bindings
                .get(idx)
                .copied()
                .flatten()
                .map(|b| b.direction)
                .ok_or(DmaError::NotConfigured)?;
            if direction == TransferDirection::PeripheralToMemory {
                for byte in buffer.iter_mut() {
                    *byte = s.capture_byte;
                    s.capture_byte = s.capture_byte.wrapping_add(1);
                }
            }
            let len = u32::try_from(buffer.len()).map_err(|_| DmaError::InvalidParameter)?;
            if let Some(q) = s.pending.get_mut(idx) {
                q.push_back((token, len));
            }
            let outstanding = s.table.outstanding(channel);
            if let Some(max) = s.max_outstanding.get_mut(idx) {
                *max = (*max).max(outstanding);
            }
            s.submitted.push(SubmittedTransfer {
                channel,
                token,
                chained,
                bytes: buffer.to_vec(),
            });
            Ok(())
        })
    }
}

impl ChannelResourceManager for &MockDmaController {
    fn allocate(&mut self, hint: ChannelHint) -> Result<ChannelId, DmaError> {
        critical_section::with(|cs| {
            let mut s = self.state.borrow_ref_mut(cs);
            let channel = s.table.allocate(hint)?;
            if let Some(b) = s.bindings.get_mut(usize::from(channel.raw())) {
                *b = None;
            }
            Ok(channel)
        })
    }

    fn free(&mut self, channel: ChannelId) -> Result<(), DmaError> {
        critical_section::with(|cs| {
            let mut s = self.state.borrow_ref_mut(cs);
            s.table.free(channel)?;
            if let Some(b) = s.bindings.get_mut(usize::from(channel.raw())) {
                *b = None;
            }
            Ok(())
        })
    }

    fn configure(&mut self, channel: ChannelId, setup: &ChannelSetup) -> Result<(), DmaError> {
        critical_section::with(|cs| {
            let mut s = self.state.borrow_ref_mut(cs);
            s.table.configure(channel, setup)?;
            if let Some(b) = s.bindings.get_mut(usize::from(channel.raw())) {
                *b = Some(ChannelBinding {
                    direction: setup.direction,
                    handler: setup.handler,
                });
            }
            Ok(())
        })
    }

    fn start(
        &mut self,
        channel: ChannelId,
        buffer: &mut [u8],
        token: CompletionToken,
    ) -> Result<(), DmaError> {
        self.submit(channel, buffer, token, false)
    }

    fn queue_next(
        &mut self,
        channel: ChannelId,
        buffer: &mut [u8],
        token: CompletionToken,
    ) -> Result<(), DmaError> {
        self.submit(channel, buffer, token, true)
    }

    fn cancel(&mut self, channel: ChannelId) -> Result<u32, DmaError> {
        critical_section::with(|cs| {
            let mut s = self.state.borrow_ref_mut(cs);
            s.table.cancel(channel)?;
            let idx = usize::from(channel.raw());
            // Nothing moves in the simulation: the whole running block remains.
            let remaining = s
                .pending
                .get(idx)
                .and_then(|q| q.front())
                .map_or(0, |(_, len)| *len);
            if let Some(q) = s.pending.get_mut(idx) {
                q.clear();
            }
            Ok(remaining)
        })
    }

    fn state(&self, channel: ChannelId) -> ChannelState {
        critical_section::with(|cs| self.state.borrow_ref(cs).table.state(channel))
    }
}
