//! Fixed ring of DMA transfer buffers.
//!
//! `TransferBufferPool<N, SIZE>` owns `N` blocks of `SIZE` bytes, each on a
//! 32-byte boundary. Blocks are addressed by a monotonically increasing cycle
//! counter modulo `N` and move through an ownership state machine:
//!
//! ```text
//!   Free ──acquire──▶ Filling ──mark_in_flight──▶ InFlight
//!    ▲  ▲                │                          │
//!    │  └────release─────┘                  mark_complete
//!    │                                              ▼
//!    └──────────────acquire (re-claim)─────────  Complete
//! ```
//!
//! `revoke` takes an `InFlight` block straight back to `Free` when the channel
//! refused the transfer, so ownership never reached the hardware.
//!
//! The producer owns `Filling` blocks, the transfer engine owns `InFlight`
//! blocks. `acquire` refuses an `InFlight` block, so the bytes the hardware is
//! reading can never be handed out for writing.
//!
//! Completion tokens are checked against the block's direction and the cycle
//! that queued it. Tokens that do not match an `InFlight` block (cancelled
//! transfers, duplicates) are ignored.

use platform::dma_safety::Align32;
use platform::{CompletionToken, StreamDirection};

/// Ownership state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferState {
    /// Nobody holds the block.
    Free,
    /// The producer is writing into the block.
    Filling,
    /// The transfer engine owns the block.
    InFlight,
    /// The transfer finished; the producer may re-claim the block.
    Complete,
}

/// Buffer ownership violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PoolError {
    /// The block is still owned by the transfer engine.
    InFlight(u8),
    /// The block is already being filled.
    AlreadyFilling(u8),
    /// The block was not being filled.
    NotFilling(u8),
    /// The block was not in flight.
    NotInFlight(u8),
    /// Index outside the pool.
    OutOfRange,
}

impl core::fmt::Display for PoolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InFlight(i) => write!(f, "buffer {i} is in flight"),
            Self::AlreadyFilling(i) => write!(f, "buffer {i} is already being filled"),
            Self::NotFilling(i) => write!(f, "buffer {i} is not being filled"),
            Self::NotInFlight(i) => write!(f, "buffer {i} is not in flight"),
            Self::OutOfRange => write!(f, "buffer index out of range"),
        }
    }
}

/// Ring of `N` aligned transfer blocks of `SIZE` bytes.
pub struct TransferBufferPool<const N: usize, const SIZE: usize> {
    direction: StreamDirection,
    blocks: [Align32<[u8; SIZE]>; N],
    states: [BufferState; N],
    cycles: [u32; N],
}

impl<const N: usize, const SIZE: usize> TransferBufferPool<N, SIZE> {
    const VALID: () = assert!(N > 0 && N <= u8::MAX as usize && SIZE > 0);

    /// Number of blocks.
    pub const CAPACITY: usize = N;

    /// Bytes per block.
    pub const BLOCK_BYTES: usize = SIZE;

    /// Empty pool; every block `Free` and zeroed.
    #[must_use]
    pub const fn new(direction: StreamDirection) -> Self {
        let () = Self::VALID;
        Self {
            direction,
            blocks: [Align32([0; SIZE]); N],
            states: [BufferState::Free; N],
            cycles: [0; N],
        }
    }

    /// Direction carried by every token this pool issues.
    #[must_use]
    pub const fn direction(&self) -> StreamDirection {
        self.direction
    }

    /// Block index used by `cycle`.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: N > 0 enforced by VALID
    pub const fn index_for(cycle: u32) -> usize {
        cycle as usize % N
    }

    /// State of block `index`.
    #[must_use]
    pub fn state(&self, index: usize) -> Option<BufferState> {
        self.states.get(index).copied()
    }

    /// Number of blocks currently owned by the transfer engine.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.states
            .iter()
            .filter(|s| **s == BufferState::InFlight)
            .count()
    }

    /// Claim the block for `cycle` for writing.
    ///
    /// # Errors
    ///
    /// `InFlight` while the transfer engine still owns the block,
    /// `AlreadyFilling` when it was acquired and not yet submitted.
    pub fn acquire(&mut self, cycle: u32) -> Result<&mut [u8], PoolError> {
        let index = Self::index_for(cycle);
        let tag = index_tag(index);
        let state = self.states.get_mut(index).ok_or(PoolError::OutOfRange)?;
        match *state {
            BufferState::InFlight => return Err(PoolError::InFlight(tag)),
            BufferState::Filling => return Err(PoolError::AlreadyFilling(tag)),
            BufferState::Free | BufferState::Complete => *state = BufferState::Filling,
        }
        if let Some(c) = self.cycles.get_mut(index) {
            *c = cycle;
        }
        self.blocks
            .get_mut(index)
            .map(|b| b.0.as_mut_slice())
            .ok_or(PoolError::OutOfRange)
    }

    /// Hand block `index` to the transfer engine.
    ///
    /// Returns the token to submit with the transfer and the block bytes.
    ///
    /// # Errors
    ///
    /// `NotFilling` unless the block was acquired first.
    pub fn mark_in_flight(
        &mut self,
        index: usize,
    ) -> Result<(CompletionToken, &mut [u8]), PoolError> {
        let tag = index_tag(index);
        let state = self.states.get_mut(index).ok_or(PoolError::OutOfRange)?;
        if *state != BufferState::Filling {
            return Err(PoolError::NotFilling(tag));
        }
        *state = BufferState::InFlight;
        let token = CompletionToken {
            direction: self.direction,
            buffer: tag,
            cycle: self.cycles.get(index).copied().unwrap_or(0),
        };
        let bytes = self
            .blocks
            .get_mut(index)
            .map(|b| b.0.as_mut_slice())
            .ok_or(PoolError::OutOfRange)?;
        Ok((token, bytes))
    }

    /// Apply a completion. Returns `false` for tokens that do not match an
    /// `InFlight` block of this pool; those are left untouched.
    pub fn mark_complete(&mut self, token: CompletionToken) -> bool {
        if token.direction != self.direction {
            return false;
        }
        let index = usize::from(token.buffer);
        let owner = self.cycles.get(index).copied();
        match self.states.get_mut(index) {
            Some(state) if *state == BufferState::InFlight && owner == Some(token.cycle) => {
                *state = BufferState::Complete;
                true
            }
            _ => false,
        }
    }

    /// Abandon a fill: `Filling → Free`.
    ///
    /// # Errors
    ///
    /// `NotFilling` unless the block is being filled.
    pub fn release(&mut self, index: usize) -> Result<(), PoolError> {
        let tag = index_tag(index);
        let state = self.states.get_mut(index).ok_or(PoolError::OutOfRange)?;
        if *state != BufferState::Filling {
            return Err(PoolError::NotFilling(tag));
        }
        *state = BufferState::Free;
        Ok(())
    }

    /// Take back a block the transfer engine refused: `InFlight → Free`.
    ///
    /// # Errors
    ///
    /// `NotInFlight` unless the block is in flight.
    pub fn revoke(&mut self, index: usize) -> Result<(), PoolError> {
        let tag = index_tag(index);
        let state = self.states.get_mut(index).ok_or(PoolError::OutOfRange)?;
        if *state != BufferState::InFlight {
            return Err(PoolError::NotInFlight(tag));
        }
        *state = BufferState::Free;
        Ok(())
    }

    /// Return every block to `Free`. Only valid once the transfer engine has
    /// let go of all blocks (channel cancelled or drained); late tokens for
    /// the dropped transfers are then ignored by `mark_complete`.
    pub fn reset(&mut self) {
        self.states = [BufferState::Free; N];
    }

    /// Raw access to block `index`, bypassing ownership states.
    ///
    /// The duplex loopback shares every block between the capture and the
    /// line-out channel, so neither side can hold exclusive ownership.
    pub fn shared_block(&mut self, index: usize) -> Option<&mut [u8]> {
        self.blocks.get_mut(index).map(|b| b.0.as_mut_slice())
    }
}

#[allow(clippy::cast_possible_truncation)] // Safety: N <= u8::MAX enforced by VALID
fn index_tag(index: usize) -> u8 {
    index as u8
}
