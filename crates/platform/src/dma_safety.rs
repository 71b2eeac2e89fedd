//! DMA buffer alignment and sizing constants for the sound-bar transfer engine.
//!
//! The DMA controller moves data in bursts and requires the source/destination
//! address of every transfer to sit on a 32-byte boundary (one cache line).
//! Misaligned buffers would either fault or straddle a cache line that the CPU
//! is concurrently writing, so every transfer buffer is wrapped in
//! [`Align32`] and checked with [`is_dma_aligned`] before a channel accepts it.
//!
//! ## Usage
//! ```rust
//! use platform::dma_safety::{Align32, PLAYBACK_BLOCK_BYTES, is_dma_aligned};
//!
//! let block = Align32([0u8; PLAYBACK_BLOCK_BYTES]);
//! assert!(is_dma_aligned(block.0.as_ptr()));
//! ```

// ── Alignment ────────────────────────────────────────────────────────────────

/// Required address alignment of every DMA transfer buffer, in bytes.
pub const DMA_ALIGN_BYTES: usize = 32;

/// Wrapper that forces 32-byte alignment on its contents.
///
/// `#[repr(align(32))]` pads the wrapper so the inner value starts on a
/// cache-line boundary, replacing manual mask-and-offset pointer arithmetic.
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Align32<T>(pub T);

impl<T> core::ops::Deref for Align32<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> core::ops::DerefMut for Align32<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Returns `true` if `ptr` satisfies [`DMA_ALIGN_BYTES`].
#[must_use]
pub fn is_dma_aligned(ptr: *const u8) -> bool {
    (ptr as usize) % DMA_ALIGN_BYTES == 0
}

// ── Audio DMA constants ──────────────────────────────────────────────────────

/// Number of transfer buffers per stream direction.
///
/// Three is the smallest ring where one buffer is queued with the hardware,
/// one is being filled and one has just completed.
pub const TRANSFER_BUFFER_COUNT: usize = 3;

/// Bytes per playback transfer block.
pub const PLAYBACK_BLOCK_BYTES: usize = 4096;

/// Bytes per duplex (record + line-out) transfer block.
///
/// Smaller than [`PLAYBACK_BLOCK_BYTES`] to keep the microphone-to-speaker
/// loopback latency low: 512 B of 16-bit stereo at 44.1 kHz is ~2.9 ms.
pub const DUPLEX_BLOCK_BYTES: usize = 512;

/// Largest transfer the channel accepts in one descriptor (24-bit count field).
pub const MAX_TRANSFER_BYTES: usize = 0x00FF_FFFF;

// ── Compile-time checks ──────────────────────────────────────────────────────

const _: () = assert!(
    core::mem::align_of::<Align32<[u8; PLAYBACK_BLOCK_BYTES]>>() == DMA_ALIGN_BYTES,
    "Align32 must align to DMA_ALIGN_BYTES"
);
const _: () = assert!(
    PLAYBACK_BLOCK_BYTES % DMA_ALIGN_BYTES == 0,
    "playback blocks must be a whole number of cache lines"
);
const _: () = assert!(
    DUPLEX_BLOCK_BYTES % DMA_ALIGN_BYTES == 0,
    "duplex blocks must be a whole number of cache lines"
);
const _: () = assert!(
    TRANSFER_BUFFER_COUNT >= 2,
    "at least two buffers are needed to overlap fill and transfer"
);
