//! Audio streaming core for the sound-bar: WAV parsing and DMA scheduling.
//!
//! # Data path
//!
//! ```text
//! ByteSource ──wav──▶ StreamCursor ──pcm──▶ TransferBufferPool ──▶ DMA channel
//!                                                 ▲                    │
//!                                                 └── CompletionQueue ◀┘
//! ```
//!
//! - [`wav`] locates the `fmt ` and `data` chunks and collects INFO tags.
//! - [`pcm`] copies payload blocks, widening packed 24-bit frames to 32 bits.
//! - [`buffer_pool`] tracks who owns each transfer block.
//! - [`engine`] runs the playback loop; [`duplex`] runs record-and-replay.
//!
//! Everything is `no_std` and allocation-free. Host builds enable `std` for
//! the file source and mocks in `platform`.
//!
//! # Features
//!
//! - `std`: `std::error::Error` impls
//! - `defmt`: firmware logging and `defmt::Format` derives
//! - `tracing`: host logging
//!
//! # Example
//!
//! ```no_run
//! use playback::{progress_percent, TransferBufferPool};
//! use platform::dma_safety::{PLAYBACK_BLOCK_BYTES, TRANSFER_BUFFER_COUNT};
//! use platform::StreamDirection;
//!
//! let mut pool: TransferBufferPool<TRANSFER_BUFFER_COUNT, PLAYBACK_BLOCK_BYTES> =
//!     TransferBufferPool::new(StreamDirection::Outbound);
//! let block = pool.acquire(0).unwrap();
//! assert_eq!(block.len(), PLAYBACK_BLOCK_BYTES);
//! assert_eq!(progress_percent(64, 128), 50);
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(async_fn_in_trait)]

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod log;

pub mod buffer_pool;
pub mod completion;
pub mod context;
pub mod control;
pub mod duplex;
pub mod engine;
pub mod error;
pub mod pcm;
pub mod progress;
pub mod session;
pub mod wav;

pub use buffer_pool::{BufferState, PoolError, TransferBufferPool};
pub use completion::{CompletionQueue, DuplexFlags, COMPLETION_QUEUE_DEPTH};
pub use context::StreamContext;
pub use control::StreamControl;
pub use duplex::{DuplexActivity, DuplexScheduler};
pub use engine::{PassOutcome, PlaybackResources, PlaybackScheduler, SchedulerState};
pub use error::StreamError;
pub use pcm::StreamCursor;
pub use progress::{progress_percent, NoProgress, ProgressSink};
pub use session::{AudioSession, SessionGuard};
pub use wav::{TrackTags, WavFormat, WavStream};
