//! Hardware Abstraction Layer (HAL) for the sound-bar audio engine
//!
//! This crate provides the trait-based seams the streaming core is written
//! against, so the schedulers run unchanged on the target and on the host.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (board bring-up, task spawning)
//!         ↓
//! Streaming core (playback crate: parser, pool, schedulers)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (SSIF + DMA controller registers)
//! ```
//!
//! # Abstractions
//!
//! - [`ByteSource`] - seekable block reads from the track file
//! - [`ChannelResourceManager`] - DMA channel allocation and transfers
//! - [`CompletionHandler`] - typed completion callbacks from interrupt context
//! - [`dma_safety`] - buffer alignment and block sizing
//! - [`audio_config`] - SSIF stream presets
//!
//! # Features
//!
//! - `std`: host support ([`file_source`], [`mocks`])
//! - `defmt`: `defmt::Format` derives on all public types
//!
//! # Example
//!
//! ```no_run
//! use platform::{ChannelHint, ChannelResourceManager, DmaError};
//!
//! fn claim<D: ChannelResourceManager>(dma: &mut D) -> Result<(), DmaError> {
//!     let ch = dma.allocate(ChannelHint::Any)?;
//!     dma.free(ch)
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::match_same_arms)] // intentional for readability in request-line tables
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

#[cfg(feature = "std")]
extern crate std;

pub mod audio_config;
pub mod dma;
pub mod dma_safety;
#[cfg(any(test, feature = "std"))]
pub mod file_source;
pub mod mocks;
pub mod storage;

pub use storage::{read_full, ByteSource};

// Re-export DMA types
pub use dma::{
    AddressMode, ChannelHint, ChannelId, ChannelResourceManager, ChannelSetup, ChannelState,
    ChannelTable, CompletionEvent, CompletionHandler, CompletionToken, DmaError, DmaResource,
    StreamDirection, TransferDirection, UnitWidth,
};
pub use dma_safety::Align32;
