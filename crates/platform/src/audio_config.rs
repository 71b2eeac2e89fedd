//! Serial sound interface (SSIF) stream configuration.
//!
//! Each audio stream direction is carried by one DMA channel paced by an SSIF
//! FIFO request line. The presets here bundle the request line, direction,
//! beat width and address progression so the schedulers only pick a preset
//! and attach their completion handler.
//!
//! | Stream            | Request  | Direction      | Block     |
//! |-------------------|----------|----------------|-----------|
//! | File playback     | SSIF0 TX | memory → FIFO  | 4096 B    |
//! | Duplex capture    | SSIF0 RX | FIFO → memory  | 512 B     |
//! | Duplex line-out   | SSIF0 TX | memory → FIFO  | 512 B     |
//!
//! The FIFO is 32 bits wide, so every preset moves one word per beat and the
//! peripheral side keeps a fixed address.

use crate::dma::{
    AddressMode, ChannelHint, ChannelSetup, CompletionHandler, DmaResource, TransferDirection,
    UnitWidth,
};
use crate::dma_safety::{DUPLEX_BLOCK_BYTES, PLAYBACK_BLOCK_BYTES};

/// DMA parameters for one SSIF stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SsifStreamConfig {
    /// Channel to request at open.
    pub channel_hint: ChannelHint,
    /// FIFO request line.
    pub resource: DmaResource,
    /// Transfer direction (must match `resource`).
    pub direction: TransferDirection,
    /// Bytes per bus beat.
    pub unit_width: UnitWidth,
    /// Bytes per transfer block.
    pub block_bytes: usize,
}

impl SsifStreamConfig {
    /// File playback on SSIF0 transmit.
    #[must_use]
    pub const fn playback_ssif0() -> Self {
        Self {
            channel_hint: ChannelHint::Any,
            resource: DmaResource::SsifTx0,
            direction: TransferDirection::MemoryToPeripheral,
            unit_width: UnitWidth::Word,
            block_bytes: PLAYBACK_BLOCK_BYTES,
        }
    }

    /// Microphone capture on SSIF0 receive (duplex inbound path).
    #[must_use]
    pub const fn duplex_capture_ssif0() -> Self {
        Self {
            channel_hint: ChannelHint::Any,
            resource: DmaResource::SsifRx0,
            direction: TransferDirection::PeripheralToMemory,
            unit_width: UnitWidth::Word,
            block_bytes: DUPLEX_BLOCK_BYTES,
        }
    }

    /// Loopback line-out on SSIF0 transmit (duplex outbound path).
    #[must_use]
    pub const fn duplex_lineout_ssif0() -> Self {
        Self {
            block_bytes: DUPLEX_BLOCK_BYTES,
            ..Self::playback_ssif0()
        }
    }

    /// Memory side increments, FIFO side stays fixed.
    #[must_use]
    pub const fn address_modes(&self) -> (AddressMode, AddressMode) {
        match self.direction {
            TransferDirection::MemoryToPeripheral => (AddressMode::Increment, AddressMode::Fixed),
            TransferDirection::PeripheralToMemory => (AddressMode::Fixed, AddressMode::Increment),
            TransferDirection::MemoryToMemory => (AddressMode::Increment, AddressMode::Increment),
        }
    }

    /// Build the channel setup, routing completions to `handler`.
    #[must_use]
    pub fn channel_setup(&self, handler: &'static dyn CompletionHandler) -> ChannelSetup {
        let (source, destination) = self.address_modes();
        ChannelSetup {
            direction: self.direction,
            unit_width: self.unit_width,
            source,
            destination,
            resource: self.resource,
            handler,
        }
    }
}
