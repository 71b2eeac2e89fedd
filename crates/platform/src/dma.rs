//! DMA channel resource contract
//!
//! The streaming core talks to the transfer engine exclusively through
//! [`ChannelResourceManager`]. A channel walks a strict state machine:
//!
//! ```text
//!  Uninit ──init──▶ Init ──allocate──▶ Open ──start──▶ Transfer
//!                    ▲                  │ ▲               │
//!                    └──────free────────┘ └─cancel/done───┘
//! ```
//!
//! `configure` is only accepted in `Open`, `start` only in `Open`, `cancel`
//! only in `Transfer`. `queue_next` chains another block onto a running
//! transfer so the hardware never idles between buffers.
//!
//! Completion is reported asynchronously through the [`CompletionHandler`]
//! registered in [`ChannelSetup`]. Every submitted buffer carries a
//! [`CompletionToken`] that is handed back verbatim, so the receiver can tell
//! which buffer finished without the driver knowing anything about pools.
//!
//! [`ChannelTable`] holds the per-channel bookkeeping and enforces the state
//! rules; hardware drivers and [`crate::mocks::MockDmaController`] both
//! delegate to it.

/// Total number of channels on the controller.
pub const CHANNEL_COUNT: usize = 16;

/// Channels below this index are reserved for the boot loader and the
/// serial flash controller and are never handed out by `ChannelHint::Any`.
pub const FIRST_ASSIGNABLE_CHANNEL: u8 = 4;

/// Transfers a channel can hold at once: the running one plus queued ones.
pub const MAX_CHAINED_TRANSFERS: u8 = 4;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Hardware channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(u8);

impl ChannelId {
    /// Wrap a raw channel number. Range is checked by the driver.
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw channel number.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Channel selection for [`ChannelResourceManager::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelHint {
    /// Lowest free assignable channel.
    Any,
    /// A specific channel number.
    Fixed(u8),
}

/// Per-channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// Driver not initialised.
    Uninit,
    /// Initialised and free.
    Init,
    /// Allocated; may be configured or started.
    Open,
    /// A transfer is running.
    Transfer,
}

impl ChannelState {
    /// Short name for log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninit => "uninit",
            Self::Init => "init",
            Self::Open => "open",
            Self::Transfer => "transfer",
        }
    }
}

// ── Transfer parameters ──────────────────────────────────────────────────────

/// Which side of the transfer is memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDirection {
    /// Memory buffer to peripheral FIFO (line-out).
    MemoryToPeripheral,
    /// Peripheral FIFO to memory buffer (microphone).
    PeripheralToMemory,
    /// Memory to memory copy.
    MemoryToMemory,
}

/// Bytes moved per bus beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitWidth {
    /// 1 byte.
    Byte,
    /// 2 bytes.
    HalfWord,
    /// 4 bytes.
    Word,
    /// 8 bytes.
    DoubleWord,
    /// 16 bytes.
    Burst16,
    /// 32 bytes.
    Burst32,
    /// 64 bytes.
    Burst64,
    /// 128 bytes.
    Burst128,
}

impl UnitWidth {
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::HalfWord => 2,
            Self::Word => 4,
            Self::DoubleWord => 8,
            Self::Burst16 => 16,
            Self::Burst32 => 32,
            Self::Burst64 => 64,
            Self::Burst128 => 128,
        }
    }
}

/// Address progression on one side of the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressMode {
    /// Address advances by the unit width after each beat.
    Increment,
    /// Address stays on one register (peripheral FIFO).
    Fixed,
}

/// Peripheral request line that paces the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaResource {
    /// Serial sound interface 0, transmit FIFO.
    SsifTx0,
    /// Serial sound interface 0, receive FIFO.
    SsifRx0,
    /// Serial sound interface 1, transmit FIFO.
    SsifTx1,
    /// Serial sound interface 1, receive FIFO.
    SsifRx1,
    /// Software-triggered memory copy.
    MemToMem,
}

impl DmaResource {
    /// Request selector value written to the channel's resource register.
    #[must_use]
    pub const fn request_code(self) -> u16 {
        match self {
            Self::SsifTx0 => 0x0E1,
            Self::SsifRx0 => 0x0E2,
            Self::SsifTx1 => 0x0E5,
            Self::SsifRx1 => 0x0E6,
            Self::MemToMem => 0x000,
        }
    }

    /// Direction this request line can drive.
    #[must_use]
    pub const fn direction(self) -> TransferDirection {
        match self {
            Self::SsifTx0 | Self::SsifTx1 => TransferDirection::MemoryToPeripheral,
            Self::SsifRx0 | Self::SsifRx1 => TransferDirection::PeripheralToMemory,
            Self::MemToMem => TransferDirection::MemoryToMemory,
        }
    }
}

/// Parameters applied by [`ChannelResourceManager::configure`].
#[derive(Clone, Copy)]
pub struct ChannelSetup {
    /// Transfer direction.
    pub direction: TransferDirection,
    /// Bus beat width.
    pub unit_width: UnitWidth,
    /// Source address progression.
    pub source: AddressMode,
    /// Destination address progression.
    pub destination: AddressMode,
    /// Peripheral request line.
    pub resource: DmaResource,
    /// Receives one event per finished transfer on this channel.
    pub handler: &'static dyn CompletionHandler,
}

impl ChannelSetup {
    /// Check internal consistency of the parameters.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the request line cannot drive `direction`, or
    /// when a peripheral side is set to increment.
    pub fn validate(&self) -> Result<(), DmaError> {
        if self.resource.direction() != self.direction {
            return Err(DmaError::InvalidParameter);
        }
        let peripheral_side = match self.direction {
            TransferDirection::MemoryToPeripheral => Some(self.destination),
            TransferDirection::PeripheralToMemory => Some(self.source),
            TransferDirection::MemoryToMemory => None,
        };
        if peripheral_side == Some(AddressMode::Increment) {
            return Err(DmaError::InvalidParameter);
        }
        Ok(())
    }
}

// ── Completion events ────────────────────────────────────────────────────────

/// Stream a transfer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamDirection {
    /// Buffer → line-out.
    Outbound,
    /// Microphone → buffer.
    Inbound,
}

/// Opaque correlation value submitted with a buffer and returned on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionToken {
    /// Stream the buffer belongs to.
    pub direction: StreamDirection,
    /// Buffer index inside the owner's pool.
    pub buffer: u8,
    /// Producer cycle that queued the buffer.
    pub cycle: u32,
}

/// Event delivered to a [`CompletionHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompletionEvent {
    /// The transfer carrying this token finished.
    BufferReady(CompletionToken),
    /// The channel stopped with a bus or configuration fault.
    ChannelError {
        /// Faulting channel.
        channel: ChannelId,
        /// Fault reported by the driver.
        error: DmaError,
    },
}

/// Receiver of transfer completion events.
///
/// Called from interrupt context: implementations must not block and must
/// not allocate. Pushing into a bounded queue or bumping an atomic is the
/// expected shape.
pub trait CompletionHandler: Sync {
    /// A transfer on a channel configured with this handler finished.
    fn on_transfer_complete(&self, event: CompletionEvent);
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Channel resource manager errors.
///
/// The hardware reports most of these through a single status bit; they are
/// split here for diagnostics only. Callers are not expected to recover from
/// any of them individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// Driver has not been initialised, or was torn down.
    NotInitialised,
    /// Channel number out of range or reserved.
    InvalidChannel,
    /// Requested fixed channel is already allocated.
    ChannelBusy,
    /// No free channel left for `ChannelHint::Any`.
    NoFreeChannel,
    /// Operation not valid in the channel's current state.
    WrongState(ChannelState),
    /// Transfer parameters rejected.
    InvalidParameter,
    /// `start` before `configure`.
    NotConfigured,
    /// The transfer chain is full.
    NextAlreadyQueued,
    /// Bus error raised by the controller during a transfer.
    Bus,
}

#[cfg(feature = "std")]
impl std::error::Error for DmaError {}

impl core::fmt::Display for DmaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotInitialised => write!(f, "DMA driver not initialised"),
            Self::InvalidChannel => write!(f, "invalid DMA channel"),
            Self::ChannelBusy => write!(f, "DMA channel already allocated"),
            Self::NoFreeChannel => write!(f, "no free DMA channel"),
            Self::WrongState(state) => {
                write!(f, "DMA channel in wrong state ({})", state.as_str())
            }
            Self::InvalidParameter => write!(f, "invalid DMA transfer parameter"),
            Self::NotConfigured => write!(f, "DMA channel not configured"),
            Self::NextAlreadyQueued => write!(f, "DMA transfer chain full"),
            Self::Bus => write!(f, "DMA bus error"),
        }
    }
}

// ── Contract ─────────────────────────────────────────────────────────────────

/// Allocates, configures and drives DMA channels.
///
/// Buffers are passed as `&mut [u8]` for both directions. The borrow ends
/// when the call returns; the caller keeps the buffer untouched until the
/// matching [`CompletionEvent::BufferReady`] arrives. The transfer length is
/// the slice length.
pub trait ChannelResourceManager {
    /// Claim a channel. The channel moves `Init → Open`.
    ///
    /// # Errors
    ///
    /// `NoFreeChannel`, `ChannelBusy`, `InvalidChannel` or `NotInitialised`.
    fn allocate(&mut self, hint: ChannelHint) -> Result<ChannelId, DmaError>;

    /// Release a channel. Valid only in `Open`.
    ///
    /// # Errors
    ///
    /// `WrongState` when the channel is not `Open`.
    fn free(&mut self, channel: ChannelId) -> Result<(), DmaError>;

    /// Apply transfer parameters and register the completion handler.
    /// Valid only in `Open`.
    ///
    /// # Errors
    ///
    /// `WrongState` or `InvalidParameter`.
    fn configure(&mut self, channel: ChannelId, setup: &ChannelSetup) -> Result<(), DmaError>;

    /// Start a transfer. The channel moves `Open → Transfer`.
    ///
    /// # Errors
    ///
    /// `WrongState` unless `Open`, `NotConfigured`, or `InvalidParameter` for
    /// an empty or misaligned buffer.
    fn start(
        &mut self,
        channel: ChannelId,
        buffer: &mut [u8],
        token: CompletionToken,
    ) -> Result<(), DmaError>;

    /// Chain a transfer behind the running one without stopping the channel.
    ///
    /// # Errors
    ///
    /// `WrongState` unless `Transfer`, `NextAlreadyQueued` when the chain is
    /// full, or `InvalidParameter` for an empty or misaligned buffer.
    fn queue_next(
        &mut self,
        channel: ChannelId,
        buffer: &mut [u8],
        token: CompletionToken,
    ) -> Result<(), DmaError>;

    /// Abort the running transfer and drop any chained ones.
    ///
    /// Returns the bytes of the running transfer that were not moved. No
    /// completion is reported for cancelled transfers. The channel moves
    /// `Transfer → Open`.
    ///
    /// # Errors
    ///
    /// `WrongState` unless `Transfer`.
    fn cancel(&mut self, channel: ChannelId) -> Result<u32, DmaError>;

    /// Current state of a channel. Out-of-range channels report `Uninit`.
    fn state(&self, channel: ChannelId) -> ChannelState;
}

// ── State bookkeeping ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct ChannelSlot {
    state: ChannelState,
    configured: bool,
    outstanding: u8,
}

impl ChannelSlot {
    const UNINIT: Self = Self {
        state: ChannelState::Uninit,
        configured: false,
        outstanding: 0,
    };
}

/// State-machine bookkeeping for `CH` channels.
///
/// Tracks state, configuration and the number of outstanding transfers per
/// channel. It does not touch hardware: drivers call the matching method
/// first and only program registers when it returns `Ok`.
#[derive(Debug, Clone)]
pub struct ChannelTable<const CH: usize = CHANNEL_COUNT> {
    initialised: bool,
    slots: [ChannelSlot; CH],
}

impl<const CH: usize> Default for ChannelTable<CH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CH: usize> ChannelTable<CH> {
    /// Table with every channel `Uninit`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initialised: false,
            slots: [ChannelSlot::UNINIT; CH],
        }
    }

    /// Driver init: every channel moves `Uninit → Init`.
    ///
    /// # Errors
    ///
    /// `WrongState` when already initialised.
    pub fn init(&mut self) -> Result<(), DmaError> {
        if self.initialised {
            return Err(DmaError::WrongState(ChannelState::Init));
        }
        for slot in &mut self.slots {
            *slot = ChannelSlot {
                state: ChannelState::Init,
                ..ChannelSlot::UNINIT
            };
        }
        self.initialised = true;
        Ok(())
    }

    /// Driver teardown: every channel moves back to `Uninit`.
    ///
    /// # Errors
    ///
    /// `WrongState` carrying the offending state while any channel is still
    /// `Open` or in `Transfer`.
    pub fn deinit(&mut self) -> Result<(), DmaError> {
        if !self.initialised {
            return Err(DmaError::NotInitialised);
        }
        if let Some(busy) = self
            .slots
            .iter()
            .find(|s| matches!(s.state, ChannelState::Open | ChannelState::Transfer))
        {
            return Err(DmaError::WrongState(busy.state));
        }
        self.slots = [ChannelSlot::UNINIT; CH];
        self.initialised = false;
        Ok(())
    }

    /// Current state of `channel`.
    #[must_use]
    pub fn state(&self, channel: ChannelId) -> ChannelState {
        self.slots
            .get(usize::from(channel.raw()))
            .map_or(ChannelState::Uninit, |s| s.state)
    }

    /// Outstanding transfers on `channel` (running + chained).
    #[must_use]
    pub fn outstanding(&self, channel: ChannelId) -> u8 {
        self.slots
            .get(usize::from(channel.raw()))
            .map_or(0, |s| s.outstanding)
    }

    fn slot_mut(&mut self, channel: ChannelId) -> Result<&mut ChannelSlot, DmaError> {
        if !self.initialised {
            return Err(DmaError::NotInitialised);
        }
        self.slots
            .get_mut(usize::from(channel.raw()))
            .ok_or(DmaError::InvalidChannel)
    }

    /// `Init → Open` for the channel selected by `hint`.
    ///
    /// # Errors
    ///
    /// See [`ChannelResourceManager::allocate`].
    pub fn allocate(&mut self, hint: ChannelHint) -> Result<ChannelId, DmaError> {
        if !self.initialised {
            return Err(DmaError::NotInitialised);
        }
        let raw = match hint {
            ChannelHint::Fixed(raw) => {
                let slot = self
                    .slots
                    .get(usize::from(raw))
                    .ok_or(DmaError::InvalidChannel)?;
                if slot.state != ChannelState::Init {
                    return Err(DmaError::ChannelBusy);
                }
                raw
            }
            ChannelHint::Any => self
                .slots
                .iter()
                .enumerate()
                .skip(usize::from(FIRST_ASSIGNABLE_CHANNEL))
                .find(|(_, s)| s.state == ChannelState::Init)
                .and_then(|(i, _)| u8::try_from(i).ok())
                .ok_or(DmaError::NoFreeChannel)?,
        };
        let channel = ChannelId::new(raw);
        let slot = self.slot_mut(channel)?;
        slot.state = ChannelState::Open;
        slot.configured = false;
        slot.outstanding = 0;
        Ok(channel)
    }

    /// `Open → Init`.
    ///
    /// # Errors
    ///
    /// See [`ChannelResourceManager::free`].
    pub fn free(&mut self, channel: ChannelId) -> Result<(), DmaError> {
        let slot = self.slot_mut(channel)?;
        if slot.state != ChannelState::Open {
            return Err(DmaError::WrongState(slot.state));
        }
        slot.state = ChannelState::Init;
        slot.configured = false;
        Ok(())
    }

    /// Record a configuration. Valid only in `Open`.
    ///
    /// # Errors
    ///
    /// See [`ChannelResourceManager::configure`].
    pub fn configure(&mut self, channel: ChannelId, setup: &ChannelSetup) -> Result<(), DmaError> {
        let slot = self.slot_mut(channel)?;
        if slot.state != ChannelState::Open {
            return Err(DmaError::WrongState(slot.state));
        }
        setup.validate()?;
        slot.configured = true;
        Ok(())
    }

    /// `Open → Transfer` with one outstanding transfer.
    ///
    /// # Errors
    ///
    /// See [`ChannelResourceManager::start`].
    pub fn start(&mut self, channel: ChannelId, buffer: &[u8]) -> Result<(), DmaError> {
        check_buffer(buffer)?;
        let slot = self.slot_mut(channel)?;
        if slot.state != ChannelState::Open {
            return Err(DmaError::WrongState(slot.state));
        }
        if !slot.configured {
            return Err(DmaError::NotConfigured);
        }
        slot.state = ChannelState::Transfer;
        slot.outstanding = 1;
        Ok(())
    }

    /// Chain one more transfer. Valid only in `Transfer`.
    ///
    /// # Errors
    ///
    /// See [`ChannelResourceManager::queue_next`].
    pub fn queue_next(&mut self, channel: ChannelId, buffer: &[u8]) -> Result<(), DmaError> {
        check_buffer(buffer)?;
        let slot = self.slot_mut(channel)?;
        if slot.state != ChannelState::Transfer {
            return Err(DmaError::WrongState(slot.state));
        }
        if slot.outstanding >= MAX_CHAINED_TRANSFERS {
            return Err(DmaError::NextAlreadyQueued);
        }
        slot.outstanding = slot.outstanding.saturating_add(1);
        Ok(())
    }

    /// The running transfer finished. The channel stays in `Transfer` while
    /// chained transfers remain and returns to `Open` otherwise.
    ///
    /// # Errors
    ///
    /// `WrongState` unless `Transfer`.
    pub fn complete_one(&mut self, channel: ChannelId) -> Result<(), DmaError> {
        let slot = self.slot_mut(channel)?;
        if slot.state != ChannelState::Transfer {
            return Err(DmaError::WrongState(slot.state));
        }
        slot.outstanding = slot.outstanding.saturating_sub(1);
        if slot.outstanding == 0 {
            slot.state = ChannelState::Open;
        }
        Ok(())
    }

    /// `Transfer → Open`, dropping every outstanding transfer.
    ///
    /// # Errors
    ///
    /// See [`ChannelResourceManager::cancel`].
    pub fn cancel(&mut self, channel: ChannelId) -> Result<(), DmaError> {
        let slot = self.slot_mut(channel)?;
        if slot.state != ChannelState::Transfer {
            return Err(DmaError::WrongState(slot.state));
        }
        slot.state = ChannelState::Open;
        slot.outstanding = 0;
        Ok(())
    }
}

fn check_buffer(buffer: &[u8]) -> Result<(), DmaError> {
    if buffer.is_empty()
        || buffer.len() > crate::dma_safety::MAX_TRANSFER_BYTES
        || !crate::dma_safety::is_dma_aligned(buffer.as_ptr())
    {
        return Err(DmaError::InvalidParameter);
    }
    Ok(())
}
