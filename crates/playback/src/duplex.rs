//! Duplex loopback: capture from SSIF0 RX and replay on SSIF0 TX.
//!
//! Two channels share one ring of `N` blocks. The inbound path keeps the
//! capture channel fed; once a full ring of captures has completed, the
//! outbound path queues every block to line-out and from then on re-queues
//! each one as it completes. The two paths advance independent cursors that
//! wrap modulo `N`.
//!
//! [`DuplexScheduler::poll`] never suspends. It reads the completion counters
//! in [`DuplexFlags`] once, acts on them and returns, so it can share a task
//! with other cooperative work.
//!
//! Both channels read and write the same memory with no lag guarantee between
//! them, so the line-out may replay a block the capture is overwriting.

use platform::audio_config::SsifStreamConfig;
use platform::{
    ChannelId, ChannelResourceManager, ChannelState, CompletionToken, DmaError, StreamDirection,
};

use crate::buffer_pool::TransferBufferPool;
use crate::completion::DuplexFlags;
use crate::control::StreamControl;
use crate::error::StreamError;
use crate::session::{AudioSession, SessionGuard};

/// What one [`DuplexScheduler::poll`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DuplexActivity {
    /// A capture block was handed back to the inbound channel.
    pub inbound_requeued: bool,
    /// The outbound path started in this pass.
    pub outbound_started: bool,
    /// A line-out block was handed back to the outbound channel.
    pub outbound_requeued: bool,
}

impl DuplexActivity {
    /// `true` when the pass did anything.
    pub fn any(&self) -> bool {
        self.inbound_requeued || self.outbound_started || self.outbound_requeued
    }
}

/// One direction of the loopback.
struct Lane {
    channel: ChannelId,
    direction: StreamDirection,
    block: usize,
    cycle: u32,
}

impl Lane {
    const fn new(channel: ChannelId, direction: StreamDirection) -> Self {
        Self {
            channel,
            direction,
            block: 0,
            cycle: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation)] // Safety: block < N <= u8::MAX
    fn token(&self) -> CompletionToken {
        CompletionToken {
            direction: self.direction,
            buffer: self.block as u8,
            cycle: self.cycle,
        }
    }

    /// Move to the next block, wrapping at `n`.
    fn advance(&mut self, n: usize) {
        self.block = self.block.saturating_add(1).checked_rem(n).unwrap_or(0);
        self.cycle = self.cycle.wrapping_add(1);
    }
}

/// Record-and-replay scheduler over two DMA channels.
pub struct DuplexScheduler<'a, D, const N: usize, const B: usize>
where
    D: ChannelResourceManager,
{
    dma: D,
    pool: &'a mut TransferBufferPool<N, B>,
    flags: &'static DuplexFlags,
    inbound: Lane,
    outbound: Lane,
    outbound_started: bool,
    _session: SessionGuard,
}

impl<'a, D, const N: usize, const B: usize> DuplexScheduler<'a, D, N, B>
where
    D: ChannelResourceManager,
{
    /// Claim the audio interface, set up both channels and prime the capture
    /// side with all `N` blocks.
    ///
    /// # Errors
    ///
    /// `Busy` when another stream owns the interface; `Channel` when a
    /// channel cannot be allocated, configured or started. Channels acquired
    /// before the failure are released.
    pub fn open(
        mut dma: D,
        pool: &'a mut TransferBufferPool<N, B>,
        flags: &'static DuplexFlags,
        session: &'static AudioSession,
    ) -> Result<Self, StreamError<core::convert::Infallible>> {
        let guard = session.try_claim().ok_or(StreamError::Busy)?;
        let capture = SsifStreamConfig::duplex_capture_ssif0();
        let lineout = SsifStreamConfig::duplex_lineout_ssif0();
        if capture.block_bytes != B {
            return Err(StreamError::Channel(DmaError::InvalidParameter));
        }

        flags.reset();
        pool.reset();

        let rx = open_channel(&mut dma, &capture, flags)?;
        let tx = match open_channel(&mut dma, &lineout, flags) {
            Ok(tx) => tx,
            Err(e) => {
                let _ = dma.free(rx);
                return Err(e.into());
            }
        };

        let mut this = Self {
            dma,
            pool,
            flags,
            inbound: Lane::new(rx, StreamDirection::Inbound),
            outbound: Lane::new(tx, StreamDirection::Outbound),
            outbound_started: false,
            _session: guard,
        };
        for _ in 0..N {
            if let Err(e) = this.submit_inbound() {
                let _ = this.teardown();
                return Err(e.into());
            }
        }
        debug!(
            "duplex open: rx={} tx={} blocks={}",
            rx.raw(),
            tx.raw(),
            N
        );
        Ok(this)
    }

    /// Capture channel.
    pub fn inbound_channel(&self) -> ChannelId {
        self.inbound.channel
    }

    /// Line-out channel.
    pub fn outbound_channel(&self) -> ChannelId {
        self.outbound.channel
    }

    /// `true` once the line-out side has been started.
    pub fn outbound_started(&self) -> bool {
        self.outbound_started
    }

    /// Next capture block to re-queue.
    pub fn inbound_block(&self) -> usize {
        self.inbound.block
    }

    /// Next line-out block to re-queue.
    pub fn outbound_block(&self) -> usize {
        self.outbound.block
    }

    /// Act on the completions reported since the last pass. Never blocks.
    ///
    /// # Errors
    ///
    /// `Channel` when either channel reported a fault or refused a transfer.
    pub fn poll(&mut self) -> Result<DuplexActivity, StreamError<core::convert::Infallible>> {
        if let Some((channel, error)) = self.flags.take_fault() {
            error!("duplex channel {} fault", channel.raw());
            return Err(StreamError::Channel(error));
        }

        let mut activity = DuplexActivity::default();

        if self.flags.take_inbound() {
            self.submit_inbound()?;
            activity.inbound_requeued = true;
        }

        if !self.outbound_started && self.flags.first_outbound_eligible() {
            for _ in 0..N {
                self.submit_outbound()?;
            }
            self.outbound_started = true;
            activity.outbound_started = true;
            debug!("duplex line-out started");
        } else if self.outbound_started && self.flags.take_outbound() {
            self.submit_outbound()?;
            activity.outbound_requeued = true;
        }

        Ok(activity)
    }

    /// Poll until `control` asks to stop, yielding between passes.
    ///
    /// # Errors
    ///
    /// The first error returned by [`poll`](Self::poll).
    pub async fn run(
        &mut self,
        control: &StreamControl,
    ) -> Result<(), StreamError<core::convert::Infallible>> {
        while !control.stop_requested() {
            self.poll()?;
            embassy_futures::yield_now().await;
        }
        control.clear_stop();
        Ok(())
    }

    /// Cancel both channels and free them.
    ///
    /// # Errors
    ///
    /// `Channel` when a channel cannot be cancelled or freed.
    pub fn close(mut self) -> Result<(), StreamError<core::convert::Infallible>> {
        self.teardown()?;
        self.pool.reset();
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), DmaError> {
        for channel in [self.inbound.channel, self.outbound.channel] {
            if self.dma.state(channel) == ChannelState::Transfer {
                self.dma.cancel(channel)?;
            }
        }
        self.dma.free(self.inbound.channel)?;
        self.dma.free(self.outbound.channel)
    }

    fn submit_inbound(&mut self) -> Result<(), DmaError> {
        submit(&mut self.dma, &mut *self.pool, &self.inbound)?;
        self.inbound.advance(N);
        Ok(())
    }

    fn submit_outbound(&mut self) -> Result<(), DmaError> {
        submit(&mut self.dma, &mut *self.pool, &self.outbound)?;
        self.outbound.advance(N);
        Ok(())
    }
}

fn open_channel<D: ChannelResourceManager>(
    dma: &mut D,
    config: &SsifStreamConfig,
    flags: &'static DuplexFlags,
) -> Result<ChannelId, DmaError> {
    let channel = dma.allocate(config.channel_hint)?;
    if let Err(e) = dma.configure(channel, &config.channel_setup(flags)) {
        let _ = dma.free(channel);
        return Err(e);
    }
    Ok(channel)
}

/// Hand `lane`'s current block to its channel, starting the channel when it
/// is idle and chaining otherwise.
fn submit<D: ChannelResourceManager, const N: usize, const B: usize>(
    dma: &mut D,
    pool: &mut TransferBufferPool<N, B>,
    lane: &Lane,
) -> Result<(), DmaError> {
    let token = lane.token();
    let block = pool
        .shared_block(lane.block)
        .ok_or(DmaError::InvalidParameter)?;
    if dma.state(lane.channel) == ChannelState::Transfer {
        dma.queue_next(lane.channel, block, token)
    } else {
        dma.start(lane.channel, block, token)
    }
}
