//! Playback scheduler.
//!
//! `PlaybackScheduler` streams the PCM payload of one WAV file to the line-out
//! DMA channel through a ring of `N` transfer buffers. It is the only writer
//! of the buffers and the only reader of the byte source; the transfer engine
//! reports back through a [`CompletionQueue`].
//!
//! # State machine
//!
//! ```text
//!   Idle ──play──▶ Priming ──▶ Streaming ──stop──▶ Stopping ─┐
//!    ▲                            │                          │
//!    │                        end of data                    │
//!    │                            ▼                          │
//!    └──────────────────────── Draining ◀────────────────────┘
//! ```
//!
//! Each streaming iteration fills block `cycle mod N`, hands it to the
//! channel, publishes progress and then waits while `N - 1` blocks are still
//! in flight. The producer therefore runs at most `N - 1` blocks ahead of the
//! hardware and never touches a block the hardware owns.
//!
//! A pass always ends with every queued block completed, so `Idle` means no
//! transfer is outstanding. After a natural end the source is rewound and the
//! header re-probed; the next play trigger replays the track.

use platform::audio_config::SsifStreamConfig;
use platform::{
    ByteSource, ChannelId, ChannelResourceManager, ChannelState, CompletionEvent, DmaError,
};

use crate::buffer_pool::{BufferState, TransferBufferPool};
use crate::completion::CompletionQueue;
use crate::context::StreamContext;
use crate::control::StreamControl;
use crate::error::StreamError;
use crate::pcm::read_block;
use crate::progress::{progress_percent, ProgressSink};
use crate::session::AudioSession;
use crate::wav::{self, TrackTags};

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerState {
    /// No transfer queued; waiting for a play trigger.
    Idle,
    /// Play received; computing the pass geometry.
    Priming,
    /// Queuing blocks.
    Streaming,
    /// Stop observed; waiting for queued blocks, then rewinding.
    Stopping,
    /// End of data; waiting for queued blocks, then rewinding.
    Draining,
}

/// How a pass over the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PassOutcome {
    /// The whole payload was queued; the source was rewound for the next pass.
    Completed {
        /// Blocks queued in this pass.
        blocks: u32,
    },
    /// A stop request ended the pass early; the source was rewound too.
    Stopped {
        /// Blocks queued before the stop took effect.
        blocks: u32,
    },
    /// The source no longer parses as a playable stream after rewinding.
    NoStream,
}

/// Collaborators handed to [`PlaybackScheduler::open`].
pub struct PlaybackResources<'a, S, D, P, const N: usize, const SIZE: usize> {
    /// Track file.
    pub source: S,
    /// DMA channel resource manager.
    pub dma: D,
    /// Transfer buffer ring, usually a `static`.
    pub pool: &'a mut TransferBufferPool<N, SIZE>,
    /// Play/stop events.
    pub control: &'a StreamControl,
    /// Completion queue registered as the channel's handler.
    pub completions: &'static CompletionQueue,
    /// Progress destination.
    pub progress: P,
    /// Audio interface latch.
    pub session: &'static AudioSession,
    /// Channel parameters.
    pub config: SsifStreamConfig,
}

/// Single-direction producer loop feeding the line-out channel.
pub struct PlaybackScheduler<'a, S, D, P, const N: usize, const SIZE: usize>
where
    S: ByteSource,
    D: ChannelResourceManager,
    P: ProgressSink,
{
    ctx: StreamContext<'a, S, N, SIZE>,
    dma: D,
    control: &'a StreamControl,
    completions: &'static CompletionQueue,
    progress: P,
    state: SchedulerState,
}

impl<'a, S, D, P, const N: usize, const SIZE: usize> PlaybackScheduler<'a, S, D, P, N, SIZE>
where
    S: ByteSource,
    D: ChannelResourceManager,
    P: ProgressSink,
{
    const RING_OK: () = assert!(N >= 2, "playback needs at least two buffers");

    /// Most blocks allowed in flight at once.
    #[allow(clippy::arithmetic_side_effects)] // Safety: N >= 2 enforced by RING_OK
    pub const MAX_IN_FLIGHT: usize = N - 1;

    /// Load a track and claim a line-out channel.
    ///
    /// Parses the container from offset 0 (copying tags into `tags`),
    /// allocates a channel and registers `completions` as its handler.
    /// Returns `Ok(None)` when the file is not a playable WAV stream; no
    /// channel is touched in that case.
    ///
    /// # Errors
    ///
    /// `Busy` when another stream owns the audio interface, `Source` on read
    /// failures, `Channel` when allocation or configuration is refused.
    pub async fn open<const T: usize>(
        res: PlaybackResources<'a, S, D, P, N, SIZE>,
        tags: &mut TrackTags<T>,
    ) -> Result<Option<Self>, StreamError<S::Error>> {
        let () = Self::RING_OK;
        let PlaybackResources {
            mut source,
            mut dma,
            pool,
            control,
            completions,
            progress,
            session,
            config,
        } = res;

        let guard = session.try_claim().ok_or(StreamError::Busy)?;
        if config.block_bytes != SIZE {
            return Err(StreamError::Channel(DmaError::InvalidParameter));
        }

        source.seek(0).await.map_err(StreamError::Source)?;
        let Some(stream) = wav::parse_with_tags(&mut source, tags)
            .await
            .map_err(StreamError::Source)?
        else {
            warn!("not a playable WAV stream");
            return Ok(None);
        };

        let channel = dma.allocate(config.channel_hint)?;
        if let Err(e) = dma.configure(channel, &config.channel_setup(completions)) {
            let _ = dma.free(channel);
            return Err(e.into());
        }

        pool.reset();
        completions.clear();
        debug!(
            "playback open: ch={} rate={} bits={} data={}",
            channel.raw(),
            stream.format.sample_rate_hz,
            stream.format.block_size_bits,
            stream.cursor.data_len()
        );

        Ok(Some(Self {
            ctx: StreamContext::new(source, stream, pool, channel, guard),
            dma,
            control,
            completions,
            progress,
            state: SchedulerState::Idle,
        }))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Session state.
    pub fn context(&self) -> &StreamContext<'a, S, N, SIZE> {
        &self.ctx
    }

    /// Channel carrying the stream.
    pub fn channel(&self) -> ChannelId {
        self.ctx.channel
    }

    /// Play the track again and again until an error, or until the rewound
    /// file no longer parses.
    ///
    /// # Errors
    ///
    /// The first error returned by [`run_pass`](Self::run_pass).
    pub async fn run(&mut self) -> Result<(), StreamError<S::Error>> {
        loop {
            if self.run_pass().await? == PassOutcome::NoStream {
                return Ok(());
            }
        }
    }

    /// Wait for a play trigger and stream one pass over the payload.
    ///
    /// # Errors
    ///
    /// `Channel` when the channel refuses a transfer or reports a fault,
    /// `Source` on read failures. The channel is left for
    /// [`close`](Self::close) to tear down.
    pub async fn run_pass(&mut self) -> Result<PassOutcome, StreamError<S::Error>> {
        self.state = SchedulerState::Idle;
        self.control.wait_play().await;

        self.state = SchedulerState::Priming;
        self.control.clear_stop();
        let format = self.ctx.stream.format;
        let source_block = format.source_bytes_per_block(SIZE);
        let data_len = self.ctx.stream.cursor.data_len();
        let total_blocks = data_len.checked_div(source_block).unwrap_or(0);
        debug!("pass start: {} blocks", total_blocks);

        self.state = SchedulerState::Streaming;
        let mut blocks = 0u32;
        let mut stopped = false;
        while self
            .ctx
            .stream
            .cursor
            .consumed()
            .saturating_add(source_block)
            < data_len
        {
            if self.control.stop_requested() {
                self.control.clear();
                stopped = true;
                break;
            }

            let cycle = self.ctx.next_cycle;
            let index = TransferBufferPool::<N, SIZE>::index_for(cycle);
            while self.ctx.pool.state(index) == Some(BufferState::InFlight) {
                self.await_completion().await?;
            }

            self.queue_block(cycle).await?;
            self.ctx.next_cycle = cycle.wrapping_add(1);
            self.progress.publish(progress_percent(blocks, total_blocks));
            blocks = blocks.saturating_add(1);

            while self.ctx.pool.in_flight() >= Self::MAX_IN_FLIGHT {
                self.await_completion().await?;
            }
        }

        self.state = if stopped {
            SchedulerState::Stopping
        } else {
            SchedulerState::Draining
        };
        while self.ctx.pool.in_flight() > 0 {
            self.await_completion().await?;
        }

        // Stopped or finished, the next pass starts from the top.
        let outcome = if !self.rewind().await? {
            PassOutcome::NoStream
        } else if stopped {
            PassOutcome::Stopped { blocks }
        } else {
            PassOutcome::Completed { blocks }
        };
        self.control.clear_play();
        self.state = SchedulerState::Idle;
        debug!("pass end: {} blocks queued", blocks);
        Ok(outcome)
    }

    /// Cancel anything still running, free the channel and end the session.
    ///
    /// Returns the byte source.
    ///
    /// # Errors
    ///
    /// `Channel` when the channel cannot be cancelled or freed.
    pub fn close(mut self) -> Result<S, StreamError<S::Error>> {
        let channel = self.ctx.channel;
        if self.dma.state(channel) == ChannelState::Transfer {
            let remaining = self.dma.cancel(channel)?;
            debug!("playback cancelled with {} bytes pending", remaining);
        }
        self.dma.free(channel)?;
        self.ctx.pool.reset();
        self.completions.clear();
        self.state = SchedulerState::Idle;
        Ok(self.ctx.into_source())
    }

    /// Fill block `cycle mod N` and hand it to the channel.
    async fn queue_block(&mut self, cycle: u32) -> Result<(), StreamError<S::Error>> {
        let index = TransferBufferPool::<N, SIZE>::index_for(cycle);
        let ctx = &mut self.ctx;

        let block = ctx.pool.acquire(cycle)?;
        if let Err(e) = read_block(
            &mut ctx.source,
            &mut ctx.stream.cursor,
            &ctx.stream.format,
            block,
        )
        .await
        {
            let _ = ctx.pool.release(index);
            return Err(StreamError::Source(e));
        }

        let (token, bytes) = ctx.pool.mark_in_flight(index)?;
        let submitted = if self.dma.state(ctx.channel) == ChannelState::Transfer {
            self.dma.queue_next(ctx.channel, bytes, token)
        } else {
            self.dma.start(ctx.channel, bytes, token)
        };
        if let Err(e) = submitted {
            error!("transfer refused on cycle {}", cycle);
            let _ = ctx.pool.revoke(index);
            return Err(e.into());
        }
        Ok(())
    }

    /// Block until the next completion event and apply it.
    async fn await_completion(&mut self) -> Result<(), StreamError<S::Error>> {
        match self.completions.next().await {
            CompletionEvent::BufferReady(token) => {
                if !self.ctx.pool.mark_complete(token) {
                    warn!(
                        "orphan completion ignored: buffer={} cycle={}",
                        token.buffer,
                        token.cycle
                    );
                }
                Ok(())
            }
            CompletionEvent::ChannelError { channel, error } => {
                error!("channel {} fault", channel.raw());
                Err(StreamError::Channel(error))
            }
        }
    }

    /// Seek to file start, re-probe the header and publish 0.
    async fn rewind(&mut self) -> Result<bool, StreamError<S::Error>> {
        self.ctx.source.seek(0).await.map_err(StreamError::Source)?;
        match wav::probe(&mut self.ctx.source)
            .await
            .map_err(StreamError::Source)?
        {
            Some(stream) => {
                self.ctx.stream = stream;
                self.progress.publish(0);
                Ok(true)
            }
            None => {
                warn!("rewound source is no longer a WAV stream");
                Ok(false)
            }
        }
    }
}
