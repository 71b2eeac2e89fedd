//! Per-session playback state.
//!
//! Everything one playback session mutates lives here: the byte source, the
//! parsed stream and its cursor, the buffer ring, the channel and the cycle
//! counter. The context is built when a session opens and dropped when it
//! closes; dropping it releases the audio interface.

use platform::{ByteSource, ChannelId};

use crate::buffer_pool::TransferBufferPool;
use crate::session::SessionGuard;
use crate::wav::WavStream;

/// State owned by one playback session.
pub struct StreamContext<'a, S, const N: usize, const SIZE: usize>
where
    S: ByteSource,
{
    pub(crate) source: S,
    pub(crate) stream: WavStream,
    pub(crate) pool: &'a mut TransferBufferPool<N, SIZE>,
    pub(crate) channel: ChannelId,
    pub(crate) next_cycle: u32,
    _session: SessionGuard,
}

impl<'a, S, const N: usize, const SIZE: usize> StreamContext<'a, S, N, SIZE>
where
    S: ByteSource,
{
    pub(crate) fn new(
        source: S,
        stream: WavStream,
        pool: &'a mut TransferBufferPool<N, SIZE>,
        channel: ChannelId,
        session: SessionGuard,
    ) -> Self {
        Self {
            source,
            stream,
            pool,
            channel,
            next_cycle: 0,
            _session: session,
        }
    }

    /// Parsed stream: format and payload cursor.
    pub fn stream(&self) -> &WavStream {
        &self.stream
    }

    /// Channel carrying the stream.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Cycle number the next queued block will use.
    pub fn next_cycle(&self) -> u32 {
        self.next_cycle
    }

    /// The transfer buffer ring.
    pub fn pool(&self) -> &TransferBufferPool<N, SIZE> {
        self.pool
    }

    /// Take the byte source back, ending the session.
    pub fn into_source(self) -> S {
        self.source
    }
}
