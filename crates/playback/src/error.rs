//! Streaming errors.

use platform::DmaError;

use crate::buffer_pool::PoolError;

/// Error surfaced by the schedulers to the play/record entry point.
///
/// `E` is the [`platform::ByteSource`] error type. Channel errors are passed
/// through unchanged and never retried: any of them ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<E> {
    /// Another stream already owns the audio interface.
    Busy,
    /// The channel resource manager refused an operation, or reported a
    /// fault from interrupt context.
    Channel(DmaError),
    /// The byte source failed.
    Source(E),
    /// Buffer ownership was violated.
    Pool(PoolError),
}

impl<E> From<DmaError> for StreamError<E> {
    fn from(e: DmaError) -> Self {
        Self::Channel(e)
    }
}

impl<E> From<PoolError> for StreamError<E> {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for StreamError<E> {}

impl<E: core::fmt::Debug> core::fmt::Display for StreamError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Busy => write!(f, "audio interface in use"),
            Self::Channel(e) => write!(f, "DMA channel error: {e}"),
            #[allow(clippy::use_debug)] // source errors only guarantee Debug
            Self::Source(e) => write!(f, "byte source error: {e:?}"),
            Self::Pool(e) => write!(f, "transfer buffer error: {e}"),
        }
    }
}
