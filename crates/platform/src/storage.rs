//! Seekable byte source abstraction
//!
//! The streaming core never opens files itself. It is handed something that
//! can read a run of bytes, jump to an absolute offset and report where it
//! is. On hardware that is a FAT file handle on the SD card; on the host it
//! is [`crate::file_source::LocalFileSource`] or
//! [`crate::mocks::MockByteSource`].
//!
//! Offsets are `u32` because RIFF containers cannot address more than 4 GiB.

/// Seekable, block-read byte stream.
///
/// # Partial reads
///
/// `read` may return fewer bytes than `buf.len()`. At end-of-file it returns
/// whatever remains (possibly `0`). Callers treat a short read as a valid
/// result, never as an error.
///
/// # Example
///
/// ```no_run
/// use platform::ByteSource;
///
/// async fn riff_magic<S: ByteSource>(src: &mut S) -> Result<bool, S::Error> {
///     let mut magic = [0u8; 4];
///     src.seek(0).await?;
///     let n = src.read(&mut magic).await?;
///     Ok(n == 4 && &magic == b"RIFF")
/// }
/// ```
pub trait ByteSource {
    /// Error type for I/O failures.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Returns the number of bytes copied into `buf`.
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>>;

    /// Move to an absolute byte offset from the start of the stream.
    ///
    /// Returns the new position.
    fn seek(&mut self, offset: u32)
        -> impl core::future::Future<Output = Result<u32, Self::Error>>;

    /// Current absolute position.
    fn tell(&self) -> u32;
}

/// Read until `buf` is full or the source reports end-of-file.
///
/// Some sources (SD card sectors, network buffers) hand back data in pieces
/// even when more is available. This keeps calling `read` until either the
/// buffer is full or a read returns `0`.
///
/// # Errors
///
/// Propagates the first error from the underlying source.
pub async fn read_full<S: ByteSource>(src: &mut S, buf: &mut [u8]) -> Result<usize, S::Error> {
    let mut filled = 0usize;
    while let Some(rest) = buf.get_mut(filled..) {
        if rest.is_empty() {
            break;
        }
        let n = src.read(rest).await?;
        if n == 0 {
            break;
        }
        filled = filled.saturating_add(n);
    }
    Ok(filled)
}
