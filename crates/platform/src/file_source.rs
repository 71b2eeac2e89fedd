//! Local filesystem byte source for host tools and tests.
//!
//! `LocalFileSource` implements [`ByteSource`] using `std::fs`.
//! Only compiled with the `std` feature.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::storage::ByteSource;

/// Error type for local file operations.
#[derive(Debug)]
pub enum LocalSourceError {
    /// Underlying I/O failure.
    Io(std::io::Error),
    /// File is larger than a RIFF container can address.
    TooLarge(u64),
}

impl core::fmt::Display for LocalSourceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "local file error: {e}"),
            Self::TooLarge(len) => write!(f, "file too large for RIFF: {len} bytes"),
        }
    }
}

impl std::error::Error for LocalSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TooLarge(_) => None,
        }
    }
}

impl From<std::io::Error> for LocalSourceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// An open file on the local filesystem.
///
/// # Example
/// ```no_run
/// # async fn example() {
/// use platform::file_source::LocalFileSource;
/// use platform::ByteSource;
/// let mut src = LocalFileSource::open("track01.wav").unwrap();
/// let mut riff = [0u8; 4];
/// src.read(&mut riff).await.unwrap();
/// # }
/// ```
pub struct LocalFileSource {
    inner: fs::File,
    len: u32,
    pos: u32,
}

impl LocalFileSource {
    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be opened, `TooLarge` beyond 4 GiB.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LocalSourceError> {
        let inner = fs::File::open(path)?;
        let raw_len = inner.metadata()?.len();
        let len = u32::try_from(raw_len).map_err(|_| LocalSourceError::TooLarge(raw_len))?;
        Ok(Self { inner, len, pos: 0 })
    }

    /// File length in bytes.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// `true` for an empty file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl ByteSource for LocalFileSource {
    type Error = LocalSourceError;

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = Read::read(&mut self.inner, buf)?;
        // n <= buf.len() and the file is < 4 GiB, so the position fits.
        self.pos = self
            .pos
            .saturating_add(u32::try_from(n).unwrap_or(u32::MAX));
        Ok(n)
    }

    async fn seek(&mut self, offset: u32) -> Result<u32, Self::Error> {
        Seek::seek(&mut self.inner, SeekFrom::Start(u64::from(offset)))?;
        self.pos = offset;
        Ok(offset)
    }

    fn tell(&self) -> u32 {
        self.pos
    }
}
