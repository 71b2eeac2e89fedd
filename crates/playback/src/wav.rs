//! RIFF/WAVE container parser.
//!
//! Locates the PCM payload and the format fields of a WAV file, tolerating a
//! `LIST`/`INFO` metadata chunk placed either before or after `data`.
//!
//! # Layout
//!
//! ```text
//! 0   "RIFF"  riff_len   "WAVE"
//! 12  "fmt "  fmt_len    tag ch rate byte_rate align bits   (36 bytes total)
//!     [fmt extension: fmt_len - 16 bytes]
//!     { tag len payload }*              -- "data", "LIST", anything else
//! ```
//!
//! Parsing never allocates. On success the byte source is left at the first
//! PCM byte; that is the only side effect besides the returned [`WavStream`].

use platform::{read_full, ByteSource};

use crate::pcm::StreamCursor;

/// Fixed header length: RIFF descriptor + the standard 16-byte fmt chunk.
pub const HEADER_LEN: usize = 36;

/// Default size of each tag buffer, terminator included.
pub const TAG_BUFFER_SIZE: usize = 64;

const CHUNK_HEADER_LEN: u32 = 8;
const STANDARD_FMT_LEN: u32 = 16;

/// Format fields from the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WavFormat {
    /// Interleaved channels.
    pub channel_count: u16,
    /// Frames per second.
    pub sample_rate_hz: u32,
    /// Bits per sample (16 or 24 on this device).
    pub block_size_bits: u16,
}

impl WavFormat {
    /// `true` when samples need the 24 → 32 bit slot expansion.
    #[must_use]
    pub const fn is_packed_24(&self) -> bool {
        self.block_size_bits == 24
    }

    /// Payload bytes consumed to fill one output block of `block_bytes`.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: block_bytes <= MAX_TRANSFER_BYTES, * 3 cannot overflow usize
    pub fn source_bytes_per_block(&self, block_bytes: usize) -> u32 {
        let bytes = if self.is_packed_24() {
            block_bytes / 4 * 3
        } else {
            block_bytes
        };
        u32::try_from(bytes).unwrap_or(u32::MAX)
    }
}

/// A playable stream: format plus the PCM payload range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WavStream {
    /// Format fields.
    pub format: WavFormat,
    /// Payload range, nothing consumed yet.
    pub cursor: StreamCursor,
}

/// Title, artist and album from a `LIST`/`INFO` chunk.
///
/// Each field holds at most `SIZE - 1` bytes, mirroring a `SIZE`-byte
/// NUL-terminated display buffer. Values stop at the first NUL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags<const SIZE: usize = TAG_BUFFER_SIZE> {
    /// `INAM`.
    pub title: heapless::Vec<u8, SIZE>,
    /// `IART`.
    pub artist: heapless::Vec<u8, SIZE>,
    /// `IPRD`.
    pub album: heapless::Vec<u8, SIZE>,
}

impl<const SIZE: usize> TrackTags<SIZE> {
    /// Empty tags.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            title: heapless::Vec::new(),
            artist: heapless::Vec::new(),
            album: heapless::Vec::new(),
        }
    }

    /// Title as UTF-8, if valid.
    #[must_use]
    pub fn title_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.title).ok()
    }

    /// Artist as UTF-8, if valid.
    #[must_use]
    pub fn artist_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.artist).ok()
    }

    /// Album as UTF-8, if valid.
    #[must_use]
    pub fn album_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.album).ok()
    }

    fn field_mut(&mut self, id: &[u8; 4]) -> Option<&mut heapless::Vec<u8, SIZE>> {
        match id {
            b"INAM" => Some(&mut self.title),
            b"IART" => Some(&mut self.artist),
            b"IPRD" => Some(&mut self.album),
            _ => None,
        }
    }
}

/// Header-probe parse: locate format and payload, skip all tags.
///
/// Returns `Ok(None)` when the source is not a playable WAV stream.
///
/// # Errors
///
/// Propagates byte source failures.
pub async fn probe<S: ByteSource>(src: &mut S) -> Result<Option<WavStream>, S::Error> {
    scan::<S, 1>(src, None).await
}

/// Full parse: like [`probe`], and also copies `INAM`/`IART`/`IPRD` into
/// `tags`.
///
/// # Errors
///
/// Propagates byte source failures.
pub async fn parse_with_tags<S: ByteSource, const SIZE: usize>(
    src: &mut S,
    tags: &mut TrackTags<SIZE>,
) -> Result<Option<WavStream>, S::Error> {
    scan(src, Some(tags)).await
}

async fn scan<S: ByteSource, const SIZE: usize>(
    src: &mut S,
    mut tags: Option<&mut TrackTags<SIZE>>,
) -> Result<Option<WavStream>, S::Error> {
    let mut header = [0u8; HEADER_LEN];
    if read_full(src, &mut header).await? < HEADER_LEN
        || header.get(0..4) != Some(b"RIFF".as_slice())
        || header.get(8..12) != Some(b"WAVE".as_slice())
        || header.get(12..16) != Some(b"fmt ".as_slice())
    {
        return Ok(None);
    }

    let format = WavFormat {
        channel_count: le_u16(&header, 22),
        sample_rate_hz: le_u32(&header, 24),
        block_size_bits: le_u16(&header, 34),
    };

    // HEADER_LEN is a small constant.
    let mut offset = HEADER_LEN as u32;
    let fmt_len = le_u32(&header, 16);
    if fmt_len > STANDARD_FMT_LEN {
        offset = offset.saturating_add(fmt_len.saturating_sub(STANDARD_FMT_LEN));
        src.seek(offset).await?;
    }

    let mut data: Option<(u32, u32)> = None;
    let mut list_seen = false;

    while let Some((id, len)) = read_chunk_header(src).await? {
        offset = offset.saturating_add(CHUNK_HEADER_LEN);
        match &id {
            b"data" => {
                data = Some((offset, len));
                if list_seen {
                    break;
                }
                offset = offset.saturating_add(len);
                src.seek(offset).await?;
            }
            b"LIST" => {
                list_seen = true;
                let list_end = offset.saturating_add(len);
                let mut kind = [0u8; 4];
                let n = read_full(src, &mut kind).await?;
                offset = offset.saturating_add(u32::try_from(n).unwrap_or(0));

                while offset < list_end {
                    let Some((tag, tag_len)) = read_chunk_header(src).await? else {
                        break;
                    };
                    offset = offset.saturating_add(CHUNK_HEADER_LEN);
                    if let Some(field) = tags.as_deref_mut().and_then(|t| t.field_mut(&tag)) {
                        read_tag(src, field, tag_len).await?;
                    }
                    offset = offset.saturating_add(tag_len);
                    src.seek(offset).await?;
                }

                if data.is_some() {
                    break;
                }
                offset = list_end;
                src.seek(offset).await?;
            }
            _ => {
                offset = offset.saturating_add(len);
                src.seek(offset).await?;
            }
        }
    }

    let Some((data_offset, data_len)) = data else {
        return Ok(None);
    };
    src.seek(data_offset).await?;
    Ok(Some(WavStream {
        format,
        cursor: StreamCursor::new(data_offset, data_len),
    }))
}

/// Next 8-byte chunk header, or `None` at end of file.
async fn read_chunk_header<S: ByteSource>(src: &mut S) -> Result<Option<([u8; 4], u32)>, S::Error> {
    let mut raw = [0u8; 8];
    if read_full(src, &mut raw).await? < raw.len() {
        return Ok(None);
    }
    let mut id = [0u8; 4];
    if let Some(tag) = raw.get(0..4) {
        id.copy_from_slice(tag);
    }
    Ok(Some((id, le_u32(&raw, 4))))
}

/// Copy at most `SIZE - 1` bytes of a tag payload, stopping at the first NUL.
async fn read_tag<S: ByteSource, const SIZE: usize>(
    src: &mut S,
    field: &mut heapless::Vec<u8, SIZE>,
    tag_len: u32,
) -> Result<(), S::Error> {
    let want = usize::try_from(tag_len)
        .unwrap_or(usize::MAX)
        .min(SIZE.saturating_sub(1));
    field.clear();
    // want < SIZE, so the resize always fits.
    let _ = field.resize(want, 0);
    let n = read_full(src, field.as_mut_slice()).await?;
    field.truncate(n);
    if let Some(nul) = field.iter().position(|b| *b == 0) {
        field.truncate(nul);
    }
    Ok(())
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    bytes
        .get(at..at.saturating_add(2))
        .and_then(|b| b.try_into().ok())
        .map_or(0, u16::from_le_bytes)
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    bytes
        .get(at..at.saturating_add(4))
        .and_then(|b| b.try_into().ok())
        .map_or(0, u32::from_le_bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use platform::mocks::MockByteSource;

    fn header(fmt_len: u32, bits: u16) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF");
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(b"WAVE");
        v.extend_from_slice(b"fmt ");
        v.extend_from_slice(&fmt_len.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&48_000u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&4u16.to_le_bytes());
        v.extend_from_slice(&bits.to_le_bytes());
        v
    }

    fn chunk(v: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
        v.extend_from_slice(id);
        v.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        v.extend_from_slice(payload);
    }

    #[tokio::test]
    async fn test_fmt_extension_is_skipped() {
        let mut file = header(18, 24);
        file.extend_from_slice(&[0xEE, 0xEE]);
        chunk(&mut file, b"data", &[1, 2, 3, 4, 5, 6]);
        let mut src = MockByteSource::new(&file);
        let stream = probe(&mut src).await.unwrap().unwrap();
        assert_eq!(stream.format.block_size_bits, 24);
        assert_eq!(stream.cursor.data_offset(), 46);
        assert_eq!(stream.cursor.data_len(), 6);
        assert_eq!(src.tell(), 46);
    }

    #[tokio::test]
    async fn test_unknown_chunks_are_skipped() {
        let mut file = header(16, 16);
        chunk(&mut file, b"fact", &[0; 4]);
        chunk(&mut file, b"junk", &[0xFF; 10]);
        chunk(&mut file, b"data", &[9; 8]);
        let mut src = MockByteSource::new(&file);
        let stream = probe(&mut src).await.unwrap().unwrap();
        assert_eq!(stream.cursor.data_offset(), 36 + 12 + 18 + 8);
    }

    #[tokio::test]
    async fn test_missing_data_chunk_is_not_playable() {
        let mut file = header(16, 16);
        chunk(&mut file, b"LIST", b"INFO");
        let mut src = MockByteSource::new(&file);
        assert_eq!(probe(&mut src).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_probe_skips_known_tags() {
        let mut list = b"INFO".to_vec();
        chunk(&mut list, b"INAM", b"Skipped");
        let mut file = header(16, 16);
        chunk(&mut file, b"LIST", &list);
        chunk(&mut file, b"data", &[0; 4]);
        let mut src = MockByteSource::new(&file);
        let stream = probe(&mut src).await.unwrap().unwrap();
        assert_eq!(src.tell(), stream.cursor.data_offset());
    }

    #[tokio::test]
    async fn test_tag_stops_at_nul() {
        let mut list = b"INFO".to_vec();
        chunk(&mut list, b"IPRD", b"Album\0\0\0");
        let mut file = header(16, 16);
        chunk(&mut file, b"LIST", &list);
        chunk(&mut file, b"data", &[0; 4]);
        let mut src = MockByteSource::new(&file);
        let mut tags: TrackTags = TrackTags::new();
        parse_with_tags(&mut src, &mut tags).await.unwrap().unwrap();
        assert_eq!(tags.album_str(), Some("Album"));
        assert!(tags.title.is_empty());
    }

    #[test]
    fn test_source_bytes_per_block() {
        let mut format = WavFormat {
            channel_count: 2,
            sample_rate_hz: 44_100,
            block_size_bits: 16,
        };
        assert_eq!(format.source_bytes_per_block(4096), 4096);
        format.block_size_bits = 24;
        assert_eq!(format.source_bytes_per_block(4096), 3072);
    }
}
