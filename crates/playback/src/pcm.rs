//! PCM payload cursor and block reads.
//!
//! [`read_block`] fills one transfer block from the payload. 16-bit streams
//! are copied verbatim. Packed 24-bit streams are widened to the 32-bit
//! serial slot the SSIF expects, one zero pad byte in front of every source
//! triple:
//!
//! ```text
//! source  b0 b1 b2 | b3 b4 b5 | ...
//! block   00 b0 b1 b2 | 00 b3 b4 b5 | ...
//! ```
//!
//! The cursor is clamped to the payload, so a read never runs past `data`
//! into trailing chunks. Whatever part of the block is not covered by payload
//! bytes is zeroed (silence).

use platform::{read_full, ByteSource};

use crate::wav::WavFormat;

/// Position inside the PCM payload.
///
/// `consumed <= data_len` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamCursor {
    data_offset: u32,
    data_len: u32,
    consumed: u32,
}

impl StreamCursor {
    /// Cursor at the start of a payload.
    #[must_use]
    pub const fn new(data_offset: u32, data_len: u32) -> Self {
        Self {
            data_offset,
            data_len,
            consumed: 0,
        }
    }

    /// File offset of the first PCM byte.
    #[must_use]
    pub const fn data_offset(&self) -> u32 {
        self.data_offset
    }

    /// Payload length in bytes.
    #[must_use]
    pub const fn data_len(&self) -> u32 {
        self.data_len
    }

    /// Payload bytes read so far.
    #[must_use]
    pub const fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Payload bytes left.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.data_len.saturating_sub(self.consumed)
    }

    /// Advance by up to `n` bytes; returns the amount actually advanced.
    pub fn advance(&mut self, n: u32) -> u32 {
        let step = n.min(self.remaining());
        self.consumed = self.consumed.saturating_add(step);
        step
    }
}

/// Fill `block` from the payload at `cursor`.
///
/// Returns the number of bytes of `block` that carry audio; the rest is
/// zeroed. Returns `0` once the payload is exhausted.
///
/// # Errors
///
/// Propagates byte source failures.
pub async fn read_block<S: ByteSource>(
    src: &mut S,
    cursor: &mut StreamCursor,
    format: &WavFormat,
    block: &mut [u8],
) -> Result<usize, S::Error> {
    let filled = if format.is_packed_24() {
        read_packed_24(src, cursor, block).await?
    } else {
        let want = clamp_to_remaining(block.len(), cursor);
        let n = match block.get_mut(..want) {
            Some(head) => read_full(src, head).await?,
            None => 0,
        };
        cursor.advance(u32::try_from(n).unwrap_or(u32::MAX));
        n
    };
    if let Some(tail) = block.get_mut(filled..) {
        tail.fill(0);
    }
    Ok(filled)
}

fn clamp_to_remaining(want: usize, cursor: &StreamCursor) -> usize {
    want.min(usize::try_from(cursor.remaining()).unwrap_or(usize::MAX))
}

/// Read source triples into the back of `block`, then widen them in place
/// front to back. Frame `k` is written to `4k..4k+4` and read from
/// `base + 3k..base + 3k + 3` with `base >= block.len() / 4 > k`, so no
/// frame is overwritten before it has been read.
#[allow(clippy::arithmetic_side_effects)] // Safety: all offsets bounded by block.len()
async fn read_packed_24<S: ByteSource>(
    src: &mut S,
    cursor: &mut StreamCursor,
    block: &mut [u8],
) -> Result<usize, S::Error> {
    let frames = block.len() / 4;
    let want = clamp_to_remaining(frames * 3, cursor);
    let base = block.len() - want;
    let n = match block.get_mut(base..) {
        Some(back) => read_full(src, back).await?,
        None => 0,
    };
    cursor.advance(u32::try_from(n).unwrap_or(u32::MAX));

    let mut out = 0usize;
    let mut k = 0usize;
    while k * 3 < n {
        let start = base + k * 3;
        let take = (n - k * 3).min(3);
        let mut frame = [0u8; 3];
        if let (Some(dst), Some(srcb)) = (frame.get_mut(..take), block.get(start..start + take)) {
            dst.copy_from_slice(srcb);
        }
        if let (Some((pad, rest)), Some(bytes)) = (
            block
                .get_mut(out..out + 1 + take)
                .and_then(<[u8]>::split_first_mut),
            frame.get(..take),
        ) {
            *pad = 0;
            rest.copy_from_slice(bytes);
        }
        out += 1 + take;
        k += 1;
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use platform::mocks::MockByteSource;

    const PCM16: WavFormat = WavFormat {
        channel_count: 2,
        sample_rate_hz: 44_100,
        block_size_bits: 16,
    };

    #[test]
    fn test_cursor_clamps_advance() {
        let mut cursor = StreamCursor::new(44, 10);
        assert_eq!(cursor.advance(6), 6);
        assert_eq!(cursor.advance(6), 4);
        assert_eq!(cursor.consumed(), 10);
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.advance(1), 0);
    }

    #[tokio::test]
    async fn test_16_bit_block_is_verbatim() {
        let payload: Vec<u8> = (0u8..16).collect();
        let mut src = MockByteSource::new(&payload);
        let mut cursor = StreamCursor::new(0, 16);
        let mut block = [0xFFu8; 8];
        assert_eq!(read_block(&mut src, &mut cursor, &PCM16, &mut block).await.unwrap(), 8);
        assert_eq!(block, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(cursor.consumed(), 8);
    }

    #[tokio::test]
    async fn test_read_stops_at_payload_end_and_zero_fills() {
        // Payload is 5 bytes followed by an unrelated chunk.
        let file = [1u8, 2, 3, 4, 5, b'L', b'I', b'S', b'T'];
        let mut src = MockByteSource::new(&file);
        let mut cursor = StreamCursor::new(0, 5);
        let mut block = [0xFFu8; 8];
        assert_eq!(read_block(&mut src, &mut cursor, &PCM16, &mut block).await.unwrap(), 5);
        assert_eq!(block, [1, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(src.tell(), 5);
        assert_eq!(read_block(&mut src, &mut cursor, &PCM16, &mut block).await.unwrap(), 0);
        assert_eq!(block, [0; 8]);
    }

    #[tokio::test]
    async fn test_24_bit_partial_frame() {
        let payload = [1u8, 2, 3, 4, 5];
        let mut src = MockByteSource::new(&payload);
        let mut cursor = StreamCursor::new(0, 5);
        let format = WavFormat {
            block_size_bits: 24,
            ..PCM16
        };
        let mut block = [0xFFu8; 12];
        let n = read_block(&mut src, &mut cursor, &format, &mut block).await.unwrap();
        assert_eq!(n, 7);
        assert_eq!(block, [0, 1, 2, 3, 0, 4, 5, 0, 0, 0, 0, 0]);
    }

    proptest::proptest! {
        /// Widening keeps every source byte, in order, behind one pad byte
        /// per triple, whatever the chunking of the underlying reads.
        #[test]
        fn packed_24_matches_reference_expansion(
            payload in proptest::collection::vec(proptest::num::u8::ANY, 0..200),
            frames in 1usize..40,
            chunk in 1usize..17,
        ) {
            let format = WavFormat { block_size_bits: 24, ..PCM16 };
            let mut src = MockByteSource::new(&payload).with_max_chunk(chunk);
            let mut cursor = StreamCursor::new(0, payload.len() as u32);
            let mut block = vec![0xA5u8; frames * 4];
            let n = block_on_read(read_block(&mut src, &mut cursor, &format, &mut block));

            let used = payload.len().min(frames * 3);
            let mut expected = Vec::new();
            for triple in payload[..used].chunks(3) {
                expected.push(0);
                expected.extend_from_slice(triple);
            }
            expected.resize(frames * 4, 0);
            proptest::prop_assert_eq!(n, used + used.div_ceil(3));
            proptest::prop_assert_eq!(block, expected);
            proptest::prop_assert_eq!(cursor.consumed() as usize, used);
        }
    }

    fn block_on_read<F>(f: F) -> usize
    where
        F: core::future::Future<Output = Result<usize, platform::mocks::MockSourceError>>,
    {
        embassy_futures::block_on(f).unwrap()
    }
}
