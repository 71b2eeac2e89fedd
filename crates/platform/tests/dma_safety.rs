//! Architecture tests: DMA buffer alignment and sizing constants.

#![allow(clippy::indexing_slicing)]
#![allow(clippy::assertions_on_constants)]

use platform::dma_safety::{
    is_dma_aligned, Align32, DMA_ALIGN_BYTES, DUPLEX_BLOCK_BYTES, PLAYBACK_BLOCK_BYTES,
    TRANSFER_BUFFER_COUNT,
};

#[test]
fn align32_places_every_array_element_on_a_boundary() {
    let ring = [Align32([0u8; DUPLEX_BLOCK_BYTES]); TRANSFER_BUFFER_COUNT];
    for block in &ring {
        assert!(is_dma_aligned(block.0.as_ptr()));
    }
}

#[test]
fn align32_does_not_pad_whole_cache_line_blocks() {
    assert_eq!(
        core::mem::size_of::<Align32<[u8; PLAYBACK_BLOCK_BYTES]>>(),
        PLAYBACK_BLOCK_BYTES
    );
}

#[test]
fn offset_pointer_is_not_aligned() {
    let block = Align32([0u8; 64]);
    assert!(!is_dma_aligned(block.0[1..].as_ptr()));
    assert!(is_dma_aligned(block.0[DMA_ALIGN_BYTES..].as_ptr()));
}

#[test]
fn reference_ring_geometry() {
    assert_eq!(TRANSFER_BUFFER_COUNT, 3);
    assert_eq!(PLAYBACK_BLOCK_BYTES, 4096);
    assert_eq!(DUPLEX_BLOCK_BYTES, 512);
    assert!(PLAYBACK_BLOCK_BYTES > DUPLEX_BLOCK_BYTES);
}
