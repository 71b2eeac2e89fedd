//! Shared fixtures: WAV builders and a simulated transfer engine loop.

#![allow(dead_code)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::cast_possible_truncation)]

use embassy_futures::yield_now;
use platform::mocks::MockDmaController;
use platform::ChannelId;
use playback::{AudioSession, CompletionQueue, ProgressSink, StreamControl};

/// Deterministic payload byte at offset `i`.
pub fn pcm_byte(i: usize) -> u8 {
    (i % 251) as u8
}

/// `len` payload bytes following [`pcm_byte`].
pub fn pcm_payload(len: usize) -> Vec<u8> {
    (0..len).map(pcm_byte).collect()
}

/// RIFF descriptor and a standard 16-byte `fmt ` chunk.
pub fn wav_header(channels: u16, rate: u32, bits: u16) -> Vec<u8> {
    let align = channels * (bits / 8);
    let mut v = Vec::new();
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(b"WAVE");
    v.extend_from_slice(b"fmt ");
    v.extend_from_slice(&16u32.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&channels.to_le_bytes());
    v.extend_from_slice(&rate.to_le_bytes());
    v.extend_from_slice(&(rate * u32::from(align)).to_le_bytes());
    v.extend_from_slice(&align.to_le_bytes());
    v.extend_from_slice(&bits.to_le_bytes());
    v
}

/// Append a chunk with `id` and `payload`.
pub fn push_chunk(v: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
    v.extend_from_slice(id);
    v.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    v.extend_from_slice(payload);
}

/// `LIST`/`INFO` payload from `(tag, value)` pairs, values NUL-terminated.
pub fn info_list(entries: &[(&[u8; 4], &str)]) -> Vec<u8> {
    let mut list = b"INFO".to_vec();
    for (tag, value) in entries {
        let mut text = value.as_bytes().to_vec();
        text.push(0);
        push_chunk(&mut list, tag, &text);
    }
    list
}

/// Patch the RIFF length field once the file is complete.
pub fn finish(mut v: Vec<u8>) -> Vec<u8> {
    let riff_len = (v.len() - 8) as u32;
    v[4..8].copy_from_slice(&riff_len.to_le_bytes());
    v
}

/// 16-bit stereo 44.1 kHz file with `data_len` payload bytes and no tags.
pub fn plain_wav(data_len: usize) -> Vec<u8> {
    let mut v = wav_header(2, 44_100, 16);
    push_chunk(&mut v, b"data", &pcm_payload(data_len));
    finish(v)
}

/// Leaked completion queue, one per test so parallel tests never share it.
pub fn completion_queue() -> &'static CompletionQueue {
    Box::leak(Box::new(CompletionQueue::new()))
}

/// Leaked session latch.
pub fn audio_session() -> &'static AudioSession {
    Box::leak(Box::new(AudioSession::new()))
}

/// Progress sink that keeps every published value.
#[derive(Default)]
pub struct ProgressLog(pub Vec<u32>);

impl ProgressSink for ProgressLog {
    fn publish(&mut self, percent: u32) {
        self.0.push(percent);
    }
}

/// Simulated transfer engine: completes the oldest transfer on `channel`
/// whenever one is outstanding. Never returns; race it against the
/// scheduler with `select`.
pub async fn complete_as_ready(dma: &MockDmaController, channel: ChannelId) {
    loop {
        if dma.outstanding(channel) > 0 {
            dma.complete_next(channel);
        }
        yield_now().await;
    }
}

/// Like [`complete_as_ready`], but requests a stop once `after` transfers
/// have been submitted.
pub async fn complete_then_stop(
    dma: &MockDmaController,
    channel: ChannelId,
    control: &StreamControl,
    after: usize,
) {
    let mut requested = false;
    loop {
        if !requested && dma.submitted_count() >= after {
            control.request_stop();
            requested = true;
        }
        if dma.outstanding(channel) > 0 {
            dma.complete_next(channel);
        }
        yield_now().await;
    }
}
