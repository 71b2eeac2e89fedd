//! xtask simulate: play a WAV file through the simulated DMA controller.
//!
//! The real `PlaybackScheduler` drives a `MockDmaController` that completes
//! each transfer as soon as the scheduler yields. Progress arrives over an
//! embassy channel, the same way the firmware's display task receives it.

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use platform::audio_config::SsifStreamConfig;
use platform::dma_safety::{PLAYBACK_BLOCK_BYTES, TRANSFER_BUFFER_COUNT};
use platform::file_source::LocalFileSource;
use platform::mocks::MockDmaController;
use platform::{ChannelId, StreamDirection};
use playback::{
    AudioSession, CompletionQueue, PassOutcome, PlaybackResources, PlaybackScheduler,
    StreamControl, TrackTags, TransferBufferPool,
};

static COMPLETIONS: CompletionQueue = CompletionQueue::new();
static SESSION: AudioSession = AudioSession::new();

type Progress = Channel<CriticalSectionRawMutex, u32, 8>;

/// Summary of a simulated run.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SimulationReport {
    pub passes: u32,
    pub blocks: u32,
    pub transfers: usize,
    pub max_in_flight: u8,
}

/// Entry point called from main.rs
pub fn run(path: &Path, passes: u32) -> Result<()> {
    let start = Instant::now();
    println!("{}", format!("Simulating {}", path.display()).cyan().bold());

    let report = simulate(path, passes, |pct| {
        print!("\r  progress {pct:>3}%");
    })?;
    println!();
    println!(
        "{}",
        format!(
            "✓ {} pass(es), {} blocks, {} transfers (max {} in flight) in {:.2}s",
            report.passes,
            report.blocks,
            report.transfers,
            report.max_in_flight,
            start.elapsed().as_secs_f64()
        )
        .green()
    );
    Ok(())
}

/// Stream `path` `passes` times; `on_progress` sees every published value.
pub(crate) fn simulate(
    path: &Path,
    passes: u32,
    mut on_progress: impl FnMut(u32),
) -> Result<SimulationReport> {
    let source = LocalFileSource::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let progress = Progress::new();
    let mut pool: Box<TransferBufferPool<TRANSFER_BUFFER_COUNT, PLAYBACK_BLOCK_BYTES>> =
        Box::new(TransferBufferPool::new(StreamDirection::Outbound));
    let mut tags = TrackTags::<64>::new();

    block_on(async {
        let opened = PlaybackScheduler::open(
            PlaybackResources {
                source,
                dma: &dma,
                pool: &mut pool,
                control: &control,
                completions: &COMPLETIONS,
                progress: progress.sender(),
                session: &SESSION,
                config: SsifStreamConfig::playback_ssif0(),
            },
            &mut tags,
        )
        .await
        .map_err(|e| anyhow::anyhow!("open failed: {e}"))?;
        let Some(mut scheduler) = opened else {
            bail!("{} is not a playable WAV stream", path.display());
        };
        if let Some(title) = tags.title_str() {
            tracing::info!("title: {title}");
        }

        let channel = scheduler.channel();
        let mut report = SimulationReport::default();
        for _ in 0..passes {
            control.request_play();
            let outcome = match select(
                scheduler.run_pass(),
                transfer_engine(&dma, channel, &progress, &mut on_progress),
            )
            .await
            {
                Either::First(outcome) => outcome.map_err(|e| anyhow::anyhow!("pass failed: {e}"))?,
                Either::Second(()) => unreachable!("transfer engine loops forever"),
            };
            while let Ok(pct) = progress.try_receive() {
                on_progress(pct);
            }
            match outcome {
                PassOutcome::Completed { blocks } | PassOutcome::Stopped { blocks } => {
                    report.passes = report.passes.saturating_add(1);
                    report.blocks = report.blocks.saturating_add(blocks);
                }
                PassOutcome::NoStream => break,
            }
        }

        report.transfers = dma.submitted_count();
        report.max_in_flight = dma.max_outstanding(channel);
        scheduler
            .close()
            .map_err(|e| anyhow::anyhow!("close failed: {e}"))?;
        Ok::<_, anyhow::Error>(report)
    })
}

/// Complete transfers as they arrive and forward progress updates.
async fn transfer_engine(
    dma: &MockDmaController,
    channel: ChannelId,
    progress: &Progress,
    on_progress: &mut impl FnMut(u32),
) {
    loop {
        while let Ok(pct) = progress.try_receive() {
            on_progress(pct);
        }
        if dma.outstanding(channel) > 0 {
            dma.complete_next(channel);
        }
        embassy_futures::yield_now().await;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn wav(data_len: usize) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF\0\0\0\0WAVEfmt ");
        v.extend_from_slice(&16u32.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&48_000u32.to_le_bytes());
        v.extend_from_slice(&192_000u32.to_le_bytes());
        v.extend_from_slice(&4u16.to_le_bytes());
        v.extend_from_slice(&16u16.to_le_bytes());
        v.extend_from_slice(b"data");
        v.extend_from_slice(&(data_len as u32).to_le_bytes());
        v.extend((0..data_len).map(|i| i as u8));
        let riff_len = (v.len() - 8) as u32;
        v[4..8].copy_from_slice(&riff_len.to_le_bytes());
        v
    }

    // Both scenarios share the static session, so they run in one test.
    #[test]
    fn simulate_plays_every_pass_and_releases_the_session() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tone.wav");
        fs::write(&path, wav(10 * PLAYBACK_BLOCK_BYTES + 100)).unwrap();

        let mut seen = Vec::new();
        let report = simulate(&path, 2, |pct| seen.push(pct)).unwrap();
        assert_eq!(report.passes, 2);
        assert_eq!(report.blocks, 20);
        assert_eq!(report.transfers, 20);
        assert!(report.max_in_flight as usize <= TRANSFER_BUFFER_COUNT - 1);
        assert_eq!(seen.last(), Some(&0));
        assert!(seen.contains(&90));
        assert!(!SESSION.is_claimed());

        let junk = tmp.path().join("junk.wav");
        fs::write(&junk, b"not audio").unwrap();
        assert!(simulate(&junk, 1, |_| {}).is_err());
        assert!(!SESSION.is_claimed());
    }
}
