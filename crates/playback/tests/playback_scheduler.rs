//! PlaybackScheduler end-to-end tests against the mock transfer engine.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]

mod common;

use common::{
    audio_session, complete_as_ready, complete_then_stop, completion_queue, finish, info_list,
    pcm_payload, plain_wav, push_chunk, wav_header, ProgressLog,
};
use embassy_futures::select::{select, Either};
use platform::audio_config::SsifStreamConfig;
use platform::dma_safety::{PLAYBACK_BLOCK_BYTES, TRANSFER_BUFFER_COUNT};
use platform::mocks::{MockByteSource, MockDmaController, MockSourceError};
use platform::{
    ChannelState, CompletionEvent, CompletionToken, DmaError, StreamDirection,
};
use playback::{
    AudioSession, BufferState, CompletionQueue, NoProgress, PassOutcome, PlaybackResources,
    PlaybackScheduler, ProgressSink, SchedulerState, StreamControl, StreamError, TrackTags,
    TransferBufferPool,
};

const N: usize = TRANSFER_BUFFER_COUNT;
const SIZE: usize = PLAYBACK_BLOCK_BYTES;

type Pool = TransferBufferPool<N, SIZE>;
type Scheduler<'a, P> = PlaybackScheduler<'a, MockByteSource<'a>, &'a MockDmaController, P, N, SIZE>;

fn pool() -> Box<Pool> {
    Box::new(TransferBufferPool::new(StreamDirection::Outbound))
}

fn resources<'a, P: ProgressSink>(
    data: &'a [u8],
    dma: &'a MockDmaController,
    pool: &'a mut Pool,
    control: &'a StreamControl,
    completions: &'static CompletionQueue,
    session: &'static AudioSession,
    progress: P,
) -> PlaybackResources<'a, MockByteSource<'a>, &'a MockDmaController, P, N, SIZE> {
    PlaybackResources {
        source: MockByteSource::new(data),
        dma,
        pool,
        control,
        completions,
        progress,
        session,
        config: SsifStreamConfig::playback_ssif0(),
    }
}

async fn play_one_pass<P: ProgressSink>(
    scheduler: &mut Scheduler<'_, P>,
    dma: &MockDmaController,
    control: &StreamControl,
) -> Result<PassOutcome, StreamError<MockSourceError>> {
    control.request_play();
    let channel = scheduler.channel();
    match select(scheduler.run_pass(), complete_as_ready(dma, channel)).await {
        Either::First(outcome) => outcome,
        Either::Second(()) => unreachable!("transfer loop never returns"),
    }
}

#[tokio::test]
async fn test_full_pass_streams_every_whole_block() {
    // 3 s of 16-bit stereo at 44.1 kHz.
    let file = plain_wav(529_200);
    let payload = pcm_payload(529_200);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();
    let mut progress = ProgressLog::default();

    let mut scheduler = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), audio_session(), &mut progress),
        &mut tags,
    )
    .await
    .unwrap()
    .expect("playable");
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(scheduler.context().stream().format.sample_rate_hz, 44_100);

    let outcome = play_one_pass(&mut scheduler, &dma, &control).await.unwrap();
    assert_eq!(outcome, PassOutcome::Completed { blocks: 129 });
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    let channel = scheduler.channel();
    assert_eq!(dma.channel_state(channel), ChannelState::Open);
    assert!(dma.max_outstanding(channel) <= (N - 1) as u8);

    let sent = dma.submitted();
    assert_eq!(sent.len(), 129);
    assert!(!sent[0].chained);
    for (k, t) in sent.iter().enumerate() {
        assert_eq!(t.token.cycle, k as u32);
        assert_eq!(usize::from(t.token.buffer), k % N);
        assert_eq!(t.bytes, payload[k * SIZE..(k + 1) * SIZE], "block {k}");
    }

    scheduler.close().unwrap();
    assert!(dma.allocated_channels().is_empty());

    let published = &progress.0;
    assert_eq!(published.len(), 130);
    assert_eq!(published[0], 0);
    assert!(published[..129].windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(published[128], 99);
    assert_eq!(*published.last().unwrap(), 0, "restart publishes 0");
}

#[tokio::test]
async fn test_second_pass_replays_from_start() {
    let file = plain_wav(5 * SIZE + 10);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let mut scheduler = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), audio_session(), NoProgress),
        &mut tags,
    )
    .await
    .unwrap()
    .unwrap();

    let first = play_one_pass(&mut scheduler, &dma, &control).await.unwrap();
    let second = play_one_pass(&mut scheduler, &dma, &control).await.unwrap();
    assert_eq!(first, PassOutcome::Completed { blocks: 5 });
    assert_eq!(second, first);

    let sent = dma.submitted();
    assert_eq!(sent.len(), 10);
    // Cycles keep counting across passes; the payload starts over.
    assert_eq!(sent[5].token.cycle, 5);
    assert_eq!(sent[5].bytes, sent[0].bytes);
    assert_eq!(scheduler.context().next_cycle(), 10);
}

#[tokio::test]
async fn test_stop_after_three_blocks_drains_and_idles() {
    let file = plain_wav(10 * SIZE + 1);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let mut scheduler = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), audio_session(), NoProgress),
        &mut tags,
    )
    .await
    .unwrap()
    .unwrap();
    let channel = scheduler.channel();

    control.request_play();
    let outcome = match select(
        scheduler.run_pass(),
        complete_then_stop(&dma, channel, &control, 3),
    )
    .await
    {
        Either::First(outcome) => outcome.unwrap(),
        Either::Second(()) => unreachable!(),
    };

    assert_eq!(outcome, PassOutcome::Stopped { blocks: 3 });
    assert_eq!(dma.submitted_count(), 3);
    assert_eq!(dma.outstanding(channel), 0);
    assert_eq!(dma.channel_state(channel), ChannelState::Open);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(scheduler.context().pool().in_flight(), 0);
    assert!(!control.stop_requested());
    assert!(!control.play_requested());
}

#[tokio::test]
async fn test_play_after_stop_restarts_from_first_block() {
    let file = plain_wav(10 * SIZE + 1);
    let payload = pcm_payload(10 * SIZE + 1);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();
    let mut progress = ProgressLog::default();

    let mut scheduler = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), audio_session(), &mut progress),
        &mut tags,
    )
    .await
    .unwrap()
    .unwrap();
    let channel = scheduler.channel();

    control.request_play();
    let first = match select(
        scheduler.run_pass(),
        complete_then_stop(&dma, channel, &control, 3),
    )
    .await
    {
        Either::First(outcome) => outcome.unwrap(),
        Either::Second(()) => unreachable!(),
    };
    assert_eq!(first, PassOutcome::Stopped { blocks: 3 });
    assert_eq!(scheduler.context().stream().cursor.consumed(), 0);

    let second = play_one_pass(&mut scheduler, &dma, &control).await.unwrap();
    assert_eq!(second, PassOutcome::Completed { blocks: 10 });

    let sent = dma.submitted();
    assert_eq!(sent.len(), 13);
    assert_eq!(sent[3].bytes, payload[..SIZE]);
    for k in 0..10 {
        assert_eq!(sent[3 + k].bytes, payload[k * SIZE..(k + 1) * SIZE], "block {k}");
    }

    scheduler.close().unwrap();
    // 0 follows each rewind; the replay counts up from the top again.
    assert_eq!(
        progress.0,
        [0, 10, 20, 0, 0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 0]
    );
}

#[tokio::test]
async fn test_channel_fault_ends_pass_with_error() {
    let file = plain_wav(16 * SIZE);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let session = audio_session();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let mut scheduler = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), session, NoProgress),
        &mut tags,
    )
    .await
    .unwrap()
    .unwrap();
    let channel = scheduler.channel();

    control.request_play();
    let failing = async {
        loop {
            if dma.submitted_count() >= 2 {
                dma.fail(channel, DmaError::Bus);
                break;
            }
            embassy_futures::yield_now().await;
        }
        core::future::pending::<()>().await;
    };
    let result = match select(scheduler.run_pass(), failing).await {
        Either::First(r) => r,
        Either::Second(()) => unreachable!(),
    };
    assert_eq!(result, Err(StreamError::Channel(DmaError::Bus)));

    scheduler.close().unwrap();
    assert!(dma.allocated_channels().is_empty());
    assert!(!session.is_claimed());
}

#[tokio::test]
async fn test_orphan_completion_is_ignored() {
    let file = plain_wav(4 * SIZE + 1);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let mut scheduler = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), audio_session(), NoProgress),
        &mut tags,
    )
    .await
    .unwrap()
    .unwrap();
    let channel = scheduler.channel();

    for token in [
        CompletionToken { direction: StreamDirection::Outbound, buffer: 7, cycle: 0 },
        CompletionToken { direction: StreamDirection::Inbound, buffer: 0, cycle: 0 },
        CompletionToken { direction: StreamDirection::Outbound, buffer: 0, cycle: 99 },
    ] {
        dma.inject(channel, CompletionEvent::BufferReady(token));
    }

    let outcome = play_one_pass(&mut scheduler, &dma, &control).await.unwrap();
    assert_eq!(outcome, PassOutcome::Completed { blocks: 4 });
    assert!(dma.max_outstanding(channel) <= (N - 1) as u8);
}

#[tokio::test]
async fn test_open_reads_tags_before_data() {
    let mut file = wav_header(2, 48_000, 16);
    push_chunk(
        &mut file,
        b"LIST",
        &info_list(&[(b"INAM", "Opening"), (b"IART", "Test Artist")]),
    );
    push_chunk(&mut file, b"data", &pcm_payload(2 * SIZE + 4));
    let file = finish(file);

    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let scheduler = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), audio_session(), NoProgress),
        &mut tags,
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(tags.artist_str(), Some("Test Artist"));
    assert_eq!(tags.title_str(), Some("Opening"));
    assert_eq!(tags.album_str(), None);
    assert_eq!(scheduler.context().stream().format.sample_rate_hz, 48_000);
    assert_eq!(scheduler.context().stream().cursor.data_len(), (2 * SIZE + 4) as u32);
}

#[tokio::test]
async fn test_open_rejects_non_wav_without_touching_channels() {
    let file = b"ID3\x04not a wave file at all, just some bytes".to_vec();
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let session = audio_session();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let opened = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), session, NoProgress),
        &mut tags,
    )
    .await
    .unwrap();

    assert!(opened.is_none());
    assert!(dma.allocated_channels().is_empty());
    assert!(!session.is_claimed());
}

#[tokio::test]
async fn test_open_fails_while_session_is_held() {
    let file = plain_wav(SIZE * 2);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let session = audio_session();
    let _held = session.try_claim().unwrap();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let result = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), session, NoProgress),
        &mut tags,
    )
    .await;

    assert!(matches!(result, Err(StreamError::Busy)));
    assert!(dma.allocated_channels().is_empty());
}

#[tokio::test]
async fn test_open_propagates_allocation_failure() {
    let file = plain_wav(SIZE * 2);
    let dma = MockDmaController::uninitialised();
    let control = StreamControl::new();
    let session = audio_session();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let result = Scheduler::open(
        resources(&file, &dma, &mut pool, &control, completion_queue(), session, NoProgress),
        &mut tags,
    )
    .await;

    assert!(matches!(
        result,
        Err(StreamError::Channel(DmaError::NotInitialised))
    ));
    assert!(!session.is_claimed());
}

#[tokio::test]
async fn test_source_failure_mid_pass_releases_block() {
    let file = plain_wav(8 * SIZE);
    let dma = MockDmaController::new();
    let control = StreamControl::new();
    let mut pool = pool();
    let mut tags = TrackTags::<64>::new();

    let mut res = resources(&file, &dma, &mut pool, &control, completion_queue(), audio_session(), NoProgress);
    // Header, data chunk and end-of-file probe take three reads; three blocks follow.
    res.source = MockByteSource::new(&file).fail_reads_after(6);
    let mut scheduler = Scheduler::open(res, &mut tags).await.unwrap().unwrap();

    let result = play_one_pass(&mut scheduler, &dma, &control).await;
    assert_eq!(result, Err(StreamError::Source(MockSourceError)));
    assert_eq!(dma.submitted_count(), 3);
    let next = TransferBufferPool::<N, SIZE>::index_for(scheduler.context().next_cycle());
    assert_eq!(scheduler.context().pool().state(next), Some(BufferState::Free));
}
