//! End-to-end recorder behaviour over long tick sequences.

use std::path::Path;
use std::sync::Arc;

use anomrec_media::writer::WriterJournal;
use anomrec_media::{
    probe_avi, Frame, MediaError, MemoryWriterFactory, MjpegWriterFactory, RecorderConfig,
    RecorderUpdate, RollingRecorder, WriterFactory,
};
use anomrec_models::{EventStatus, RecordingEvent};
use chrono::Utc;
use image::{Rgb, RgbImage};

const FPS: f64 = 30.0;

fn frame_at(tick: usize) -> Frame {
    let shade = (tick % 256) as u8;
    Frame::new(
        RgbImage::from_pixel(16, 12, Rgb([shade, shade, shade])),
        tick as f64 / FPS,
        Utc::now(),
    )
}

fn recorder(dir: &Path, pre: f64, post: f64, factory: Arc<dyn WriterFactory>) -> RollingRecorder {
    let config = RecorderConfig {
        pre_seconds: pre,
        post_seconds: post,
        target_fps: 30,
        ..RecorderConfig::new(0, dir)
    };
    RollingRecorder::new(config, factory).unwrap()
}

fn memory_recorder(dir: &Path, pre: f64, post: f64) -> (RollingRecorder, WriterJournal) {
    let factory = MemoryWriterFactory::new();
    let journal = factory.journal();
    (recorder(dir, pre, post, Arc::new(factory)), journal)
}

/// Deterministic trigger pattern without pulling in an RNG.
fn pseudo_random(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    *seed >> 33
}

#[test]
fn test_scenario_a_preroll_and_postroll() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, journal) = memory_recorder(dir.path(), 3.0, 5.0);

    let mut updates: Vec<(usize, RecorderUpdate)> = Vec::new();
    for tick in 0..250 {
        let trigger = (90..100).contains(&tick);
        let update = rec.update(&frame_at(tick), trigger, 0).unwrap();
        if !update.is_empty() {
            updates.push((tick, update));
        }
    }

    assert_eq!(updates.len(), 2);
    let (start_tick, started) = &updates[0];
    assert_eq!(*start_tick, 90);
    assert!(started.new_event.is_some());

    let (finish_tick, finished) = &updates[1];
    assert_eq!(*finish_tick, 249);
    let finished = finished.finished_event.as_ref().unwrap();
    assert_eq!(finished.status, EventStatus::Completed);
    assert!((finished.duration_secs.unwrap() - 159.0 / FPS).abs() < 1e-9);

    let records = journal.records();
    assert_eq!(records.len(), 1);
    // 90 pre-roll frames, the trigger frame, 9 more trigger ticks, 150 post-roll ticks.
    assert_eq!(records[0].frames, 250);
    assert!(records[0].closed);
}

#[test]
fn test_scenario_a_writes_playable_avi() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), 3.0, 5.0, Arc::new(MjpegWriterFactory::new(70)));

    let mut finished = None;
    for tick in 0..250 {
        let update = rec.update(&frame_at(tick), (90..100).contains(&tick), 0).unwrap();
        if let Some(event) = update.finished_event {
            finished = Some(event);
        }
    }

    let event = finished.unwrap();
    let info = probe_avi(event.path()).unwrap();
    assert_eq!(info.frame_count, 250);
    assert_eq!((info.width, info.height), (16, 12));
    assert_eq!(info.fps, 30.0);
}

#[test]
fn test_events_pair_up_under_random_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, journal) = memory_recorder(dir.path(), 1.0, 0.5);
    let mut seed = 42;

    let mut open: Option<RecordingEvent> = None;
    let mut pairs = 0;
    for tick in 0..3000 {
        let trigger = pseudo_random(&mut seed) % 40 == 0;
        let update = rec.update(&frame_at(tick), trigger, 0).unwrap();
        assert!(update.new_event.is_none() || update.finished_event.is_none());

        if let Some(started) = update.new_event {
            assert!(open.is_none(), "new event while another is open");
            open = Some(started);
        }
        if let Some(finished) = update.finished_event {
            let started = open.take().expect("finished event without a start");
            assert_eq!(started.path, finished.path);
            assert_eq!(started.id, finished.id);
            pairs += 1;
        }
        assert!(journal.open_writers() <= 1);
        assert!(rec.prebuffer_len() <= rec.prebuffer_capacity());
    }

    assert!(pairs > 5);
    assert_eq!(journal.opened(), pairs + usize::from(open.is_some()));
}

#[test]
fn test_persons_max_is_max_over_event() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, _journal) = memory_recorder(dir.path(), 0.5, 1.0);

    let counts = [0, 2, 1, 4, 0, 3, 0, 0];
    let mut tick = 0;
    rec.update(&frame_at(tick), true, 1).unwrap();
    let mut expected = 1;
    for &count in &counts {
        tick += 1;
        rec.update(&frame_at(tick), count > 0, count).unwrap();
        expected = expected.max(count);
        assert!(rec.is_recording());
    }

    let finished = loop {
        tick += 1;
        if let Some(event) = rec.update(&frame_at(tick), false, 0).unwrap().finished_event {
            break event;
        }
    };
    assert_eq!(finished.persons_max, expected);
    assert_eq!(finished.persons_max, 4);
}

#[test]
fn test_postroll_finishes_at_first_tick_past_window() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, _journal) = memory_recorder(dir.path(), 0.0, 2.0);

    rec.update(&frame_at(0), true, 0).unwrap();
    rec.update(&frame_at(15), true, 0).unwrap();

    // Last trigger at tick 15; 2 s is 60 ticks at 30 fps.
    for tick in 16..75 {
        let update = rec.update(&frame_at(tick), false, 0).unwrap();
        assert!(update.finished_event.is_none(), "finished early at tick {tick}");
    }
    let update = rec.update(&frame_at(75), false, 0).unwrap();
    assert!(update.finished_event.is_some());
    assert!(!rec.is_recording());
}

#[test]
fn test_retrigger_after_finish_starts_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), 0.0, 0.1, Arc::new(MjpegWriterFactory::default()));

    let mut paths = Vec::new();
    for tick in 0..40 {
        let trigger = tick == 0 || tick == 30;
        let update = rec.update(&frame_at(tick), trigger, 0).unwrap();
        if let Some(event) = update.new_event {
            paths.push(event.path);
        }
    }
    rec.stop();

    // Both events usually start in the same second; the second gets a suffix.
    assert_eq!(paths.len(), 2);
    assert_ne!(paths[0], paths[1]);
    assert!(paths.iter().all(|p| p.exists()));
}

#[test]
fn test_write_failure_releases_writer_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryWriterFactory::failing_after(3);
    let journal = factory.journal();
    let mut rec = recorder(dir.path(), 1.0, 1.0, Arc::new(factory));

    for tick in 0..10 {
        rec.update(&frame_at(tick), false, 0).unwrap();
    }
    // Pre-roll alone overflows the writer: no event, nothing to finish.
    let result = rec.update(&frame_at(10), true, 0);
    assert!(matches!(result, Err(MediaError::WriteFailed { .. })));
    assert!(!rec.is_recording());
    assert_eq!(journal.open_writers(), 0);

    // The next trigger opens a fresh writer.
    let update = rec.update(&frame_at(11), true, 0).unwrap();
    assert!(update.new_event.is_some());
    assert_eq!(journal.opened(), 2);
}
