use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pixmid_resample::{PixelGrid, ResizeAlgorithm};

use super::*;
use crate::classify::ClassifierMethod;
use crate::config::NoteLengthPolicy;
use crate::events::EventKind;
use crate::palette::Color;

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

const WAIT: Duration = Duration::from_secs(10);

fn palette() -> Arc<Palette> {
    Arc::new(Palette::new([Color::from(RED), Color::from(GREEN), Color::from(BLUE)]).unwrap())
}

/// Keys 60.. with one column per source column, no vertical resampling
fn config(width: u8) -> ConversionConfig {
    ConversionConfig {
        start_key: 60,
        end_key: 60 + width,
        resample: ResizeAlgorithm::Nearest,
        classifier: ClassifierMethod::Exact,
        ..Default::default()
    }
}

/// Grid from rows listed top to bottom
fn image(rows: &[&[[u8; 4]]]) -> PixelGrid {
    let width = rows[0].len() as u32;
    let data = rows.iter().flat_map(|r| r.iter().flatten().copied()).collect();
    PixelGrid::from_rgba(width, rows.len() as u32, data).unwrap()
}

fn column(colors: &[[u8; 4]]) -> PixelGrid {
    let rows: Vec<&[[u8; 4]]> = colors.iter().map(std::slice::from_ref).collect();
    image(&rows)
}

fn run_to_outcome(engine: &ConversionEngine, progress: Option<ProgressFn>, protect: bool) -> RunOutcome {
    let (tx, rx) = mpsc::channel();
    engine
        .run(
            move |outcome| {
                let _ = tx.send(outcome);
            },
            progress,
            protect,
        )
        .unwrap();
    rx.recv_timeout(WAIT).unwrap()
}

fn completed(outcome: RunOutcome) -> Arc<ConversionResult> {
    match outcome {
        RunOutcome::Completed(result) => result,
        other => panic!("expected completion, got {other:?}"),
    }
}

/// Classifier that blocks until `gate` opens
fn gated_classifier(gate: Arc<AtomicBool>) -> Arc<dyn Classifier> {
    Arc::new(move |r: u8, g: u8, _b: u8| -> Option<usize> {
        while !gate.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
        if r > g { Some(0) } else { Some(1) }
    })
}

// ============================================================================
// Scan semantics
// ============================================================================

#[test]
fn test_constant_column_single_note() {
    let engine = ConversionEngine::new(palette(), column(&[RED; 7]), config(1)).unwrap();
    let result = completed(run_to_outcome(&engine, None, true));

    assert_eq!(result.height(), 7);
    assert_eq!(result.event_count(), 2);
    let events = result.track(0).unwrap().events();
    assert_eq!((events[0].kind, events[0].tick), (EventKind::NoteOn, 0));
    assert_eq!((events[1].kind, events[1].tick), (EventKind::NoteOff, 7));
    assert_eq!(events[1].delta, 7);
}

#[test]
fn test_bottom_row_emitted_first() {
    // Top to bottom: red red green green
    let engine =
        ConversionEngine::new(palette(), column(&[RED, RED, GREEN, GREEN]), config(1)).unwrap();
    let result = engine.convert().unwrap();

    let timeline = |track: usize| -> Vec<(EventKind, u32)> {
        let events = result.track(track).unwrap().events();
        events.iter().map(|e| (e.kind, e.tick)).collect()
    };
    let (red, green) = (timeline(0), timeline(1));
    assert_eq!(green, vec![(EventKind::NoteOn, 0), (EventKind::NoteOff, 2)]);
    assert_eq!(red, vec![(EventKind::NoteOn, 2), (EventKind::NoteOff, 4)]);
}

#[test]
fn test_grid_split_through_engine() {
    let config = ConversionConfig {
        note_length: NoteLengthPolicy::Grid { max_len: 2 },
        ..config(1)
    };
    let engine = ConversionEngine::new(palette(), column(&[BLUE; 6]), config).unwrap();
    let result = engine.convert().unwrap();

    let notes: Vec<(u32, u32)> = result.notes().iter().map(|n| (n.start, n.end)).collect();
    assert_eq!(notes, vec![(0, 2), (2, 4), (4, 6)]);
    assert!(notes.iter().all(|&(s, e)| e - s <= 2));
}

#[test]
fn test_transparent_pixels_are_silent() {
    let engine =
        ConversionEngine::new(palette(), column(&[RED, CLEAR, CLEAR, RED]), config(1)).unwrap();
    let result = engine.convert().unwrap();
    let notes: Vec<(u32, u32)> = result.notes().iter().map(|n| (n.start, n.end)).collect();
    assert_eq!(notes, vec![(0, 1), (3, 4)]);
}

#[test]
fn test_events_well_formed() {
    // Deterministic pseudo-random image over all colors plus transparency
    let colors = [RED, GREEN, BLUE, CLEAR];
    let (width, height) = (6u32, 24u32);
    let mut seed = 0x2545_f491u32;
    let mut data = Vec::new();
    for _ in 0..width * height {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        data.extend_from_slice(&colors[(seed >> 16) as usize % colors.len()]);
    }
    let source = PixelGrid::from_rgba(width, height, data).unwrap();
    let config = ConversionConfig {
        note_length: NoteLengthPolicy::Flow { max_len: 3 },
        ..config(width as u8)
    };
    let result = ConversionEngine::new(palette(), source, config)
        .unwrap()
        .convert()
        .unwrap();

    for track in result.tracks() {
        let mut open = [0i32; 128];
        let mut last = 0;
        for event in track.events() {
            assert!(event.tick >= last, "ticks must not decrease");
            assert!(event.tick <= height);
            last = event.tick;
            let slot = &mut open[event.key as usize];
            match event.kind {
                EventKind::NoteOn => *slot += 1,
                EventKind::NoteOff => {
                    *slot -= 1;
                    assert!(*slot >= 0, "NoteOff without NoteOn");
                }
            }
        }
        assert!(open.iter().all(|&n| n == 0), "unclosed note");
        assert!(track.notes().iter().all(|n| n.len() >= 1 && n.len() <= 3));
    }
}

#[test]
fn test_resample_to_target_height() {
    let source = image(&[&[RED, GREEN], &[BLUE, RED]]);
    let config = ConversionConfig {
        target_height: Some(6),
        ..config(4)
    };
    let result = ConversionEngine::new(palette(), source, config)
        .unwrap()
        .convert()
        .unwrap();
    assert_eq!((result.width(), result.height()), (4, 6));
    // Nearest upscaling keeps runs of 3 rows per source row
    assert_eq!(result.note_count(), 8);
}

#[test]
fn test_from_raw_uses_stride() {
    let pixels: Vec<u8> = [RED, RED, GREEN, GREEN].concat();
    let engine = ConversionEngine::from_raw(palette(), pixels, 8, config(2)).unwrap();
    assert_eq!((engine.source().width(), engine.source().height()), (2, 2));
    // Each column: green then red
    assert_eq!(engine.convert().unwrap().note_count(), 4);
}

// ============================================================================
// Construction and argument errors
// ============================================================================

#[test]
fn test_empty_palette_rejected() {
    assert!(matches!(
        Palette::new(Vec::new()),
        Err(ConversionError::InvalidPalette(_))
    ));
}

#[test]
fn test_short_key_list_rejected_before_run() {
    let config = ConversionConfig {
        key_list: Some(vec![60]),
        ..config(2)
    };
    let engine = ConversionEngine::new(palette(), image(&[&[RED, RED]]), config).unwrap();
    let err = engine.run(|_| {}, None, true).unwrap_err();
    assert!(matches!(err, ConversionError::InvalidArgument(_)));
    assert_eq!(engine.state(), ConversionState::NotStarted);
}

#[test]
fn test_zero_grid_length_rejected() {
    assert!(NoteLengthPolicy::from_flags(true, 0).is_err());
    let config = ConversionConfig {
        note_length: NoteLengthPolicy::Grid { max_len: 0 },
        ..config(1)
    };
    let engine = ConversionEngine::new(palette(), column(&[RED]), config).unwrap();
    assert!(matches!(
        engine.start(),
        Err(ConversionError::InvalidArgument(_))
    ));
}

#[test]
fn test_result_before_run() {
    let engine = ConversionEngine::new(palette(), column(&[RED]), config(1)).unwrap();
    assert_eq!(
        engine.result().unwrap_err(),
        ConversionError::NotCompleted(ConversionState::NotStarted)
    );
    assert_eq!(
        engine.wait_for_completion(Duration::from_millis(1)).unwrap(),
        ConversionState::NotStarted
    );
}

#[test]
fn test_progress_stages_reach_completion() {
    let engine = ConversionEngine::new(palette(), column(&[RED; 4]), config(1)).unwrap();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let progress: ProgressFn = Box::new(move |p| sink.lock().unwrap().push(p));

    completed(run_to_outcome(&engine, Some(progress), true));
    let reports = reports.lock().unwrap();
    for stage in [Stage::Resizing, Stage::Classifying, Stage::Scanning] {
        let fractions: Vec<f32> = reports
            .iter()
            .filter(|p| p.stage == stage)
            .map(|p| p.fraction)
            .collect();
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)), "{stage:?}: {fractions:?}");
        assert_eq!(fractions.last(), Some(&1.0), "{stage:?} never finished");
    }
}

// ============================================================================
// Cancellation and protection
// ============================================================================

#[test]
fn test_cancel_before_scan() {
    let engine = ConversionEngine::new(palette(), column(&[RED; 8]), config(1)).unwrap();
    let handle = engine.clone();
    let progress: ProgressFn = Box::new(move |p| {
        if p.stage == Stage::Resizing {
            handle.cancel();
        }
    });

    let outcome = run_to_outcome(&engine, Some(progress), true);
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(engine.state(), ConversionState::Cancelled);
    assert_eq!(
        engine.result().unwrap_err(),
        ConversionError::NotCompleted(ConversionState::Cancelled)
    );
}

#[test]
fn test_cancel_deferred_during_protected_scan() {
    let engine = ConversionEngine::new(palette(), column(&[RED, GREEN, RED, GREEN]), config(1)).unwrap();
    let handle = engine.clone();
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&accepted);
    let progress: ProgressFn = Box::new(move |p| {
        if p.stage == Stage::Scanning {
            seen.lock().unwrap().push(handle.cancel());
        }
    });

    let result = completed(run_to_outcome(&engine, Some(progress), true));
    assert_eq!(result.note_count(), 4);
    let accepted = accepted.lock().unwrap();
    assert!(!accepted.is_empty());
    assert!(accepted.iter().all(|&a| !a));
    assert_eq!(engine.state(), ConversionState::Completed);
    assert!(engine.result().is_ok());
}

#[test]
fn test_cancel_without_protection_stops_scan() {
    let engine = ConversionEngine::new(palette(), column(&[RED; 8]), config(1)).unwrap();
    let handle = engine.clone();
    let progress: ProgressFn = Box::new(move |p| {
        if p.stage == Stage::Scanning {
            handle.cancel();
        }
    });

    let outcome = run_to_outcome(&engine, Some(progress), false);
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert!(engine.result().is_err());
}

#[test]
fn test_force_cancel_mid_scan() {
    let engine = ConversionEngine::new(palette(), column(&[RED; 8]), config(1)).unwrap();
    let handle = engine.clone();
    let progress: ProgressFn = Box::new(move |p| {
        if p.stage == Stage::Scanning {
            handle.force_cancel();
        }
    });

    let outcome = run_to_outcome(&engine, Some(progress), true);
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(engine.state(), ConversionState::Cancelled);
}

#[test]
fn test_new_run_supersedes_previous() {
    let gate = Arc::new(AtomicBool::new(false));
    let engine = ConversionEngine::with_classifier(
        palette(),
        column(&[RED, GREEN]),
        config(1),
        gated_classifier(Arc::clone(&gate)),
    )
    .unwrap();

    // Hold the first run inside classification
    let (stage_tx, stage_rx) = mpsc::channel();
    let stage_tx = Mutex::new(stage_tx);
    let progress: ProgressFn = Box::new(move |p| {
        let _ = stage_tx.lock().unwrap().send(p.stage);
    });
    let (first_tx, first_rx) = mpsc::channel();
    engine
        .run(move |o| drop(first_tx.send(o)), Some(progress), true)
        .unwrap();
    while stage_rx.recv_timeout(WAIT).unwrap() != Stage::Classifying {}

    let (second_tx, second_rx) = mpsc::channel();
    engine
        .run(move |o| drop(second_tx.send(o)), None, true)
        .unwrap();
    gate.store(true, Ordering::Release);

    assert!(matches!(first_rx.recv_timeout(WAIT).unwrap(), RunOutcome::Cancelled));
    let second = completed(second_rx.recv_timeout(WAIT).unwrap());
    assert_eq!(second.note_count(), 2);
    assert_eq!(engine.wait_for_completion(WAIT).unwrap(), ConversionState::Completed);
    assert!(Arc::ptr_eq(&engine.result().unwrap(), &second));
}

#[test]
fn test_wait_timeout_does_not_cancel() {
    let gate = Arc::new(AtomicBool::new(false));
    let engine = ConversionEngine::with_classifier(
        palette(),
        column(&[RED]),
        config(1),
        gated_classifier(Arc::clone(&gate)),
    )
    .unwrap();
    engine.start().unwrap();

    let err = engine
        .wait_for_completion(Duration::from_millis(5))
        .unwrap_err();
    assert_eq!(err, ConversionError::Timeout(Duration::from_millis(5)));

    gate.store(true, Ordering::Release);
    assert_eq!(engine.wait_for_completion(WAIT).unwrap(), ConversionState::Completed);
    assert_eq!(engine.result().unwrap().note_count(), 1);
}

// ============================================================================
// Runtime failures
// ============================================================================

#[test]
fn test_panicking_classifier_fails_run() {
    let classifier: Arc<dyn Classifier> =
        Arc::new(|_r: u8, _g: u8, _b: u8| -> Option<usize> { panic!("classifier exploded") });
    let engine =
        ConversionEngine::with_classifier(palette(), column(&[RED; 3]), config(1), classifier)
            .unwrap();

    let outcome = run_to_outcome(&engine, None, true);
    assert!(matches!(
        outcome,
        RunOutcome::Failed(ConversionError::RuntimeFailure(_))
    ));
    assert_eq!(engine.state(), ConversionState::Failed);
    assert!(matches!(
        engine.result(),
        Err(ConversionError::RuntimeFailure(_))
    ));
}

#[test]
fn test_failure_after_force_cancel_reports_cancelled() {
    let gate = Arc::new(AtomicBool::new(false));
    let open = Arc::clone(&gate);
    let classifier: Arc<dyn Classifier> = Arc::new(move |_r: u8, _g: u8, _b: u8| -> Option<usize> {
        while !open.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
        panic!("classifier torn down")
    });
    let engine =
        ConversionEngine::with_classifier(palette(), column(&[RED; 2]), config(1), classifier)
            .unwrap();

    let (stage_tx, stage_rx) = mpsc::channel();
    let stage_tx = Mutex::new(stage_tx);
    let progress: ProgressFn = Box::new(move |p| {
        let _ = stage_tx.lock().unwrap().send(p.stage);
    });
    let (tx, rx) = mpsc::channel();
    engine
        .run(move |o| drop(tx.send(o)), Some(progress), true)
        .unwrap();
    while stage_rx.recv_timeout(WAIT).unwrap() != Stage::Classifying {}

    assert!(engine.force_cancel());
    gate.store(true, Ordering::Release);

    assert!(matches!(rx.recv_timeout(WAIT).unwrap(), RunOutcome::Cancelled));
    assert_eq!(engine.wait_for_completion(WAIT).unwrap(), ConversionState::Cancelled);
}

#[test]
fn test_out_of_range_track_fails_run() {
    let classifier: Arc<dyn Classifier> = Arc::new(|_r: u8, _g: u8, _b: u8| -> Option<usize> { Some(7) });
    let engine =
        ConversionEngine::with_classifier(palette(), column(&[RED; 2]), config(1), classifier)
            .unwrap();
    assert!(matches!(
        engine.convert(),
        Err(ConversionError::RuntimeFailure(_))
    ));
}
