//! Integration tests for pixmid
//!
//! Tests the full pipeline: generate test images -> convert -> parse MIDI


use std::path::Path;
use std::process::{Command, Output};

use generate_test_assets::{BLUE, RED};
use midly::{MetaMessage, MidiMessage, Smf, TrackEvent, TrackEventKind};
use tempfile::tempdir;

/// Single image with an explicit palette
#[test]
fn test_convert_png() {
    let dir = tempdir().expect("Failed to create temp dir");
    let png_path = dir.path().join("columns.png");
    let mid_path = dir.path().join("columns.mid");
    generate_test_assets::generate_two_column_png(&png_path).expect("Failed to generate PNG");

    let out = pixmid(&[
        "convert",
        png_path.to_str().unwrap(),
        "-o",
        mid_path.to_str().unwrap(),
        "--palette",
        "#ff0000,#0000ff",
        "--start-key",
        "60",
        "--end-key",
        "62",
        "--classifier",
        "exact",
        "--ticks-per-unit",
        "10",
    ]);
    assert!(out.status.success(), "pixmid convert failed: {}", stderr(&out));

    let data = std::fs::read(&mid_path).expect("Failed to read MIDI file");
    let smf = Smf::parse(&data).expect("Output is not a valid MIDI file");
    assert_eq!(smf.tracks.len(), 2);

    // Bottom rows sound first: blue on key 60, then red takes over at row 2
    assert_eq!(
        notes(&smf.tracks[0]),
        vec![(0, 61, true), (20, 60, true), (40, 60, false), (40, 61, false)]
    );
    assert_eq!(notes(&smf.tracks[1]), vec![(0, 60, true), (20, 60, false)]);
    assert_eq!(end_of_track(&smf.tracks[1]), Some(40));
}

/// Palette derived from the image itself
#[test]
fn test_convert_with_derived_palette() {
    let dir = tempdir().expect("Failed to create temp dir");
    let png_path = dir.path().join("columns.png");
    generate_test_assets::generate_two_column_png(&png_path).expect("Failed to generate PNG");

    let out = pixmid(&[
        "convert",
        png_path.to_str().unwrap(),
        "--colors",
        "2",
        "--start-key",
        "60",
        "--end-key",
        "62",
    ]);
    assert!(out.status.success(), "pixmid convert failed: {}", stderr(&out));

    // Default output sits next to the input
    let data = std::fs::read(dir.path().join("columns.mid")).expect("Failed to read MIDI file");
    let smf = Smf::parse(&data).expect("Output is not a valid MIDI file");
    assert_eq!(smf.tracks.len(), 2);
    // Red is the most frequent color, so it is track 0
    assert_eq!(notes(&smf.tracks[0]).len(), 4);
}

#[test]
fn test_convert_rejects_bad_arguments() {
    let dir = tempdir().expect("Failed to create temp dir");
    let png_path = dir.path().join("columns.png");
    generate_test_assets::generate_two_column_png(&png_path).expect("Failed to generate PNG");

    let out = pixmid(&[
        "convert",
        png_path.to_str().unwrap(),
        "--palette",
        "#ff0000",
        "--grid-split",
        "--max-note-length",
        "0",
    ]);
    assert!(!out.status.success());
}

/// Batch merge with one undecodable image in the middle
#[test]
fn test_batch_skips_broken_images() {
    let dir = tempdir().expect("Failed to create temp dir");
    generate_test_assets::generate_solid_column_png(&dir.path().join("a.png"), 3, RED)
        .expect("Failed to generate PNG");
    generate_test_assets::generate_solid_column_png(&dir.path().join("b.png"), 5, BLUE)
        .expect("Failed to generate PNG");
    std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

    let manifest_path = write_manifest(
        dir.path(),
        r##"
palette = ["#ff0000", "#0000ff"]

[output]
path = "merged.mid"

[export]
ticks_per_unit = 10

[conversion]
start_key = 60
end_key = 61
classifier = "exact"

[[images]]
path = "a.png"

[[images]]
path = "broken.png"

[[images]]
path = "b.png"
"##,
    );

    let out = pixmid(&["batch", manifest_path.to_str().unwrap()]);
    assert!(out.status.success(), "pixmid batch failed: {}", stderr(&out));

    let data = std::fs::read(dir.path().join("merged.mid")).expect("Failed to read MIDI file");
    let smf = Smf::parse(&data).expect("Output is not a valid MIDI file");
    assert_eq!(notes(&smf.tracks[0]), vec![(0, 60, true), (30, 60, false)]);
    assert_eq!(notes(&smf.tracks[1]), vec![(30, 60, true), (80, 60, false)]);
    assert_eq!(end_of_track(&smf.tracks[0]), Some(80));
    assert_eq!(annotation_ticks(&smf.tracks[1]), vec![0, 30]);
}

#[test]
fn test_batch_fails_without_usable_images() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
    let manifest_path = write_manifest(
        dir.path(),
        "palette = [\"#ff0000\"]\nimages = [\"broken.png\"]\n",
    );

    let out = pixmid(&["batch", manifest_path.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(!dir.path().join("out.mid").exists());
}

#[test]
fn test_check_manifest() {
    let dir = tempdir().expect("Failed to create temp dir");
    generate_test_assets::generate_solid_column_png(&dir.path().join("a.png"), 2, RED)
        .expect("Failed to generate PNG");

    let good = write_manifest(dir.path(), "palette_size = 2\nimages = [\"a.png\"]\n");
    let out = pixmid(&["check", good.to_str().unwrap()]);
    assert!(out.status.success(), "pixmid check failed: {}", stderr(&out));

    let both = write_manifest(
        dir.path(),
        "palette = [\"#ff0000\"]\npalette_size = 2\nimages = [\"a.png\"]\n",
    );
    assert!(!pixmid(&["check", both.to_str().unwrap()]).status.success());
}

// Helper to run the pixmid binary
fn pixmid(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pixmid"))
        .args(args)
        .output()
        .expect("Failed to run pixmid")
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn write_manifest(dir: &Path, text: &str) -> std::path::PathBuf {
    let path = dir.join("pixmid.toml");
    std::fs::write(&path, text).expect("Failed to write manifest");
    path
}

/// (absolute tick, kind) for every event in a track
fn absolute<'a>(track: &[TrackEvent<'a>]) -> Vec<(u64, TrackEventKind<'a>)> {
    let mut tick = 0u64;
    track
        .iter()
        .map(|e| {
            tick += u64::from(e.delta.as_int());
            (tick, e.kind)
        })
        .collect()
}

/// (tick, key, is_note_on) for every note event
fn notes(track: &[TrackEvent]) -> Vec<(u64, u8, bool)> {
    absolute(track)
        .into_iter()
        .filter_map(|(tick, kind)| match kind {
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } => Some((tick, key.as_int(), vel.as_int() > 0)),
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { key, .. },
                ..
            } => Some((tick, key.as_int(), false)),
            _ => None,
        })
        .collect()
}

fn end_of_track(track: &[TrackEvent]) -> Option<u64> {
    absolute(track)
        .into_iter()
        .find(|(_, kind)| matches!(kind, TrackEventKind::Meta(MetaMessage::EndOfTrack)))
        .map(|(tick, _)| tick)
}

fn annotation_ticks(track: &[TrackEvent]) -> Vec<u64> {
    absolute(track)
        .into_iter()
        .filter(|(_, kind)| matches!(kind, TrackEventKind::Meta(MetaMessage::SequencerSpecific(_))))
        .map(|(tick, _)| tick)
        .collect()
}
