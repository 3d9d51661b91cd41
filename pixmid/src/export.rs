//! Multi-track sequence export
//!
//! Completed conversion results are turned into absolute-tick event lists
//! (one per palette color), optionally concatenated across images, and
//! written as a format 1 standard MIDI file.
//!
//! Track layout of the written file:
//! - track `i` holds the events of palette color `i` on channel `i % 16`
//! - track 0 starts with the tempo
//! - each image slot may start with a color annotation (sequencer-specific
//!   meta event) so the palette survives a round trip
//! - every track ends with End of Track at the sequence end

use std::fmt::Display;
use std::path::Path;

use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ExportError;
use crate::events::{ConversionResult, EventKind};
use crate::palette::{Color, Palette};

/// Largest delta time a file can encode (28-bit variable length quantity)
pub const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Manufacturer ID reserved for non-commercial use
pub const ANNOTATION_ID: u8 = 0x7D;

// ============================================================================
// Options
// ============================================================================

/// Timing and velocity of the written file
///
/// Track `n` plays on MIDI channel `n % 16`. With more than 16 colors,
/// tracks share channels, so a NoteOff on one track also ends the same key
/// sounding on another track of that channel during playback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Pulses per quarter note
    pub ppq: u16,
    pub tempo_bpm: f64,
    /// File ticks per scanned row
    pub ticks_per_unit: u32,
    /// Fixed NoteOn velocity
    pub velocity: u8,
    /// Emit a color annotation at the start of each track slot
    pub annotate_colors: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            ppq: 480,
            tempo_bpm: 120.0,
            ticks_per_unit: 120,
            velocity: 100,
            annotate_colors: true,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.ppq == 0 || self.ppq > 0x7FFF {
            return Err(ExportError::InvalidOptions(format!(
                "ppq must be in 1..=32767, got {}",
                self.ppq
            )));
        }
        if self.velocity == 0 || self.velocity > 127 {
            return Err(ExportError::InvalidOptions(format!(
                "velocity must be in 1..=127, got {}",
                self.velocity
            )));
        }
        if self.ticks_per_unit == 0 {
            return Err(ExportError::InvalidOptions(
                "ticks_per_unit must be positive".into(),
            ));
        }
        self.micros_per_quarter().map(|_| ())
    }

    /// Tempo as stored in the file
    pub fn micros_per_quarter(&self) -> Result<u32, ExportError> {
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(ExportError::InvalidOptions(format!(
                "tempo must be positive, got {}",
                self.tempo_bpm
            )));
        }
        let micros = (60_000_000.0 / self.tempo_bpm).round();
        if !(1.0..=f64::from(0x00FF_FFFF)).contains(&micros) {
            return Err(ExportError::InvalidOptions(format!(
                "tempo {} bpm is outside the representable range",
                self.tempo_bpm
            )));
        }
        Ok(micros as u32)
    }
}

// ============================================================================
// Sequence model
// ============================================================================

/// Color of a track, as written into the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAnnotation {
    bytes: [u8; 7],
}

impl ColorAnnotation {
    pub fn new(track: u16, color: Color) -> Self {
        let [hi, lo] = track.to_be_bytes();
        Self {
            bytes: [ANNOTATION_ID, hi, lo, color.r, color.g, color.b, color.a],
        }
    }

    /// Decode a sequencer-specific payload written by [`Self::new`]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let bytes: [u8; 7] = payload.try_into().ok()?;
        (bytes[0] == ANNOTATION_ID).then_some(Self { bytes })
    }

    pub fn track(&self) -> u16 {
        u16::from_be_bytes([self.bytes[1], self.bytes[2]])
    }

    pub fn color(&self) -> Color {
        Color::rgba(self.bytes[3], self.bytes[4], self.bytes[5], self.bytes[6])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    NoteOn { key: u8 },
    NoteOff { key: u8 },
    Annotation(ColorAnnotation),
}

/// Event at an absolute file tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: u64,
    pub event: SequenceEvent,
}

/// Per-track absolute-tick events ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSequence {
    tracks: Vec<Vec<TimedEvent>>,
    end_tick: u64,
    slots: usize,
    options: ExportOptions,
}

impl MergedSequence {
    pub fn tracks(&self) -> &[Vec<TimedEvent>] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// File tick at which every track ends
    pub fn end_tick(&self) -> u64 {
        self.end_tick
    }

    /// Number of conversion results merged in
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Encode as a format 1 standard MIDI file
    pub fn to_smf_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let micros = self.options.micros_per_quarter()?;
        let velocity = u7::new(self.options.velocity);
        let header = Header::new(Format::Parallel, Timing::Metrical(u15::new(self.options.ppq)));
        let mut smf = Smf::new(header);

        for (index, events) in self.tracks.iter().enumerate() {
            let channel = u4::new((index % 16) as u8);
            let mut track = Vec::with_capacity(events.len() + 2);
            let mut last = 0u64;

            if index == 0 {
                track.push(TrackEvent {
                    delta: u28::new(0),
                    kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros))),
                });
            }

            for timed in events {
                let delta = delta_since(&mut last, timed.tick)?;
                let kind = match &timed.event {
                    SequenceEvent::NoteOn { key } => TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOn {
                            key: u7::new(*key),
                            vel: velocity,
                        },
                    },
                    SequenceEvent::NoteOff { key } => TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOff {
                            key: u7::new(*key),
                            vel: u7::new(0),
                        },
                    },
                    SequenceEvent::Annotation(annotation) => {
                        TrackEventKind::Meta(MetaMessage::SequencerSpecific(annotation.as_bytes()))
                    }
                };
                track.push(TrackEvent { delta, kind });
            }

            track.push(TrackEvent {
                delta: delta_since(&mut last, self.end_tick)?,
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }

        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)?;
        debug!(
            tracks = self.tracks.len(),
            end_tick = self.end_tick,
            bytes = bytes.len(),
            "encoded sequence"
        );
        Ok(bytes)
    }

    /// Encode and write to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let bytes = self.to_smf_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn delta_since(last: &mut u64, tick: u64) -> Result<u28, ExportError> {
    debug_assert!(tick >= *last);
    let delta = tick - *last;
    if delta > MAX_DELTA {
        return Err(ExportError::DeltaOverflow(delta));
    }
    *last = tick;
    Ok(u28::new(delta as u32))
}

fn check_tracks(result: &ConversionResult, palette_len: usize) -> Result<(), ExportError> {
    if result.track_count() != palette_len {
        return Err(ExportError::TrackCountMismatch {
            expected: palette_len,
            found: result.track_count(),
        });
    }
    Ok(())
}

fn note_event(kind: EventKind, key: u8) -> SequenceEvent {
    match kind {
        EventKind::NoteOn => SequenceEvent::NoteOn { key },
        EventKind::NoteOff => SequenceEvent::NoteOff { key },
    }
}

// ============================================================================
// Single export
// ============================================================================

/// Sequence for one conversion result
///
/// Track buffers are already tick ordered, so deltas are only rescaled.
pub fn single_sequence(
    result: &ConversionResult,
    palette: &Palette,
    options: &ExportOptions,
) -> Result<MergedSequence, ExportError> {
    options.validate()?;
    check_tracks(result, palette.len())?;

    let scale = u64::from(options.ticks_per_unit);
    let tracks = result
        .tracks()
        .iter()
        .zip(palette.iter())
        .map(|(buffer, color)| {
            let mut events = Vec::with_capacity(buffer.len() + 1);
            if options.annotate_colors {
                events.push(TimedEvent {
                    tick: 0,
                    event: SequenceEvent::Annotation(ColorAnnotation::new(
                        buffer.track() as u16,
                        color,
                    )),
                });
            }
            let mut tick = 0u64;
            for ev in buffer.events() {
                tick += u64::from(ev.delta) * scale;
                events.push(TimedEvent {
                    tick,
                    event: note_event(ev.kind, ev.key),
                });
            }
            events
        })
        .collect();

    Ok(MergedSequence {
        tracks,
        end_tick: u64::from(result.height()) * scale,
        slots: 1,
        options: options.clone(),
    })
}

// ============================================================================
// Batch merge
// ============================================================================

/// Concatenates conversion results in time, one image after another
///
/// Results are consumed one at a time so their engines can be dropped as soon
/// as they are merged.
#[derive(Debug, Clone)]
pub struct BatchMerger {
    colors: Vec<Color>,
    options: ExportOptions,
    tracks: Vec<Vec<TimedEvent>>,
    offset: u64,
    slots: usize,
}

impl BatchMerger {
    pub fn new(palette: &Palette, options: &ExportOptions) -> Result<Self, ExportError> {
        options.validate()?;
        Ok(Self {
            colors: palette.colors().to_vec(),
            options: options.clone(),
            tracks: vec![Vec::new(); palette.len()],
            offset: 0,
            slots: 0,
        })
    }

    /// Append one result at the current offset
    ///
    /// On error the merger is left unchanged.
    pub fn push(&mut self, result: &ConversionResult) -> Result<(), ExportError> {
        check_tracks(result, self.colors.len())?;
        let scale = u64::from(self.options.ticks_per_unit);

        for (buffer, events) in result.tracks().iter().zip(self.tracks.iter_mut()) {
            if self.options.annotate_colors {
                let track = buffer.track();
                events.push(TimedEvent {
                    tick: self.offset,
                    event: SequenceEvent::Annotation(ColorAnnotation::new(
                        track as u16,
                        self.colors[track],
                    )),
                });
            }
            events.extend(buffer.events().iter().map(|ev| TimedEvent {
                tick: self.offset + u64::from(ev.tick) * scale,
                event: note_event(ev.kind, ev.key),
            }));
        }

        self.offset += u64::from(result.height()) * scale;
        self.slots += 1;
        Ok(())
    }

    /// File tick where the next result will start
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Sort each track by tick (stable, so same-tick events keep push order)
    pub fn finish(mut self) -> MergedSequence {
        for events in &mut self.tracks {
            events.sort_by_key(|e| e.tick);
        }
        MergedSequence {
            tracks: self.tracks,
            end_tick: self.offset,
            slots: self.slots,
            options: self.options,
        }
    }
}

/// Merge a batch, skipping items that failed or do not fit the palette
pub fn merge_batch<I, E>(
    palette: &Palette,
    options: &ExportOptions,
    results: I,
) -> Result<MergedSequence, ExportError>
where
    I: IntoIterator<Item = Result<std::sync::Arc<ConversionResult>, E>>,
    E: Display,
{
    let mut merger = BatchMerger::new(palette, options)?;
    for (index, item) in results.into_iter().enumerate() {
        let merged = match item {
            Ok(result) => merger.push(&result).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = merged {
            warn!(item = index, error = %e, "skipping batch item");
        }
    }
    Ok(merger.finish())
}
