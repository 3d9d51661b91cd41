//! Per-track event buffers and the derived note view
//!
//! Ticks here are scan rows: the bottom image row is tick 0. The serializer
//! scales them to file ticks.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
}

/// One timed event in a track buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: EventKind,
    pub key: u8,
    /// Absolute row tick
    pub tick: u32,
    /// Ticks since the previous event in the same track
    pub delta: u32,
}

/// Append-only, tick-ordered events for one palette color
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBuffer {
    track: usize,
    events: Vec<NoteEvent>,
    last_tick: u32,
}

impl EventBuffer {
    pub(crate) fn new(track: usize) -> Self {
        Self {
            track,
            events: Vec::new(),
            last_tick: 0,
        }
    }

    /// Append an event; ticks never go backwards within a track
    pub(crate) fn push(&mut self, kind: EventKind, key: u8, tick: u32) {
        debug_assert!(tick >= self.last_tick, "track {} went back in time", self.track);
        self.events.push(NoteEvent {
            kind,
            key,
            tick,
            delta: tick - self.last_tick,
        });
        self.last_tick = tick;
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tick of the most recent event (0 if empty)
    pub fn last_tick(&self) -> u32 {
        self.last_tick
    }

    /// Pair NoteOn/NoteOff per key, in order of note start
    ///
    /// When several columns share a key, offs close the oldest open note first.
    pub fn notes(&self) -> Vec<Note> {
        let mut open: Vec<VecDeque<u32>> = vec![VecDeque::new(); 128];
        let mut notes = Vec::with_capacity(self.events.len() / 2);

        for ev in &self.events {
            let pending = &mut open[(ev.key & 0x7F) as usize];
            match ev.kind {
                EventKind::NoteOn => pending.push_back(ev.tick),
                EventKind::NoteOff => {
                    if let Some(start) = pending.pop_front() {
                        notes.push(Note {
                            track: self.track,
                            key: ev.key,
                            start,
                            end: ev.tick,
                        });
                    }
                }
            }
        }

        notes.sort_by_key(|n| (n.start, n.key));
        notes
    }
}

/// A sounding note reconstructed from a NoteOn/NoteOff pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub track: usize,
    pub key: u8,
    pub start: u32,
    pub end: u32,
}

impl Note {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Final, read-only output of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    width: u32,
    height: u32,
    tracks: Vec<EventBuffer>,
}

impl ConversionResult {
    pub(crate) fn new(width: u32, height: u32, tracks: Vec<EventBuffer>) -> Self {
        Self {
            width,
            height,
            tracks,
        }
    }

    /// Columns scanned
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Rows scanned; also the tick of the closing NoteOffs
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tracks(&self) -> &[EventBuffer] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&EventBuffer> {
        self.tracks.get(index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(EventBuffer::len).sum()
    }

    /// All notes of all tracks, ordered by track then start
    pub fn notes(&self) -> Vec<Note> {
        self.tracks.iter().flat_map(EventBuffer::notes).collect()
    }

    pub fn note_count(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| t.events.iter().filter(|e| e.kind == EventKind::NoteOn).count())
            .sum()
    }
}
