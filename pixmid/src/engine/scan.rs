//! Sequential transition scan
//!
//! Rows are consumed bottom to top: image row `height - 1` is tick 0 and row 0
//! is the last tick. This direction is part of the output contract (the image
//! scrolls upward over time), so it must not be flipped.

use crate::classify::ColorIndexGrid;
use crate::config::NoteLengthPolicy;
use crate::events::{EventBuffer, EventKind};
use crate::keys::KeyLayout;

/// Open-note state of one column
#[derive(Debug, Clone, Copy, Default)]
struct Column {
    open: Option<u16>,
    opened_at: u32,
}

impl Column {
    fn opened_at(&self) -> Option<u32> {
        self.open.map(|_| self.opened_at)
    }
}

/// Scan the index grid into one event buffer per track
///
/// `on_row` runs after every row with the number of rows done; returning
/// false stops the scan and discards the buffers.
pub(crate) fn scan(
    grid: &ColorIndexGrid,
    layout: &KeyLayout,
    policy: NoteLengthPolicy,
    track_count: usize,
    mut on_row: impl FnMut(u32) -> bool,
) -> Option<Vec<EventBuffer>> {
    debug_assert_eq!(grid.width(), layout.width());

    let height = grid.height();
    let mut tracks: Vec<EventBuffer> = (0..track_count).map(EventBuffer::new).collect();
    let mut columns = vec![Column::default(); layout.width() as usize];

    for tick in 0..height {
        let y = height - 1 - tick;

        for (x, column) in columns.iter_mut().enumerate() {
            let Some(key) = layout.key(x as u32) else {
                continue;
            };
            let value = grid.get(x as u32, y);
            let forced = policy.forces_split(tick, column.opened_at());

            if value == column.open && !forced {
                continue;
            }
            if let Some(track) = column.open {
                tracks[track as usize].push(EventKind::NoteOff, key, tick);
            }
            if let Some(track) = value {
                tracks[track as usize].push(EventKind::NoteOn, key, tick);
                column.opened_at = tick;
            }
            column.open = value;
        }

        if !on_row(tick + 1) {
            return None;
        }
    }

    // Close everything still sounding at the final tick
    for (x, column) in columns.iter().enumerate() {
        if let (Some(track), Some(key)) = (column.open, layout.key(x as u32)) {
            tracks[track as usize].push(EventKind::NoteOff, key, height);
        }
    }

    Some(tracks)
}
