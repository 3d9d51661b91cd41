//! Column-to-key mapping
//!
//! Each image column becomes one key. The layout decides which key a column
//! plays and whether it plays at all.
//!
//! - `All`: every key in `start..end`
//! - `*Fixed`: one column per key in `start..end`; columns whose key has the
//!   wrong color stay silent
//! - `*Clipped`: only keys of the chosen color get columns, so the image is
//!   resampled to fewer columns

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConversionError;

/// Highest 7-bit key number
pub const MAX_KEY: u8 = 127;

/// Key color filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyFilter {
    #[default]
    All,
    WhiteFixed,
    BlackFixed,
    WhiteClipped,
    BlackClipped,
}

impl KeyFilter {
    /// Combine the four mutually exclusive layout flags
    pub fn from_flags(
        white_fixed: bool,
        black_fixed: bool,
        white_clipped: bool,
        black_clipped: bool,
    ) -> Result<Self, ConversionError> {
        match (white_fixed, black_fixed, white_clipped, black_clipped) {
            (false, false, false, false) => Ok(KeyFilter::All),
            (true, false, false, false) => Ok(KeyFilter::WhiteFixed),
            (false, true, false, false) => Ok(KeyFilter::BlackFixed),
            (false, false, true, false) => Ok(KeyFilter::WhiteClipped),
            (false, false, false, true) => Ok(KeyFilter::BlackClipped),
            _ => Err(ConversionError::InvalidArgument(
                "at most one white/black key filter may be set".into(),
            )),
        }
    }

    pub fn accepts(self, key: u8) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::WhiteFixed | KeyFilter::WhiteClipped => is_white_key(key),
            KeyFilter::BlackFixed | KeyFilter::BlackClipped => !is_white_key(key),
        }
    }

    pub fn is_clipped(self) -> bool {
        matches!(self, KeyFilter::WhiteClipped | KeyFilter::BlackClipped)
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyFilter::All => "all",
            KeyFilter::WhiteFixed => "white-fixed",
            KeyFilter::BlackFixed => "black-fixed",
            KeyFilter::WhiteClipped => "white-clipped",
            KeyFilter::BlackClipped => "black-clipped",
        }
    }
}

impl fmt::Display for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyFilter {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        [
            KeyFilter::All,
            KeyFilter::WhiteFixed,
            KeyFilter::BlackFixed,
            KeyFilter::WhiteClipped,
            KeyFilter::BlackClipped,
        ]
        .into_iter()
        .find(|f| f.name() == lower)
        .ok_or_else(|| ConversionError::InvalidArgument(format!("unknown key filter: {s}")))
    }
}

/// True for the naturals (C D E F G A B)
pub fn is_white_key(key: u8) -> bool {
    matches!(key % 12, 0 | 2 | 4 | 5 | 7 | 9 | 11)
}

/// Resolved per-column keys; `None` marks a silent column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    columns: Vec<Option<u8>>,
}

impl KeyLayout {
    /// Resolve a layout from a key range, an optional explicit key list and a filter
    ///
    /// With an explicit list, column `j` plays `list[j]`. Clipped filters drop
    /// keys of the wrong color from the list first.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the range is empty or exceeds 7 bits, a listed key
    /// exceeds 127, the layout has no columns, or the explicit list is shorter
    /// than the active width.
    pub fn build(
        start_key: u8,
        end_key: u8,
        filter: KeyFilter,
        key_list: Option<&[u8]>,
    ) -> Result<Self, ConversionError> {
        if start_key >= end_key || end_key > MAX_KEY + 1 {
            return Err(ConversionError::InvalidArgument(format!(
                "key range {start_key}..{end_key} must be non-empty and within 0..=128"
            )));
        }

        let range = start_key..end_key;
        let width = if filter.is_clipped() {
            range.clone().filter(|&k| filter.accepts(k)).count()
        } else {
            range.len()
        };
        if width == 0 {
            return Err(ConversionError::InvalidArgument(format!(
                "no {filter:?} keys in {start_key}..{end_key}"
            )));
        }

        let columns = match key_list {
            Some(list) => {
                if let Some(&bad) = list.iter().find(|&&k| k > MAX_KEY) {
                    return Err(ConversionError::InvalidArgument(format!(
                        "key {bad} exceeds {MAX_KEY}"
                    )));
                }
                let keys: Vec<u8> = if filter.is_clipped() {
                    list.iter().copied().filter(|&k| filter.accepts(k)).collect()
                } else {
                    list.to_vec()
                };
                if keys.len() < width {
                    return Err(ConversionError::InvalidArgument(format!(
                        "key list has {} usable keys but the layout needs {width}",
                        keys.len()
                    )));
                }
                keys[..width]
                    .iter()
                    .map(|&k| filter.accepts(k).then_some(k))
                    .collect()
            }
            None if filter.is_clipped() => range.filter(|&k| filter.accepts(k)).map(Some).collect(),
            None => range.map(|k| filter.accepts(k).then_some(k)).collect(),
        };

        Ok(Self { columns })
    }

    /// Number of image columns
    pub fn width(&self) -> u32 {
        self.columns.len() as u32
    }

    #[inline]
    pub fn key(&self, column: u32) -> Option<u8> {
        self.columns[column as usize]
    }

    pub fn columns(&self) -> &[Option<u8>] {
        &self.columns
    }

    /// Columns that can open notes
    pub fn active_count(&self) -> usize {
        self.columns.iter().filter(|k| k.is_some()).count()
    }
}
