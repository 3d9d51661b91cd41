//! Palette: the ordered color list that defines the output tracks
//!
//! Track `i` of every conversion result carries the notes of palette color `i`.

use std::fmt;
use std::str::FromStr;

use hashbrown::{HashMap, HashSet};
use pixmid_resample::PixelGrid;

use crate::error::{ConversionError, PaletteError};

/// Maximum palette size (the file header stores the track count as u16)
pub const MAX_PALETTE_LEN: usize = u16::MAX as usize;

/// RGBA8 color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[u8; 4]> for Color {
    fn from(v: [u8; 4]) -> Self {
        Self::rgba(v[0], v[1], v[2], v[3])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = PaletteError;

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PaletteError::InvalidHex(s.to_string()));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| PaletteError::InvalidHex(s.to_string()))
        };
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, a))
    }
}

/// Ordered, deduplicated, non-empty color list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    /// Build a palette, dropping repeated colors (first occurrence wins)
    ///
    /// # Errors
    ///
    /// `InvalidPalette` if no colors remain or there are more than
    /// [`MAX_PALETTE_LEN`].
    pub fn new(colors: impl IntoIterator<Item = Color>) -> Result<Self, ConversionError> {
        let mut seen = HashSet::new();
        let unique: Vec<Color> = colors.into_iter().filter(|c| seen.insert(*c)).collect();
        if unique.is_empty() {
            return Err(ConversionError::InvalidPalette("palette is empty".into()));
        }
        if unique.len() > MAX_PALETTE_LEN {
            return Err(ConversionError::InvalidPalette(format!(
                "{} colors (max {})",
                unique.len(),
                MAX_PALETTE_LEN
            )));
        }
        Ok(Self { colors: unique })
    }

    /// Parse a list of hex strings
    pub fn from_hex<S: AsRef<str>>(values: &[S]) -> Result<Self, ConversionError> {
        let colors = values
            .iter()
            .map(|s| s.as_ref().parse::<Color>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConversionError::InvalidPalette(e.to_string()))?;
        Self::new(colors)
    }

    /// The `max_colors` most frequent visible colors of a grid
    ///
    /// Exact-color frequency only; ties keep the color seen first in row-major
    /// order. Pixels with alpha below `alpha_threshold` are ignored.
    pub fn from_frequent_colors(
        grid: &PixelGrid,
        max_colors: usize,
        alpha_threshold: u8,
    ) -> Result<Self, ConversionError> {
        let mut counts: HashMap<[u8; 3], (usize, usize)> = HashMap::new();
        for (order, px) in grid.as_bytes().chunks_exact(4).enumerate() {
            if px[3] < alpha_threshold {
                continue;
            }
            let entry = counts.entry([px[0], px[1], px[2]]).or_insert((0, order));
            entry.0 += 1;
        }

        let mut ranked: Vec<([u8; 3], (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
        ranked.truncate(max_colors.min(MAX_PALETTE_LEN));

        Self::new(ranked.into_iter().map(|(c, _)| Color::rgb(c[0], c[1], c[2])))
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Never true for a constructed palette
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Color> {
        self.colors.get(index).copied()
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn iter(&self) -> impl Iterator<Item = Color> + '_ {
        self.colors.iter().copied()
    }
}
