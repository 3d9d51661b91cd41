//! Color classification: pixel -> palette index
//!
//! The engine treats the classifier as a black box. It must be pure: the same
//! RGB triple always maps to the same index for a given palette.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hashbrown::HashMap;
use pixmid_resample::PixelGrid;
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::ConversionError;
use crate::palette::Palette;

/// Maps an RGB triple to a palette index, or `None` for "no match"
pub trait Classifier: Send + Sync {
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<usize>;
}

impl<F> Classifier for F
where
    F: Fn(u8, u8, u8) -> Option<usize> + Send + Sync,
{
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<usize> {
        self(r, g, b)
    }
}

/// Built-in classifier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierMethod {
    /// Exact RGB match only
    Exact,
    /// Nearest color by Euclidean RGB distance
    #[default]
    Euclidean,
    /// Nearest color by the red-mean weighted distance
    Redmean,
}

impl ClassifierMethod {
    pub fn name(self) -> &'static str {
        match self {
            ClassifierMethod::Exact => "exact",
            ClassifierMethod::Euclidean => "euclidean",
            ClassifierMethod::Redmean => "redmean",
        }
    }

    /// Instantiate the classifier for a palette
    pub fn build(self, palette: &Palette) -> Arc<dyn Classifier> {
        match self {
            ClassifierMethod::Exact => Arc::new(ExactClassifier::new(palette)),
            ClassifierMethod::Euclidean => Arc::new(NearestClassifier::new(palette, Metric::Euclidean)),
            ClassifierMethod::Redmean => Arc::new(NearestClassifier::new(palette, Metric::Redmean)),
        }
    }
}

impl fmt::Display for ClassifierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassifierMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(ClassifierMethod::Exact),
            "euclidean" => Ok(ClassifierMethod::Euclidean),
            "redmean" => Ok(ClassifierMethod::Redmean),
            other => Err(ConversionError::InvalidArgument(format!(
                "unknown classifier: {other}"
            ))),
        }
    }
}

// =============================================================================
// Built-in classifiers
// =============================================================================

/// Hash lookup of exact RGB values
pub struct ExactClassifier {
    lookup: HashMap<[u8; 3], usize>,
}

impl ExactClassifier {
    pub fn new(palette: &Palette) -> Self {
        let mut lookup = HashMap::with_capacity(palette.len());
        for (i, c) in palette.iter().enumerate() {
            // Colors differing only in alpha resolve to the first one
            lookup.entry([c.r, c.g, c.b]).or_insert(i);
        }
        Self { lookup }
    }
}

impl Classifier for ExactClassifier {
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<usize> {
        self.lookup.get(&[r, g, b]).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Euclidean,
    Redmean,
}

impl Metric {
    fn distance(self, a: [i32; 3], b: [i32; 3]) -> i32 {
        let dr = a[0] - b[0];
        let dg = a[1] - b[1];
        let db = a[2] - b[2];
        match self {
            Metric::Euclidean => dr * dr + dg * dg + db * db,
            Metric::Redmean => {
                let rmean = (a[0] + b[0]) / 2;
                (((512 + rmean) * dr * dr) >> 8) + 4 * dg * dg + (((767 - rmean) * db * db) >> 8)
            }
        }
    }
}

/// Nearest palette color; ties go to the lower index
pub struct NearestClassifier {
    colors: Vec<[i32; 3]>,
    metric: Metric,
}

impl NearestClassifier {
    pub fn new(palette: &Palette, metric: Metric) -> Self {
        let colors = palette
            .iter()
            .map(|c| [c.r as i32, c.g as i32, c.b as i32])
            .collect();
        Self { colors, metric }
    }
}

impl Classifier for NearestClassifier {
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<usize> {
        let px = [r as i32, g as i32, b as i32];
        self.colors
            .iter()
            .enumerate()
            .min_by_key(|&(i, &c)| (self.metric.distance(px, c), i))
            .map(|(i, _)| i)
    }
}

// =============================================================================
// Index grid
// =============================================================================

/// Per-pixel track index (`None` = transparent or unmatched)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorIndexGrid {
    width: u32,
    height: u32,
    cells: Vec<Option<u16>>,
}

impl ColorIndexGrid {
    pub(crate) fn from_cells(width: u32, height: u32, cells: Vec<Option<u16>>) -> Self {
        debug_assert_eq!(cells.len(), width as usize * height as usize);
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        self.cells[y as usize * self.width as usize + x as usize]
    }
}

/// Classify every pixel, one row per parallel work unit
///
/// Pixels with alpha below `alpha_threshold` map to `None` without calling
/// the classifier.
///
/// # Errors
///
/// `RuntimeFailure` if the classifier returns an index outside the palette.
pub fn classify_grid(
    grid: &PixelGrid,
    classifier: &dyn Classifier,
    palette_len: usize,
    alpha_threshold: u8,
) -> Result<ColorIndexGrid, ConversionError> {
    let width = grid.width() as usize;
    let mut cells = vec![None; width * grid.height() as usize];

    cells
        .par_chunks_mut(width)
        .enumerate()
        .try_for_each(|(y, row)| {
            let src = grid.row(y as u32);
            for (cell, px) in row.iter_mut().zip(src.chunks_exact(4)) {
                if px[3] < alpha_threshold {
                    continue;
                }
                *cell = match classifier.classify(px[0], px[1], px[2]) {
                    Some(i) if i < palette_len => Some(i as u16),
                    Some(i) => {
                        return Err(ConversionError::RuntimeFailure(format!(
                            "classifier returned track {i} for a palette of {palette_len}"
                        )));
                    }
                    None => None,
                };
            }
            Ok(())
        })?;

    Ok(ColorIndexGrid::from_cells(grid.width(), grid.height(), cells))
}
