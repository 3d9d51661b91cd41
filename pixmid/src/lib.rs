//! Pixel-to-note conversion
//!
//! Turns a raster image into a multi-track note sequence:
//!
//! - [`palette`]: the ordered colors; color `i` becomes track `i`
//! - [`classify`]: pixel to palette index
//! - [`keys`]: image column to key
//! - [`engine`]: resample, classify and scan one image on a worker thread
//! - [`export`]: merge results and write a standard MIDI file
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pixmid::{ConversionConfig, ConversionEngine, ExportOptions, Palette, PixelGrid, single_sequence};
//!
//! let palette = Arc::new(Palette::from_hex(&["#ff0000", "#0000ff"])?);
//! let image = PixelGrid::filled(88, 64, [255, 0, 0, 255])?;
//! let engine = ConversionEngine::new(Arc::clone(&palette), image, ConversionConfig::default())?;
//! let result = engine.convert()?;
//! single_sequence(&result, &palette, &ExportOptions::default())?.save("out.mid")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod keys;
pub mod palette;

pub use classify::{
    Classifier, ClassifierMethod, ColorIndexGrid, ExactClassifier, Metric, NearestClassifier,
    classify_grid,
};
pub use config::{ConversionConfig, DEFAULT_ALPHA_THRESHOLD, NoteLengthPolicy};
pub use engine::{ConversionEngine, ConversionState, Progress, ProgressFn, RunOutcome, Stage};
pub use error::{ConversionError, ExportError, PaletteError};
pub use events::{ConversionResult, EventBuffer, EventKind, Note, NoteEvent};
pub use export::{
    BatchMerger, ColorAnnotation, ExportOptions, MergedSequence, SequenceEvent, TimedEvent,
    merge_batch, single_sequence,
};
pub use keys::{KeyFilter, KeyLayout, is_white_key};
pub use palette::{Color, MAX_PALETTE_LEN, Palette};

pub use pixmid_resample::{PixelGrid, ResizeAlgorithm};
