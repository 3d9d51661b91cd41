//! Single-image conversion
//!
//! Loads an image with the `image` crate, resolves the palette and runs the
//! engine on its worker thread, logging progress as it goes.

use std::path::Path;
use std::sync::{Arc, mpsc};

use anyhow::{Context, Result, bail};
use pixmid::{
    ConversionConfig, ConversionEngine, ExportOptions, Palette, PixelGrid, Progress, ProgressFn,
    RunOutcome, single_sequence,
};

/// Where the palette comes from
#[derive(Debug, Clone, PartialEq)]
pub enum PaletteSource {
    /// Explicit `#rrggbb` / `#rrggbbaa` list
    Hex(Vec<String>),
    /// The N most frequent visible colors of a sample image
    Frequent(usize),
}

/// Everything needed to convert one image
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub palette: PaletteSource,
    pub config: ConversionConfig,
    pub export: ExportOptions,
}

/// What a finished conversion produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    pub tracks: usize,
    pub notes: usize,
    pub end_tick: u64,
}

/// Decode any supported image into RGBA8
pub fn load_image(path: &Path) -> Result<PixelGrid> {
    let img = image::open(path).with_context(|| format!("Failed to load image: {:?}", path))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let grid = PixelGrid::from_rgba(width, height, rgba.into_raw())
        .with_context(|| format!("Unusable image dimensions: {:?}", path))?;
    Ok(grid)
}

/// Build the palette; frequency palettes need a sample image
pub fn resolve_palette(
    source: &PaletteSource,
    sample: Option<&PixelGrid>,
    alpha_threshold: u8,
) -> Result<Palette> {
    let palette = match source {
        PaletteSource::Hex(values) => Palette::from_hex(values.as_slice())?,
        PaletteSource::Frequent(0) => bail!("Palette size must be positive"),
        PaletteSource::Frequent(count) => {
            let sample = sample.context("A sample image is needed to derive the palette")?;
            Palette::from_frequent_colors(sample, *count, alpha_threshold)?
        }
    };
    Ok(palette)
}

fn log_progress() -> ProgressFn {
    Box::new(|p: Progress| {
        tracing::debug!(stage = ?p.stage, "{:.0}%", p.fraction * 100.0);
    })
}

/// Convert `input` and write a standard MIDI file to `output`
pub fn convert_image(input: &Path, output: &Path, request: &ConvertRequest) -> Result<ConvertSummary> {
    let image = load_image(input)?;
    tracing::info!(
        "Loaded {:?} ({}x{})",
        input,
        image.width(),
        image.height()
    );

    let palette = Arc::new(resolve_palette(
        &request.palette,
        Some(&image),
        request.config.alpha_threshold,
    )?);
    tracing::info!("Palette: {} colors", palette.len());

    let engine = ConversionEngine::new(Arc::clone(&palette), image, request.config.clone())?;
    let (tx, rx) = mpsc::channel();
    engine.run(
        move |outcome| {
            let _ = tx.send(outcome);
        },
        Some(log_progress()),
        true,
    )?;

    let result = match rx.recv().context("Conversion thread exited without a result")? {
        RunOutcome::Completed(result) => result,
        RunOutcome::Cancelled => bail!("Conversion of {:?} was cancelled", input),
        RunOutcome::Failed(e) => {
            return Err(e).with_context(|| format!("Failed to convert {:?}", input));
        }
    };

    let sequence = single_sequence(&result, &palette, &request.export)?;
    sequence
        .save(output)
        .with_context(|| format!("Failed to write {:?}", output))?;

    Ok(ConvertSummary {
        tracks: sequence.track_count(),
        notes: result.note_count(),
        end_tick: sequence.end_tick(),
    })
}
