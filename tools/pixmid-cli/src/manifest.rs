//! Batch manifest parsing and build orchestration
//!
//! Parses `pixmid.toml` and converts every listed image into one merged
//! sequence, one image after another in time.
//!
//! ```toml
//! palette = ["#ff0000", "#00ff00", "#0000ff"]   # or: palette_size = 8
//!
//! [output]
//! path = "song.mid"
//!
//! [export]
//! ticks_per_unit = 60
//!
//! [conversion]
//! start_key = 36
//! end_key = 96
//! resample = "area"
//!
//! [[images]]
//! path = "intro.png"
//! height = 64
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use pixmid::{BatchMerger, ConversionConfig, ConversionEngine, ExportOptions};
use serde::Deserialize;

use crate::convert::{PaletteSource, load_image, resolve_palette};

/// Root manifest structure
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub palette: Option<Vec<String>>,
    #[serde(default)]
    pub palette_size: Option<usize>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub export: ExportOptions,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("out.mid")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImageEntry {
    Simple(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        height: Option<u32>,
    },
}

impl ImageEntry {
    pub fn path(&self) -> &Path {
        match self {
            ImageEntry::Simple(p) => p,
            ImageEntry::Detailed { path, .. } => path,
        }
    }

    /// Per-image row count, overriding `conversion.target_height`
    pub fn height(&self) -> Option<u32> {
        match self {
            ImageEntry::Simple(_) => None,
            ImageEntry::Detailed { height, .. } => *height,
        }
    }
}

impl Manifest {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn palette_source(&self) -> Result<PaletteSource> {
        match (&self.palette, self.palette_size) {
            (Some(_), Some(_)) => bail!("Set either 'palette' or 'palette_size', not both"),
            (Some(colors), None) => Ok(PaletteSource::Hex(colors.clone())),
            (None, Some(size)) => Ok(PaletteSource::Frequent(size)),
            (None, None) => bail!("Manifest needs 'palette' or 'palette_size'"),
        }
    }

    /// Conversion settings for one entry
    pub fn config_for(&self, entry: &ImageEntry) -> ConversionConfig {
        ConversionConfig {
            target_height: entry.height().or(self.conversion.target_height),
            ..self.conversion.clone()
        }
    }
}

/// What a batch build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub output: PathBuf,
    pub converted: usize,
    pub skipped: usize,
    pub notes: usize,
    pub end_tick: u64,
}

/// Load and parse a manifest file
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    let mut manifest: Manifest = toml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {:?}", path))?;
    manifest.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(manifest)
}

/// Validate a manifest without building
pub fn validate(manifest: &Manifest) -> Result<()> {
    let source = manifest.palette_source()?;
    match &source {
        PaletteSource::Hex(_) => {
            resolve_palette(&source, None, manifest.conversion.alpha_threshold)?;
        }
        PaletteSource::Frequent(0) => bail!("'palette_size' must be positive"),
        PaletteSource::Frequent(_) => {}
    }

    manifest.export.validate()?;

    if manifest.images.is_empty() {
        bail!("Manifest lists no images");
    }
    for (index, entry) in manifest.images.iter().enumerate() {
        manifest
            .config_for(entry)
            .key_layout()
            .with_context(|| format!("Image {} has invalid conversion settings", index))?;
        let path = manifest.resolve(entry.path());
        if !path.exists() {
            bail!("Image {} source not found: {:?}", index, path);
        }
    }
    Ok(())
}

/// Convert every image and write the merged sequence
///
/// Images that fail to load or convert are logged and skipped.
pub fn build_all(manifest: &Manifest, output_override: Option<&Path>) -> Result<BatchSummary> {
    validate(manifest)?;
    let output = output_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest.resolve(&manifest.output.path));

    let source = manifest.palette_source()?;
    let sample = match &source {
        PaletteSource::Frequent(_) => manifest
            .images
            .iter()
            .find_map(|entry| load_image(&manifest.resolve(entry.path())).ok()),
        PaletteSource::Hex(_) => None,
    };
    let palette = Arc::new(resolve_palette(
        &source,
        sample.as_ref(),
        manifest.conversion.alpha_threshold,
    )?);
    drop(sample);
    tracing::info!("Palette: {} colors", palette.len());

    let mut merger = BatchMerger::new(&palette, &manifest.export)?;
    let mut skipped = 0;
    let mut notes = 0;

    for entry in &manifest.images {
        let path = manifest.resolve(entry.path());
        let converted = load_image(&path).and_then(|image| {
            let engine = ConversionEngine::new(Arc::clone(&palette), image, manifest.config_for(entry))?;
            let result = engine.convert()?;
            merger.push(&result)?;
            Ok(result)
        });

        match converted {
            Ok(result) => {
                notes += result.note_count();
                tracing::info!(
                    "Converted {:?}: {} notes over {} rows",
                    path,
                    result.note_count(),
                    result.height()
                );
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!("Skipping {:?}: {:#}", path, e);
            }
        }
    }

    if merger.slots() == 0 {
        bail!("No images could be converted");
    }

    let sequence = merger.finish();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    sequence
        .save(&output)
        .with_context(|| format!("Failed to write {:?}", output))?;

    Ok(BatchSummary {
        output,
        converted: sequence.slots(),
        skipped,
        notes,
        end_tick: sequence.end_tick(),
    })
}
