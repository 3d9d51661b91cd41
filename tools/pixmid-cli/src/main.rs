//! pixmid - image to MIDI converter
//!
//! Scans images row by row and writes one MIDI track per palette color.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pixmid::{
    ClassifierMethod, ConversionConfig, DEFAULT_ALPHA_THRESHOLD, ExportOptions, KeyFilter,
    NoteLengthPolicy, ResizeAlgorithm,
};
use pixmid_cli::{ConvertRequest, PaletteSource, convert, manifest};

#[derive(Parser)]
#[command(name = "pixmid")]
#[command(about = "Convert images into multi-track MIDI files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single image
    Convert(ConvertArgs),

    /// Convert every image of a manifest into one merged file
    Batch {
        /// Path to pixmid.toml manifest
        #[arg(default_value = "pixmid.toml")]
        manifest: PathBuf,

        /// Output file (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate manifest without converting
    Check {
        /// Path to pixmid.toml manifest
        #[arg(default_value = "pixmid.toml")]
        manifest: PathBuf,
    },
}

#[derive(Args)]
struct ConvertArgs {
    /// Input image (PNG/JPEG)
    input: PathBuf,

    /// Output .mid file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Palette colors, comma separated (e.g. "#ff0000,#0000ff")
    #[arg(short, long, value_delimiter = ',')]
    palette: Vec<String>,

    /// Derive the palette from the N most frequent colors instead
    #[arg(long, default_value_t = 8, conflicts_with = "palette")]
    colors: usize,

    /// First key of the range
    #[arg(long, default_value_t = 21)]
    start_key: u8,

    /// One past the last key of the range
    #[arg(long, default_value_t = 109)]
    end_key: u8,

    /// Explicit key per column, comma separated
    #[arg(long, value_delimiter = ',')]
    key_list: Vec<u8>,

    /// Key filter: all, white-fixed, black-fixed, white-clipped, black-clipped
    #[arg(long, default_value_t = KeyFilter::All)]
    keys: KeyFilter,

    /// Rows after resampling (defaults to the image height)
    #[arg(long)]
    height: Option<u32>,

    /// Resampling algorithm
    #[arg(long, default_value_t = ResizeAlgorithm::Nearest)]
    resample: ResizeAlgorithm,

    /// Color classifier: exact, euclidean, redmean
    #[arg(long, default_value_t = ClassifierMethod::Euclidean)]
    classifier: ClassifierMethod,

    /// Maximum note length in rows (0 or less: unlimited)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    max_note_length: i64,

    /// Split notes on a fixed row grid instead of from each note start
    #[arg(long)]
    grid_split: bool,

    /// Pixels with lower alpha are silent
    #[arg(long, default_value_t = DEFAULT_ALPHA_THRESHOLD)]
    alpha_threshold: u8,

    /// Pulses per quarter note
    #[arg(long, default_value_t = 480)]
    ppq: u16,

    /// Tempo in beats per minute
    #[arg(long, default_value_t = 120.0)]
    tempo: f64,

    /// File ticks per image row
    #[arg(long, default_value_t = 120)]
    ticks_per_unit: u32,

    /// Note velocity
    #[arg(long, default_value_t = 100)]
    velocity: u8,

    /// Do not write per-track color annotations
    #[arg(long)]
    no_annotations: bool,
}

impl ConvertArgs {
    fn request(&self) -> Result<ConvertRequest> {
        let palette = if self.palette.is_empty() {
            PaletteSource::Frequent(self.colors)
        } else {
            PaletteSource::Hex(self.palette.clone())
        };

        let config = ConversionConfig {
            start_key: self.start_key,
            end_key: self.end_key,
            target_height: self.height,
            resample: self.resample,
            note_length: NoteLengthPolicy::from_flags(self.grid_split, self.max_note_length)?,
            key_list: (!self.key_list.is_empty()).then(|| self.key_list.clone()),
            key_filter: self.keys,
            classifier: self.classifier,
            alpha_threshold: self.alpha_threshold,
        };

        let export = ExportOptions {
            ppq: self.ppq,
            tempo_bpm: self.tempo,
            ticks_per_unit: self.ticks_per_unit,
            velocity: self.velocity,
            annotate_colors: !self.no_annotations,
        };

        Ok(ConvertRequest {
            palette,
            config,
            export,
        })
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert(args) => {
            let output = args
                .output
                .clone()
                .unwrap_or_else(|| args.input.with_extension("mid"));
            tracing::info!("Converting {:?} -> {:?}", args.input, output);
            let summary = convert::convert_image(&args.input, &output, &args.request()?)?;
            tracing::info!(
                "Done! {} tracks, {} notes, {} ticks",
                summary.tracks,
                summary.notes,
                summary.end_tick
            );
        }

        Commands::Batch { manifest, output } => {
            tracing::info!("Building from {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            let summary = manifest::build_all(&config, output.as_deref())?;
            tracing::info!(
                "Wrote {:?}: {} images ({} skipped), {} notes, {} ticks",
                summary.output,
                summary.converted,
                summary.skipped,
                summary.notes,
                summary.end_tick
            );
        }

        Commands::Check { manifest } => {
            tracing::info!("Checking manifest {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            manifest::validate(&config)?;
            tracing::info!("Manifest is valid!");
        }
    }

    Ok(())
}
