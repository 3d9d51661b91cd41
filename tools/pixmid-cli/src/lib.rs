//! pixmid-cli library
//!
//! Image loading, palette resolution and manifest-driven batch conversion
//! behind the `pixmid` binary.

pub mod convert;
pub mod manifest;

pub use convert::{ConvertRequest, PaletteSource, convert_image, load_image, resolve_palette};
pub use manifest::{Manifest, build_all, load_manifest, validate};
