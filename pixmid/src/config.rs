//! Conversion configuration
//!
//! One immutable value passed to the engine at construction. Deserializes
//! from the `[conversion]` table of a batch manifest.

use pixmid_resample::ResizeAlgorithm;
use serde::Deserialize;

use crate::classify::ClassifierMethod;
use crate::error::ConversionError;
use crate::keys::{KeyFilter, KeyLayout};

/// Alpha below which a pixel never sounds
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 128;

/// When a held note is forcibly split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum NoteLengthPolicy {
    /// Notes end only when the color changes
    #[default]
    Unlimited,
    /// Notes end after `max_len` ticks measured from their own start
    Flow { max_len: u32 },
    /// Notes end on every tick that is a multiple of `max_len`
    Grid { max_len: u32 },
}

impl NoteLengthPolicy {
    /// Map the grid-split flag and maximum length onto a policy
    ///
    /// Grid split needs a positive length; a positive length without grid
    /// split selects Flow; anything else is Unlimited.
    pub fn from_flags(use_grid_split: bool, max_note_length: i64) -> Result<Self, ConversionError> {
        let max_len = u32::try_from(max_note_length).unwrap_or(0);
        match (use_grid_split, max_len) {
            (true, 0) => Err(ConversionError::InvalidArgument(format!(
                "grid split needs a positive max note length, got {max_note_length}"
            ))),
            (true, max_len) => Ok(NoteLengthPolicy::Grid { max_len }),
            (false, 0) => Ok(NoteLengthPolicy::Unlimited),
            (false, max_len) => Ok(NoteLengthPolicy::Flow { max_len }),
        }
    }

    pub fn validate(self) -> Result<(), ConversionError> {
        match self {
            NoteLengthPolicy::Flow { max_len: 0 } | NoteLengthPolicy::Grid { max_len: 0 } => {
                Err(ConversionError::InvalidArgument(
                    "max note length must be positive".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Whether the open note in a column must end at `tick`
    ///
    /// `opened_at` is the start tick of the column's open note, if any.
    #[inline]
    pub fn forces_split(self, tick: u32, opened_at: Option<u32>) -> bool {
        match self {
            NoteLengthPolicy::Unlimited => false,
            NoteLengthPolicy::Flow { max_len } => {
                opened_at.is_some_and(|start| tick - start >= max_len)
            }
            NoteLengthPolicy::Grid { max_len } => tick > 0 && tick % max_len == 0,
        }
    }
}

/// Everything that shapes a conversion except the palette and pixels
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// First key of the range
    pub start_key: u8,
    /// One past the last key of the range
    pub end_key: u8,
    /// Rows after resampling (None keeps the source height)
    pub target_height: Option<u32>,
    pub resample: ResizeAlgorithm,
    pub note_length: NoteLengthPolicy,
    /// Explicit key per column, overriding the range order
    pub key_list: Option<Vec<u8>>,
    pub key_filter: KeyFilter,
    pub classifier: ClassifierMethod,
    pub alpha_threshold: u8,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        // 88-key piano: A0..=C8
        Self {
            start_key: 21,
            end_key: 109,
            target_height: None,
            resample: ResizeAlgorithm::default(),
            note_length: NoteLengthPolicy::Unlimited,
            key_list: None,
            key_filter: KeyFilter::All,
            classifier: ClassifierMethod::default(),
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
        }
    }
}

impl ConversionConfig {
    /// Validate run arguments and resolve the column layout
    pub fn key_layout(&self) -> Result<KeyLayout, ConversionError> {
        self.note_length.validate()?;
        if self.target_height == Some(0) {
            return Err(ConversionError::InvalidArgument(
                "target height must be positive".into(),
            ));
        }
        KeyLayout::build(
            self.start_key,
            self.end_key,
            self.key_filter,
            self.key_list.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_flags() {
        assert_eq!(
            NoteLengthPolicy::from_flags(true, 4).unwrap(),
            NoteLengthPolicy::Grid { max_len: 4 }
        );
        assert_eq!(
            NoteLengthPolicy::from_flags(false, 4).unwrap(),
            NoteLengthPolicy::Flow { max_len: 4 }
        );
        assert_eq!(
            NoteLengthPolicy::from_flags(false, -1).unwrap(),
            NoteLengthPolicy::Unlimited
        );
        assert!(NoteLengthPolicy::from_flags(true, 0).is_err());
        assert!(NoteLengthPolicy::from_flags(true, -3).is_err());
    }

    #[test]
    fn test_grid_split_counts_from_scan_start() {
        let grid = NoteLengthPolicy::Grid { max_len: 3 };
        let splits: Vec<u32> = (0..10).filter(|&t| grid.forces_split(t, Some(1))).collect();
        assert_eq!(splits, vec![3, 6, 9]);
    }

    #[test]
    fn test_flow_split_counts_from_note_start() {
        let flow = NoteLengthPolicy::Flow { max_len: 3 };
        assert!(!flow.forces_split(3, Some(1)));
        assert!(flow.forces_split(4, Some(1)));
        assert!(!flow.forces_split(4, None));
    }

    #[test]
    fn test_zero_length_rejected() {
        let config = ConversionConfig {
            note_length: NoteLengthPolicy::Grid { max_len: 0 },
            ..Default::default()
        };
        assert!(matches!(
            config.key_layout(),
            Err(ConversionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_default_layout_is_piano() {
        let layout = ConversionConfig::default().key_layout().unwrap();
        assert_eq!(layout.width(), 88);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: ConversionConfig = toml::from_str(
            r#"
            start_key = 48
            end_key = 60
            resample = "summed-area"
            key_filter = "white-clipped"
            classifier = "exact"
            note_length = { mode = "grid", max_len = 8 }
            "#,
        )
        .unwrap();
        assert_eq!(config.start_key, 48);
        assert_eq!(config.resample, ResizeAlgorithm::SummedArea);
        assert_eq!(config.key_filter, KeyFilter::WhiteClipped);
        assert_eq!(config.note_length, NoteLengthPolicy::Grid { max_len: 8 });
        assert_eq!(config.alpha_threshold, DEFAULT_ALPHA_THRESHOLD);
        assert_eq!(config.key_layout().unwrap().width(), 7);
    }
}
