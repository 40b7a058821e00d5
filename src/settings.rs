// src/settings.rs
//
// Per-batch processing settings.
// Parsed once per request, read-only while the batch runs.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality used when the settings omit it.
pub const DEFAULT_QUALITY: u8 = 80;

/// Highest accepted `effort`.
pub const MAX_EFFORT: u8 = 9;

/// Output format requested for the batch.
///
/// Unrecognized names are kept as `Passthrough` rather than rejected:
/// those items are re-encoded in their own source format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetFormat {
    Jpeg,
    Png,
    WebP,
    Avif,
    Tiff,
    Gif,
    Passthrough(String),
}

impl TargetFormat {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
            Self::Tiff => "tiff",
            Self::Gif => "gif",
            Self::Passthrough(name) => name,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough(_))
    }
}

impl From<String> for TargetFormat {
    fn from(value: String) -> Self {
        match value.as_str() {
            "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::WebP,
            "avif" => Self::Avif,
            "tiff" => Self::Tiff,
            "gif" => Self::Gif,
            _ => Self::Passthrough(value),
        }
    }
}

impl From<TargetFormat> for String {
    fn from(value: TargetFormat) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which bound(s) decide whether an image gets resized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResizeMode {
    MaxWidth,
    MaxHeight,
    #[default]
    Both,
}

/// Requested bounding box. Zero is treated the same as an absent bound.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeSettings {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub mode: ResizeMode,
}

impl ResizeSettings {
    pub fn new(width: Option<u32>, height: Option<u32>, mode: ResizeMode) -> Self {
        Self {
            width,
            height,
            mode,
        }
    }

    /// Width bound, ignoring zero.
    pub fn max_width(&self) -> Option<u32> {
        self.width.filter(|&w| w > 0)
    }

    /// Height bound, ignoring zero.
    pub fn max_height(&self) -> Option<u32> {
        self.height.filter(|&h| h > 0)
    }

    pub fn has_bounds(&self) -> bool {
        self.max_width().is_some() || self.max_height().is_some()
    }
}

/// Immutable per-batch configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSettings {
    #[serde(alias = "targetFormat")]
    pub format: TargetFormat,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub resize: Option<ResizeSettings>,
    #[serde(default)]
    pub preserve_metadata: bool,
    #[serde(default)]
    pub lossless: bool,
    /// 0 means "use the format's default", like an absent value.
    #[serde(default)]
    pub effort: Option<u8>,
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self::new(TargetFormat::WebP)
    }
}

impl ProcessingSettings {
    pub fn new(format: TargetFormat) -> Self {
        Self {
            format,
            quality: DEFAULT_QUALITY,
            resize: None,
            preserve_metadata: false,
            lossless: false,
            effort: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_resize(mut self, resize: ResizeSettings) -> Self {
        self.resize = Some(resize);
        self
    }

    pub fn with_effort(mut self, effort: u8) -> Self {
        self.effort = Some(effort);
        self
    }

    pub fn with_lossless(mut self, lossless: bool) -> Self {
        self.lossless = lossless;
        self
    }

    pub fn with_preserve_metadata(mut self, preserve: bool) -> Self {
        self.preserve_metadata = preserve;
        self
    }

    /// Parse and validate the JSON settings blob of a batch request.
    pub fn from_json(raw: &str) -> Result<Self, BatchError> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Effort with the caller's zero folded into "unset".
    pub fn effort_or(&self, default: u8) -> u8 {
        self.effort.filter(|&e| e != 0).unwrap_or(default)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if !(1..=100).contains(&self.quality) {
            return Err(BatchError::invalid_settings(format!(
                "quality must be within 1-100, got {}",
                self.quality
            )));
        }
        if let Some(effort) = self.effort {
            if effort > MAX_EFFORT {
                return Err(BatchError::invalid_settings(format!(
                    "effort must be within 0-{MAX_EFFORT}, got {effort}"
                )));
            }
        }
        Ok(())
    }
}
