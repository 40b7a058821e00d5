// src/engine/planner.rs
//
// Transform planning: pure decisions, no pixels touched.
// - whether to resize, and to what box (fit inside, never enlarge)
// - which encoder variant and parameters the target format gets

use crate::settings::{ProcessingSettings, ResizeMode, ResizeSettings, TargetFormat};
use tracing::debug;

/// Effort used for WebP / AVIF when unset.
pub const DEFAULT_SPEED_EFFORT: u8 = 4;
/// Effort used for PNG / GIF when unset.
pub const DEFAULT_COMPRESSION_EFFORT: u8 = 7;
/// zlib-scale PNG compression level; always the maximum.
pub const PNG_COMPRESSION_LEVEL: u8 = 9;

/// Facts read from an encoded image header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Lowercase format name ("jpeg", "png", ...).
    pub format: String,
    pub width: u32,
    pub height: u32,
}

impl SourceMetadata {
    pub fn new(format: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            format: format.into(),
            width,
            height,
        }
    }
}

/// A triggered resize: the requested box and the resulting output size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizePlan {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TiffCompression {
    Lzw,
}

/// Encoder parameters, one variant per target format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncoderOptions {
    Jpeg {
        quality: u8,
        optimize_coding: bool,
        progressive: bool,
        /// mozjpeg trellis quantization (the "high quality" encoder variant)
        trellis: bool,
    },
    Png {
        /// Below 100 the image is palette-quantized before compression.
        quality: u8,
        compression_level: u8,
        effort: u8,
    },
    WebP {
        quality: u8,
        lossless: bool,
        effort: u8,
    },
    Avif {
        quality: u8,
        lossless: bool,
        effort: u8,
    },
    Tiff {
        quality: u8,
        compression: TiffCompression,
    },
    Gif {
        effort: u8,
    },
    /// Re-encode in the source's own format with that format's defaults.
    Passthrough,
}

impl EncoderOptions {
    pub fn jpeg(quality: u8) -> Self {
        Self::Jpeg {
            quality,
            optimize_coding: true,
            progressive: true,
            trellis: true,
        }
    }

    /// Options derived from the batch settings for the requested format.
    pub fn for_settings(settings: &ProcessingSettings) -> Self {
        let quality = settings.quality;
        match &settings.format {
            TargetFormat::WebP => Self::WebP {
                quality,
                lossless: settings.lossless,
                effort: settings.effort_or(DEFAULT_SPEED_EFFORT),
            },
            TargetFormat::Jpeg => Self::jpeg(quality),
            TargetFormat::Png => Self::Png {
                quality,
                compression_level: PNG_COMPRESSION_LEVEL,
                effort: settings.effort_or(DEFAULT_COMPRESSION_EFFORT),
            },
            TargetFormat::Avif => Self::Avif {
                quality,
                lossless: settings.lossless,
                effort: settings.effort_or(DEFAULT_SPEED_EFFORT),
            },
            TargetFormat::Tiff => Self::Tiff {
                quality,
                compression: TiffCompression::Lzw,
            },
            TargetFormat::Gif => Self::Gif {
                effort: settings.effort_or(DEFAULT_COMPRESSION_EFFORT),
            },
            TargetFormat::Passthrough(_) => Self::Passthrough,
        }
    }

    /// Default options for re-encoding into a detected source format.
    /// `None` when we have no dedicated encoder for it.
    pub fn source_defaults(format: &str) -> Option<Self> {
        match format {
            "jpeg" => Some(Self::jpeg(80)),
            // no vector writer; rasterized SVG re-encodes as lossless PNG
            "png" | "svg" => Some(Self::Png {
                quality: 100,
                compression_level: 6,
                effort: DEFAULT_COMPRESSION_EFFORT,
            }),
            "webp" => Some(Self::WebP {
                quality: 80,
                lossless: false,
                effort: DEFAULT_SPEED_EFFORT,
            }),
            "avif" => Some(Self::Avif {
                quality: 50,
                lossless: false,
                effort: DEFAULT_SPEED_EFFORT,
            }),
            "tiff" => Some(Self::Tiff {
                quality: 80,
                compression: TiffCompression::Lzw,
            }),
            "gif" => Some(Self::Gif {
                effort: DEFAULT_COMPRESSION_EFFORT,
            }),
            _ => None,
        }
    }

    pub fn format_name(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpeg",
            Self::Png { .. } => "png",
            Self::WebP { .. } => "webp",
            Self::Avif { .. } => "avif",
            Self::Tiff { .. } => "tiff",
            Self::Gif { .. } => "gif",
            Self::Passthrough => "passthrough",
        }
    }
}

/// Resolved plan for one item. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformPlan {
    pub resize: Option<ResizePlan>,
    pub encoder: EncoderOptions,
    pub preserve_metadata: bool,
}

impl TransformPlan {
    pub fn should_resize(&self) -> bool {
        self.resize.is_some()
    }

    pub fn target_dimensions(&self) -> Option<(u32, u32)> {
        self.resize.map(|r| (r.width, r.height))
    }
}

/// Resize decision table.
///
/// - maxWidth: width bound set and exceeded
/// - maxHeight: height bound set and exceeded
/// - both: either bound set and exceeded
pub fn should_resize(resize: &ResizeSettings, current_width: u32, current_height: u32) -> bool {
    let width_exceeded = resize.max_width().is_some_and(|w| current_width > w);
    let height_exceeded = resize.max_height().is_some_and(|h| current_height > h);
    match resize.mode {
        ResizeMode::MaxWidth => width_exceeded,
        ResizeMode::MaxHeight => height_exceeded,
        ResizeMode::Both => width_exceeded || height_exceeded,
    }
}

/// Output size for fit-inside without enlargement. The binding axis lands
/// exactly on its bound; the other axis is scaled and rounded.
pub fn fit_inside(
    orig_w: u32,
    orig_h: u32,
    max_w: Option<u32>,
    max_h: Option<u32>,
) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (orig_w, orig_h);
    }

    let scale_w = max_w.map(|w| w as f64 / orig_w as f64);
    let scale_h = max_h.map(|h| h as f64 / orig_h as f64);

    let (scale, bound_by_width) = match (scale_w, scale_h) {
        (Some(sw), Some(sh)) if sw <= sh => (sw, true),
        (Some(_), Some(sh)) => (sh, false),
        (Some(sw), None) => (sw, true),
        (None, Some(sh)) => (sh, false),
        (None, None) => return (orig_w, orig_h),
    };

    if scale >= 1.0 {
        return (orig_w, orig_h);
    }

    if bound_by_width {
        let h = ((orig_h as f64 * scale).round() as u32).max(1);
        (max_w.unwrap_or(orig_w), h)
    } else {
        let w = ((orig_w as f64 * scale).round() as u32).max(1);
        (w, max_h.unwrap_or(orig_h))
    }
}

/// Build the plan for one item.
pub fn plan_transform(source: &SourceMetadata, settings: &ProcessingSettings) -> TransformPlan {
    let resize = settings
        .resize
        .as_ref()
        .filter(|r| r.has_bounds())
        .filter(|r| should_resize(r, source.width, source.height))
        .map(|r| {
            let (max_width, max_height) = (r.max_width(), r.max_height());
            let (width, height) = fit_inside(source.width, source.height, max_width, max_height);
            ResizePlan {
                max_width,
                max_height,
                width,
                height,
            }
        });

    let encoder = EncoderOptions::for_settings(settings);

    debug!(
        source_format = %source.format,
        source_width = source.width,
        source_height = source.height,
        resize = ?resize.map(|r| (r.width, r.height)),
        encoder = encoder.format_name(),
        "planned transform"
    );

    TransformPlan {
        resize,
        encoder,
        preserve_metadata: settings.preserve_metadata,
    }
}
