// src/engine/decoder.rs
//
// Decoder operations: header probing and full decodes.
// JPEG goes through mozjpeg, WebP through libwebp, SVG through resvg,
// the rest through the image crate.

use crate::engine::common::run_with_panic_policy;
use crate::engine::planner::SourceMetadata;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{Result, TranscodeError};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use mozjpeg::Decompress;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};

/// How far into the input to look for an `<svg` root element.
const SVG_SNIFF_BYTES: usize = 1024;

/// Container found by a probe. SVG has no `ImageFormat`, and its parsed
/// tree is kept so the decode does not parse it twice.
enum Probed {
    Raster(ImageFormat),
    Svg(Box<Tree>),
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    if is_avif_data(bytes) {
        return Some(ImageFormat::Avif);
    }
    image::guess_format(bytes).ok()
}

/// Lowercase name reported as `originalFormat` / `processedFormat`.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Avif => "avif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Ico => "ico",
        _ => "unknown",
    }
}

/// Read format and dimensions from the header without decoding pixels.
pub fn probe_metadata(bytes: &[u8]) -> Result<SourceMetadata> {
    probe(bytes).map(|(_, meta)| meta)
}

fn probe(bytes: &[u8]) -> Result<(Probed, SourceMetadata)> {
    if bytes.is_empty() {
        return Err(TranscodeError::empty_input());
    }

    if let Some(format) = detect_format(bytes) {
        let (width, height) = if format == ImageFormat::Avif {
            avif_dimensions(bytes)
                .ok_or_else(|| TranscodeError::decode_failed("avif: missing ispe property"))?
        } else {
            run_with_panic_policy("probe", || {
                ImageReader::with_format(Cursor::new(bytes), format)
                    .into_dimensions()
                    .map_err(|e| TranscodeError::decode_failed(format!("header read failed: {e}")))
            })?
        };
        check_dimensions(width, height)?;
        return Ok((
            Probed::Raster(format),
            SourceMetadata::new(format_name(format), width, height),
        ));
    }

    if is_svg_data(bytes) {
        let tree = parse_svg(bytes)?;
        let (width, height) = svg_dimensions(&tree);
        check_dimensions(width, height)?;
        return Ok((
            Probed::Svg(Box::new(tree)),
            SourceMetadata::new("svg", width, height),
        ));
    }

    Err(TranscodeError::decode_failed("unrecognized image format"))
}

/// Unified decode entrypoint:
/// - Probe once (format, dimensions, limits) before allocating pixels
/// - Route to the fastest decoder for the format
///
/// Returns the probed source facts alongside the pixels.
pub fn decode_image(bytes: &[u8]) -> Result<(DynamicImage, SourceMetadata)> {
    let (probed, meta) = probe(bytes)?;

    let img = match probed {
        Probed::Raster(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes)?,
        Probed::Raster(ImageFormat::WebP) => decode_webp_libwebp(bytes)?,
        // no AV1 decoder is linked
        Probed::Raster(ImageFormat::Avif) => {
            return Err(TranscodeError::decode_failed(
                "avif input can be probed but not decoded",
            ))
        }
        Probed::Raster(format) => decode_with_image_crate(bytes, format)?,
        Probed::Svg(tree) => render_svg(&tree, meta.width, meta.height)?,
    };

    Ok((img, meta))
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo).
///
/// A truncated scan still decodes: libjpeg warns on premature EOF and fills
/// the missing rows instead of failing.
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        let mut decompress = Decompress::new_mem(data)
            .map_err(|e| TranscodeError::decode_failed(format!("mozjpeg init failed: {e:?}")))?
            .rgb()
            .map_err(|e| {
                TranscodeError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
            })?;

        let width = u32::try_from(decompress.width())
            .map_err(|_| TranscodeError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        let height = u32::try_from(decompress.height())
            .map_err(|_| TranscodeError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            TranscodeError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat: Vec<u8> = pixels.into_iter().flatten().collect();

        RgbImage::from_raw(width, height, flat)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| TranscodeError::decode_failed("mozjpeg: short pixel buffer"))
    })
}

/// Decode WebP using libwebp. Animated WebP falls back to the image crate (first frame).
pub fn decode_webp_libwebp(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            TranscodeError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            return image::load_from_memory_with_format(data, ImageFormat::WebP).map_err(|e| {
                TranscodeError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        check_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| TranscodeError::decode_failed("webp: decode failed"))?;
        Ok(decoded.to_image())
    })
}

/// Decode any other format the image crate was built with.
pub fn decode_with_image_crate(data: &[u8], format: ImageFormat) -> Result<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory_with_format(data, format)
            .map_err(|e| TranscodeError::decode_failed(format!("decode failed: {e}")))
    })
}

fn parse_svg(data: &[u8]) -> Result<Tree> {
    run_with_panic_policy("probe:svg", || {
        let text = std::str::from_utf8(data)
            .map_err(|_| TranscodeError::decode_failed("svg: not valid UTF-8"))?;
        Tree::from_str(text, &Options::default())
            .map_err(|e| TranscodeError::decode_failed(format!("Failed to parse SVG: {e}")))
    })
}

/// Intrinsic size, rounded up to whole pixels.
fn svg_dimensions(tree: &Tree) -> (u32, u32) {
    let size = tree.size;
    (
        size.width().ceil().max(1.0) as u32,
        size.height().ceil().max(1.0) as u32,
    )
}

/// Rasterize at intrinsic size. tiny-skia stores premultiplied RGBA, so
/// pixels are demultiplied on the way out.
fn render_svg(tree: &Tree, width: u32, height: u32) -> Result<DynamicImage> {
    run_with_panic_policy("decode:svg", || {
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| TranscodeError::decode_failed("svg: failed to create pixmap"))?;
        resvg::render(tree, Transform::identity(), &mut pixmap.as_mut());

        let rgba: Vec<u8> = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();
        RgbaImage::from_raw(width, height, rgba)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| TranscodeError::decode_failed("svg: short pixel buffer"))
    })
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(TranscodeError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(TranscodeError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Text markup whose root element is `<svg`, possibly after an XML
/// declaration, a doctype or comments.
pub(crate) fn is_svg_data(data: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&data[..data.len().min(SVG_SNIFF_BYTES)]);
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with('<') && head.contains("<svg")
}

/// ISOBMFF container whose `ftyp` box lists an AVIF brand.
pub(crate) fn is_avif_data(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }

    let ftyp_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if ftyp_size > data.len() || ftyp_size < 12 {
        return false;
    }

    let is_avif_brand = |brand: &[u8]| brand == b"avif" || brand == b"avis";

    // major brand, then compatible brands after the 4-byte minor version
    is_avif_brand(&data[8..12])
        || data[16.min(ftyp_size)..ftyp_size]
            .chunks_exact(4)
            .any(is_avif_brand)
}

/// Dimensions from the first `ispe` (image spatial extents) property.
///
/// Layout: box type, 4 bytes version/flags, u32 width, u32 height (big-endian).
pub(crate) fn avif_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let pos = data.windows(4).position(|w| w == b"ispe")?;
    let body = data.get(pos + 8..pos + 16)?;
    let width = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let height = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    (width > 0 && height > 0).then_some((width, height))
}
