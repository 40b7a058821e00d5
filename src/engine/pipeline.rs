// src/engine/pipeline.rs
//
// Pixel stage of the transform: applies a TransformPlan's resize to a decoded image.
// fast_image_resize (Lanczos3) first, image crate resize as the fallback.

use crate::engine::planner::TransformPlan;
use crate::error::{Result, TranscodeError};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use tracing::debug;

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }
}

impl From<ResizeError> for TranscodeError {
    fn from(err: ResizeError) -> Self {
        TranscodeError::resize_failed(err.source_dims, err.target_dims, err.reason)
    }
}

/// Apply the plan's pixel operations. Images that need no resize pass through untouched.
pub fn apply_plan(img: DynamicImage, plan: &TransformPlan) -> Result<DynamicImage> {
    let Some((width, height)) = plan.target_dimensions() else {
        return Ok(img);
    };
    if (img.width(), img.height()) == (width, height) {
        return Ok(img);
    }

    debug!(
        from = ?(img.width(), img.height()),
        to = ?(width, height),
        "resizing"
    );
    Ok(fast_resize_owned(img, width, height)?)
}

/// Resize an owned image. RGB8/RGBA8 buffers are moved, not copied.
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    let (pixel_type, src_pixels) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        opaque @ (DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageRgb16(_)) => (PixelType::U8x3, opaque.to_rgb8().into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    resize_pixels(src_width, src_height, src_pixels, pixel_type, dst_width, dst_height)
        .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

fn resize_pixels(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let required_bytes = (src_width as usize)
        .checked_mul(src_height as usize)
        .and_then(|n| n.checked_mul(pixel_type.size()))
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "source buffer too small: expected {required_bytes} bytes, got {}",
            src_pixels.len()
        ));
    }

    let options =
        ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));

    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => resize_fir(&src_image, pixel_type, dst_width, dst_height, &options),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, pixel_type);
            aligned
                .buffer_mut()
                .copy_from_slice(&src_pixels[..required_bytes]);
            resize_fir(&aligned, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    primary.or_else(|err| {
        resize_with_image_crate(
            &src_pixels,
            src_width,
            src_height,
            pixel_type,
            dst_width,
            dst_height,
        )
        .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
    })
}

/// The source is only read: premultiplication works on a copy, so the
/// image crate fallback still sees straight alpha if this fails.
fn resize_fir(
    src_image: &fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    // Opaque RGBA skips the premultiply round trip.
    let needs_premultiply = pixel_type == PixelType::U8x4
        && src_image
            .buffer()
            .iter()
            .skip(3)
            .step_by(4)
            .any(|&alpha| alpha != 255);

    let mul_div = MulDiv::default();
    let premultiplied;
    let source = if needs_premultiply {
        let mut buf = fir::images::Image::new(src_image.width(), src_image.height(), pixel_type);
        mul_div
            .multiply_alpha(src_image, &mut buf)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
        premultiplied = buf;
        &premultiplied
    } else {
        src_image
    };

    fir::Resizer::new()
        .resize(source, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    to_dynamic(dst_width, dst_height, dst_image.into_vec(), pixel_type)
}

fn resize_with_image_crate(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let filter = FilterType::Lanczos3;
    match to_dynamic(src_width, src_height, src_pixels.to_vec(), pixel_type)? {
        DynamicImage::ImageRgb8(rgb) => Ok(DynamicImage::ImageRgb8(image::imageops::resize(
            &rgb, dst_width, dst_height, filter,
        ))),
        DynamicImage::ImageRgba8(rgba) => Ok(DynamicImage::ImageRgba8(image::imageops::resize(
            &rgba, dst_width, dst_height, filter,
        ))),
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}

fn to_dynamic(
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    pixel_type: PixelType,
) -> std::result::Result<DynamicImage, String> {
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "rgb buffer does not match dimensions".to_string()),
        PixelType::U8x4 => RgbaImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "rgba buffer does not match dimensions".to_string()),
        other => Err(format!("unsupported pixel type {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::planner::{EncoderOptions, ResizePlan};
    use image::{GenericImageView, LumaA, Rgba};

    fn plan(resize: Option<(u32, u32)>) -> TransformPlan {
        TransformPlan {
            resize: resize.map(|(width, height)| ResizePlan {
                max_width: Some(width),
                max_height: Some(height),
                width,
                height,
            }),
            encoder: EncoderOptions::jpeg(80),
            preserve_metadata: false,
        }
    }

    fn rgb(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_no_resize_returns_input() {
        let out = apply_plan(rgb(40, 30), &plan(None)).unwrap();
        assert_eq!(out.dimensions(), (40, 30));
    }

    #[test]
    fn test_resize_rgb_keeps_layout() {
        let out = apply_plan(rgb(200, 100), &plan(Some((100, 50)))).unwrap();
        assert_eq!(out.dimensions(), (100, 50));
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_resize_rgba_preserves_transparency() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([255, 0, 0, 0])));
        let out = fast_resize_owned(img, 16, 16).unwrap();
        assert_eq!(out.dimensions(), (16, 16));
        let rgba = out.to_rgba8();
        assert!(rgba.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_other_layouts_are_converted() {
        let img = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(10, 10, LumaA([9, 255])));
        let out = fast_resize_owned(img, 5, 5).unwrap();
        assert!(matches!(out, DynamicImage::ImageRgba8(_)));
    }

    #[test]
    fn test_zero_target_is_resize_error() {
        let err = fast_resize_owned(rgb(10, 10), 0, 5).unwrap_err();
        assert_eq!(err.target_dims, (0, 5));
        let err: TranscodeError = err.into();
        assert!(matches!(err, TranscodeError::ResizeFailed { .. }));
    }

    #[test]
    fn test_image_crate_fallback_resizes_rgb() {
        let pixels: Vec<u8> = (0..8 * 4 * 3).map(|i| (i % 251) as u8).collect();
        let out = resize_with_image_crate(&pixels, 8, 4, PixelType::U8x3, 4, 2).unwrap();
        assert_eq!(out.dimensions(), (4, 2));
    }

    fn translucent_pixels(width: u32, height: u32) -> Vec<u8> {
        RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 128])).into_raw()
    }

    #[test]
    fn test_fir_resize_leaves_source_unpremultiplied() {
        let mut pixels = translucent_pixels(8, 8);
        let original = pixels.clone();
        let options = ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
        let src = fir::images::Image::from_slice_u8(8, 8, pixels.as_mut_slice(), PixelType::U8x4)
            .unwrap();
        let out = resize_fir(&src, PixelType::U8x4, 4, 4, &options).unwrap();
        drop(src);

        // the buffer the image crate fallback would reuse
        assert_eq!(pixels, original);
        let p = out.to_rgba8().get_pixel(1, 1).0;
        assert!(p[0].abs_diff(200) <= 2 && p[3].abs_diff(128) <= 2, "{p:?}");
    }

    #[test]
    fn test_image_crate_fallback_keeps_translucent_color() {
        let pixels = translucent_pixels(8, 8);
        let out = resize_with_image_crate(&pixels, 8, 8, PixelType::U8x4, 4, 4).unwrap();
        let p = out.to_rgba8().get_pixel(2, 2).0;
        assert!(p[0].abs_diff(200) <= 2 && p[1].abs_diff(100) <= 2, "{p:?}");
        assert!(p[3].abs_diff(128) <= 2);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let err = resize_pixels(4, 4, vec![0; 10], PixelType::U8x3, 2, 2).unwrap_err();
        assert!(err.contains("too small"));
    }
}
