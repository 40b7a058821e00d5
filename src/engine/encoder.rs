// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (imagequant + image + oxipng),
// WebP (libwebp), AVIF (ravif), TIFF (LZW), GIF.

use crate::engine::common::run_with_panic_policy;
use crate::engine::metadata::{embed_metadata, EmbeddedMetadata};
use crate::engine::planner::{EncoderOptions, TiffCompression};
use crate::error::{Result, TranscodeError};
use image::codecs::gif::GifEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, RgbImage, RgbaImage};
use imagequant::{Attributes, RGBA};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

/// Encode `img` with resolved options. `metadata` is re-embedded for
/// JPEG, PNG and WebP; other containers drop it.
pub fn encode(
    img: &DynamicImage,
    options: &EncoderOptions,
    metadata: Option<&EmbeddedMetadata>,
) -> Result<Vec<u8>> {
    if img.width() == 0 || img.height() == 0 {
        return Err(TranscodeError::encode_failed(
            options.format_name(),
            "image has zero width or height",
        ));
    }

    let encoded = match *options {
        EncoderOptions::Jpeg {
            quality,
            optimize_coding,
            progressive,
            trellis,
        } => encode_jpeg(img, quality, optimize_coding, progressive, trellis)?,
        EncoderOptions::Png {
            quality,
            compression_level,
            effort,
        } => encode_png(img, quality, compression_level, effort, metadata.is_some())?,
        EncoderOptions::WebP {
            quality,
            lossless,
            effort,
        } => encode_webp(img, quality, lossless, effort)?,
        EncoderOptions::Avif {
            quality,
            lossless,
            effort,
        } => return encode_avif(img, quality, lossless, effort),
        EncoderOptions::Tiff { compression, .. } => return encode_tiff(img, compression),
        EncoderOptions::Gif { effort } => return encode_gif(img, effort),
        EncoderOptions::Passthrough => {
            return Err(TranscodeError::internal_panic(
                "passthrough must be resolved to a concrete format before encoding",
            ))
        }
    };

    match metadata {
        Some(meta) => embed_metadata(encoded, meta),
        None => Ok(encoded),
    }
}

/// Encode to JPEG using mozjpeg.
///
/// `trellis` keeps mozjpeg's scan optimization (the slow, smallest-output
/// path); without it scans are left at libjpeg defaults.
pub fn encode_jpeg(
    img: &DynamicImage,
    quality: u8,
    optimize_coding: bool,
    progressive: bool,
    trellis: bool,
) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let rgb: Cow<'_, RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality.min(100) as f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        if progressive {
            comp.set_progressive_mode();
        }
        comp.set_optimize_coding(optimize_coding);
        comp.set_optimize_scans(trellis && progressive);
        if trellis && progressive {
            comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        }

        let mut output = Vec::with_capacity((w as usize * h as usize * 3 / 10).max(4096));
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                TranscodeError::encode_failed("jpeg", format!("mozjpeg: failed to start: {e:?}"))
            })?;
            for row in pixels.chunks(w as usize * 3) {
                writer.write_scanlines(row).map_err(|e| {
                    TranscodeError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }
            writer.finish().map_err(|e| {
                TranscodeError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }
        Ok(output)
    })
}

/// Encode to PNG, then recompress losslessly with oxipng.
///
/// Below quality 100 the pixels are first quantized to a palette of at most
/// 256 colors (imagequant, lowest color count that reaches `quality`); oxipng
/// then stores the result as an indexed PNG. Quality 100 keeps every color.
///
/// `compression_level` is zlib-scale (0-9); `effort` picks the oxipng preset (0-6)
/// and the quantizer speed.
pub fn encode_png(
    img: &DynamicImage,
    quality: u8,
    compression_level: u8,
    effort: u8,
    keep_metadata: bool,
) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let quantized;
        let img = if quality < 100 {
            quantized = quantize(img, quality, effort)?;
            &quantized
        } else {
            img
        };

        let compression = match compression_level {
            0..=2 => CompressionType::Fast,
            3..=6 => CompressionType::Default,
            _ => CompressionType::Best,
        };

        let mut buf = Vec::new();
        img.write_with_encoder(PngEncoder::new_with_quality(
            &mut buf,
            compression,
            FilterType::Adaptive,
        ))
        .map_err(|e| TranscodeError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let mut options = oxipng::Options::from_preset(effort.min(6));
        options.strip = if keep_metadata {
            oxipng::StripChunks::None
        } else {
            oxipng::StripChunks::Safe
        };

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            TranscodeError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Palette-quantize with libimagequant and expand back to RGBA.
///
/// Speed is 11 - effort, clamped to 1..=10 (slower = better palette).
fn quantize(img: &DynamicImage, quality: u8, effort: u8) -> Result<DynamicImage> {
    let quant_err =
        |e: imagequant::Error| TranscodeError::encode_failed("png", format!("imagequant: {e}"));

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let pixels: Vec<RGBA> = rgba
        .pixels()
        .map(|p| RGBA::new(p[0], p[1], p[2], p[3]))
        .collect();

    let mut attr = Attributes::new();
    attr.set_speed((11 - i32::from(effort.min(10))).clamp(1, 10))
        .map_err(quant_err)?;
    // minimum 0: never fail on hard images, just use the full palette
    attr.set_quality(0, quality).map_err(quant_err)?;

    let mut liq_img = attr
        .new_image(pixels, w as usize, h as usize, 0.0)
        .map_err(quant_err)?;
    let mut res = attr.quantize(&mut liq_img).map_err(quant_err)?;
    res.set_dithering_level(1.0).map_err(quant_err)?;
    let (palette, indices) = res.remapped(&mut liq_img).map_err(quant_err)?;

    let expanded: Vec<u8> = indices
        .iter()
        .flat_map(|&i| {
            let p = palette[usize::from(i)];
            [p.r, p.g, p.b, p.a]
        })
        .collect();

    RgbaImage::from_raw(w, h, expanded)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| TranscodeError::encode_failed("png", "imagequant: short index buffer"))
}

/// Encode to WebP via libwebp. `effort` maps onto `method` (0-6).
pub fn encode_webp(img: &DynamicImage, quality: u8, lossless: bool, effort: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let (w, h) = (img.width(), img.height());
        let has_alpha = img.color().has_alpha();

        // Avoid carrying an alpha plane the source never had.
        let rgba;
        let rgb;
        let encoder = if has_alpha {
            rgba = img.to_rgba8();
            webp::Encoder::from_rgba(rgba.as_raw(), w, h)
        } else {
            rgb = img.to_rgb8();
            webp::Encoder::from_rgb(rgb.as_raw(), w, h)
        };

        let mut config = webp::WebPConfig::new()
            .map_err(|_| TranscodeError::internal_panic("failed to create WebPConfig"))?;
        config.lossless = i32::from(lossless);
        config.quality = quality.min(100) as f32;
        config.method = i32::from(effort.min(6));
        if lossless {
            config.exact = i32::from(has_alpha);
        }

        encoder
            .encode_advanced(&config)
            .map(|mem| mem.to_vec())
            .map_err(|e| TranscodeError::encode_failed("webp", format!("WebP encode failed: {e:?}")))
    })
}

/// Encode to AVIF via ravif.
///
/// ravif has no true lossless mode; lossless is approximated with quality 100.
/// Speed is 10 - effort, clamped to 1..=10.
pub fn encode_avif(img: &DynamicImage, quality: u8, lossless: bool, effort: u8) -> Result<Vec<u8>> {
    use rgb::FromSlice;

    run_with_panic_policy("encode:avif", || {
        let quality = if lossless { 100.0 } else { quality.min(100) as f32 };
        let speed = 10u8.saturating_sub(effort).clamp(1, 10);

        let rgba = img.to_rgba8();
        let pixels = rgba.as_raw().as_rgba();
        let buffer = ravif::Img::new(pixels, img.width() as usize, img.height() as usize);

        ravif::Encoder::new()
            .with_quality(quality)
            .with_alpha_quality(quality)
            .with_speed(speed)
            .encode_rgba(buffer)
            .map(|encoded| encoded.avif_file)
            .map_err(|e| TranscodeError::encode_failed("avif", format!("ravif: {e}")))
    })
}

/// Encode to TIFF. Compression is always LZW.
pub fn encode_tiff(img: &DynamicImage, compression: TiffCompression) -> Result<Vec<u8>> {
    use tiff::encoder::{colortype, compression::Lzw, TiffEncoder};

    run_with_panic_policy("encode:tiff", || {
        let (w, h) = (img.width(), img.height());
        let tiff_err =
            |e: tiff::TiffError| TranscodeError::encode_failed("tiff", format!("TIFF encode failed: {e}"));

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut cursor).map_err(tiff_err)?;
            match compression {
                TiffCompression::Lzw if img.color().has_alpha() => encoder
                    .write_image_with_compression::<colortype::RGBA8, _>(
                        w,
                        h,
                        Lzw::default(),
                        img.to_rgba8().as_raw(),
                    )
                    .map_err(tiff_err)?,
                TiffCompression::Lzw => encoder
                    .write_image_with_compression::<colortype::RGB8, _>(
                        w,
                        h,
                        Lzw::default(),
                        img.to_rgb8().as_raw(),
                    )
                    .map_err(tiff_err)?,
            }
        }
        Ok(cursor.into_inner())
    })
}

/// Encode to single-frame GIF. Higher effort means a slower, better palette
/// (NeuQuant speed 30 - 3 * effort, clamped to 1..=30).
pub fn encode_gif(img: &DynamicImage, effort: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let speed = (30 - 3 * i32::from(effort.min(10))).clamp(1, 30);
        let rgba = img.to_rgba8();

        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut buf, speed);
            encoder
                .encode(rgba.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
                .map_err(|e| TranscodeError::encode_failed("gif", format!("GIF encode failed: {e}")))?;
        }
        Ok(buf)
    })
}
