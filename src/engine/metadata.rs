// src/engine/metadata.rs
//
// ICC / EXIF carry-over between containers (JPEG, PNG, WebP) via img-parts.

use crate::error::{Result, TranscodeError};
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, Bytes, ImageEXIF, ImageICC};

/// Metadata blocks lifted from a source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbeddedMetadata {
    pub icc: Option<Bytes>,
    pub exif: Option<Bytes>,
}

impl EmbeddedMetadata {
    pub fn is_empty(&self) -> bool {
        self.icc.is_none() && self.exif.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Jpeg,
    Png,
    WebP,
}

fn sniff_container(data: &[u8]) -> Option<Container> {
    if data.len() < 12 {
        return None;
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        Some(Container::Jpeg)
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(Container::Png)
    } else if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(Container::WebP)
    } else {
        None
    }
}

/// Read ICC and EXIF from a source file. Unknown containers and parse
/// failures yield empty metadata; a malformed profile is dropped.
pub fn extract_metadata(data: &[u8]) -> EmbeddedMetadata {
    let Some(container) = sniff_container(data) else {
        return EmbeddedMetadata::default();
    };
    let bytes = Bytes::copy_from_slice(data);

    let (icc, exif) = match container {
        Container::Jpeg => match Jpeg::from_bytes(bytes) {
            Ok(jpeg) => (jpeg.icc_profile(), jpeg.exif()),
            Err(_) => (None, None),
        },
        Container::Png => match Png::from_bytes(bytes) {
            Ok(png) => (png.icc_profile(), png.exif()),
            Err(_) => (None, None),
        },
        Container::WebP => match WebP::from_bytes(bytes) {
            Ok(webp) => (webp.icc_profile(), webp.exif()),
            Err(_) => (None, None),
        },
    };

    EmbeddedMetadata {
        icc: icc.filter(|icc| validate_icc_profile(icc)),
        exif: exif.filter(|exif| !exif.is_empty()),
    }
}

/// Write metadata into freshly encoded bytes. Containers without
/// metadata support are returned unchanged.
pub fn embed_metadata(encoded: Vec<u8>, metadata: &EmbeddedMetadata) -> Result<Vec<u8>> {
    if metadata.is_empty() {
        return Ok(encoded);
    }
    let Some(container) = sniff_container(&encoded) else {
        return Ok(encoded);
    };

    let bytes = Bytes::from(encoded);
    let icc = metadata.icc.clone();
    let exif = metadata.exif.clone();
    let parse_failed = |format: &'static str, e: img_parts::Error| {
        TranscodeError::encode_failed(format, format!("failed to reparse for metadata: {e}"))
    };

    let out = match container {
        Container::Jpeg => {
            let mut jpeg = Jpeg::from_bytes(bytes).map_err(|e| parse_failed("jpeg", e))?;
            jpeg.set_icc_profile(icc);
            jpeg.set_exif(exif);
            jpeg.encoder().bytes()
        }
        Container::Png => {
            let mut png = Png::from_bytes(bytes).map_err(|e| parse_failed("png", e))?;
            png.set_icc_profile(icc);
            png.set_exif(exif);
            png.encoder().bytes()
        }
        Container::WebP => {
            let mut webp = WebP::from_bytes(bytes).map_err(|e| parse_failed("webp", e))?;
            webp.set_icc_profile(icc);
            webp.set_exif(exif);
            webp.encoder().bytes()
        }
    };
    Ok(out.to_vec())
}

/// Sanity-check an ICC header: 128-byte minimum, declared size matches,
/// signature fields are ASCII.
pub(crate) fn validate_icc_profile(icc: &[u8]) -> bool {
    if icc.len() < 128 {
        return false;
    }
    let declared = u32::from_be_bytes([icc[0], icc[1], icc[2], icc[3]]) as usize;
    if declared != icc.len() {
        return false;
    }
    // major version
    if icc[8] > 10 {
        return false;
    }

    let ascii = |range: std::ops::Range<usize>| {
        icc[range]
            .iter()
            .all(|&b| b == 0 || (32..=126).contains(&b))
    };
    // CMM type, profile class, data color space, PCS
    ascii(4..8) && ascii(12..16) && ascii(16..20) && ascii(20..24)
}
