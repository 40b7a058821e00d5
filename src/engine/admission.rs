// src/engine/admission.rs
//
// Admission checks run before any codec work: declared size and file extension.
// Extension-based only; content is sniffed later by the decoder.

use crate::error::{Result, TranscodeError};

/// Per-file ceiling on the declared upload size.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Extensions accepted for input files (lowercase).
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &[
    "jpeg", "jpg", "png", "webp", "gif", "avif", "tiff", "tif", "svg", "heif",
];

/// One submitted file.
#[derive(Clone, Debug)]
pub struct InputItem {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Size reported by the transport; admission is judged on this, not on `bytes`.
    pub declared_size: u64,
}

impl InputItem {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let declared_size = bytes.len() as u64;
        Self {
            name: name.into(),
            bytes,
            declared_size,
        }
    }

    pub fn with_declared_size(mut self, declared_size: u64) -> Self {
        self.declared_size = declared_size;
        self
    }
}

/// Lowercased text after the last dot, if any. A leading dot counts
/// (".png" has extension "png"), unlike `Path::extension`.
pub fn file_extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
}

/// Admit or reject an item. Pure: no I/O, no decoding.
pub fn admit(item: &InputItem) -> Result<()> {
    if item.declared_size > MAX_FILE_SIZE {
        return Err(TranscodeError::file_too_large(
            item.declared_size,
            MAX_FILE_SIZE,
        ));
    }

    match file_extension(&item.name) {
        Some(ext) if SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        other => Err(TranscodeError::unsupported_extension(other)),
    }
}
