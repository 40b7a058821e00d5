// src/error.rs
//
// Unified error handling for optipress
// Uses thiserror for simple, type-safe error handling
//
// Two levels:
// - TranscodeError: one item failed; rendered into that item's result record
// - BatchError: the request as a whole is unusable; no per-item records

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy surfaced on error records as `errorCategory`.
///
/// - Admission: rejected before any decode attempt (size, extension)
/// - Decode: unreadable or unsupported image bytes
/// - Encode: the encoder rejected the transform or options
/// - ResourceLimit: dimension / pixel-count limits
/// - Internal: library bugs (should not happen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Admission,
    Decode,
    Encode,
    ResourceLimit,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Admission => "admission",
            ErrorCategory::Decode => "decode",
            ErrorCategory::Encode => "encode",
            ErrorCategory::ResourceLimit => "resource_limit",
            ErrorCategory::Internal => "internal",
        }
    }
}

/// Per-item error. Never escapes the item that raised it.
#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    // Admission Errors
    #[error("File size exceeds {}MB limit", .max / (1024 * 1024))]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported file format: {}", .extension.as_deref().unwrap_or("undefined"))]
    UnsupportedExtension { extension: Option<String> },

    // Decode Errors
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Input is empty")]
    EmptyInput,

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Operation Errors
    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl TranscodeError {
    pub fn file_too_large(size: u64, max: u64) -> Self {
        Self::FileTooLarge { size, max }
    }

    pub fn unsupported_extension(extension: Option<String>) -> Self {
        Self::UnsupportedExtension { extension }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn empty_input() -> Self {
        Self::EmptyInput
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Admission errors are detected before any codec work.
    pub fn is_admission(&self) -> bool {
        self.category() == ErrorCategory::Admission
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FileTooLarge { .. } | Self::UnsupportedExtension { .. } => {
                ErrorCategory::Admission
            }

            Self::DecodeFailed { .. } | Self::EmptyInput => ErrorCategory::Decode,

            // ResizeFailed is a transform failure on the way to the encoder;
            // the caller sees it the same way as a rejected encode.
            Self::EncodeFailed { .. } | Self::ResizeFailed { .. } => ErrorCategory::Encode,

            Self::DimensionExceedsLimit { .. } | Self::PixelCountExceedsLimit { .. } => {
                ErrorCategory::ResourceLimit
            }

            Self::InternalPanic { .. } => ErrorCategory::Internal,
        }
    }
}

/// Batch-level failure. Aborts the whole request; no per-item records.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(Cow<'static, str>),

    #[error("Malformed settings JSON: {0}")]
    SettingsJson(#[from] serde_json::Error),

    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Unreadable request body: {0}")]
    Multipart(String),

    #[error("Batch exceeded its {limit_ms}ms deadline (elapsed: {elapsed_ms}ms)")]
    DeadlineExceeded { elapsed_ms: u64, limit_ms: u64 },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Batch worker was lost: {0}")]
    Join(String),
}

impl BatchError {
    pub fn invalid_settings(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidSettings(reason.into())
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, TranscodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_messages_match_service_wording() {
        let err = TranscodeError::file_too_large(60 * 1024 * 1024, 50 * 1024 * 1024);
        assert_eq!(err.to_string(), "File size exceeds 50MB limit");

        let err = TranscodeError::unsupported_extension(Some("bmp".to_string()));
        assert_eq!(err.to_string(), "Unsupported file format: bmp");

        let err = TranscodeError::unsupported_extension(None);
        assert_eq!(err.to_string(), "Unsupported file format: undefined");
    }

    #[test]
    fn test_error_category_admission() {
        assert_eq!(
            TranscodeError::file_too_large(2, 1).category(),
            ErrorCategory::Admission
        );
        assert!(TranscodeError::unsupported_extension(None).is_admission());
    }

    #[test]
    fn test_error_category_codec() {
        assert_eq!(
            TranscodeError::decode_failed("bad").category(),
            ErrorCategory::Decode
        );
        assert_eq!(TranscodeError::empty_input().category(), ErrorCategory::Decode);
        assert_eq!(
            TranscodeError::encode_failed("webp", "bad").category(),
            ErrorCategory::Encode
        );
        assert_eq!(
            TranscodeError::resize_failed((10, 10), (5, 5), "bad").category(),
            ErrorCategory::Encode
        );
    }

    #[test]
    fn test_error_category_resource_and_internal() {
        assert_eq!(
            TranscodeError::dimension_exceeds_limit(40000, 32768).category(),
            ErrorCategory::ResourceLimit
        );
        assert_eq!(
            TranscodeError::pixel_count_exceeds_limit(200_000_000, 100_000_000).category(),
            ErrorCategory::ResourceLimit
        );
        assert_eq!(
            TranscodeError::internal_panic("boom").category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(ErrorCategory::Admission.as_str(), "admission");
        assert_eq!(ErrorCategory::ResourceLimit.as_str(), "resource_limit");
    }

    #[test]
    fn test_deadline_message() {
        let err = BatchError::DeadlineExceeded {
            elapsed_ms: 1500,
            limit_ms: 1000,
        };
        assert!(err.to_string().contains("1000ms"));
    }
}
