// src/engine/codec.rs
//
// The codec seam: everything the batch executor needs from an image library.

use crate::engine::decoder::{decode_image, probe_metadata};
use crate::engine::encoder;
use crate::engine::metadata::extract_metadata;
use crate::engine::pipeline::apply_plan;
use crate::engine::planner::{EncoderOptions, SourceMetadata, TransformPlan};
use crate::error::{Result, TranscodeError};

/// Image capability used by the executor. Implementations must be safe to
/// call from many workers at once.
pub trait Codec: Send + Sync {
    /// Format and dimensions from encoded bytes, without a full decode.
    fn decode_metadata(&self, bytes: &[u8]) -> Result<SourceMetadata>;

    /// Decode, apply the plan, and encode.
    fn encode(&self, bytes: &[u8], plan: &TransformPlan) -> Result<Vec<u8>>;
}

/// Codec backed by mozjpeg, libwebp, ravif, imagequant, oxipng, resvg and
/// the image crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeCodec;

impl Codec for NativeCodec {
    fn decode_metadata(&self, bytes: &[u8]) -> Result<SourceMetadata> {
        probe_metadata(bytes)
    }

    fn encode(&self, bytes: &[u8], plan: &TransformPlan) -> Result<Vec<u8>> {
        let (img, source) = decode_image(bytes)?;
        let options = resolve_encoder(&plan.encoder, &source.format)?;
        let metadata = plan
            .preserve_metadata
            .then(|| extract_metadata(bytes))
            .filter(|meta| !meta.is_empty());

        let img = apply_plan(img, plan)?;
        encoder::encode(&img, &options, metadata.as_ref())
    }
}

/// Replace `Passthrough` with the source format's default options.
pub fn resolve_encoder(options: &EncoderOptions, source_format: &str) -> Result<EncoderOptions> {
    match options {
        EncoderOptions::Passthrough => EncoderOptions::source_defaults(source_format)
            .ok_or_else(|| {
                TranscodeError::encode_failed(
                    source_format.to_string(),
                    "no encoder available to re-encode source format",
                )
            }),
        concrete => Ok(concrete.clone()),
    }
}
