// src/engine.rs
//
// The core of optipress. A batch pipeline that, per item:
// 1. Admits or rejects on declared size and extension
// 2. Probes the header and plans the transform (resize box, encoder variant)
// 3. Decodes, resizes, re-encodes, and reports size savings
//
// This file is a facade over the decomposed modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
/// This is the same limit used by libvips/sharp.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod admission;
pub mod batch;
pub mod codec;
mod common;
pub mod decoder;
pub mod encoder;
pub mod memory;
pub mod metadata;
pub mod pipeline;
pub mod planner;
mod pool;
pub mod record;

pub use admission::{admit, file_extension, InputItem, MAX_FILE_SIZE, SUPPORTED_INPUT_EXTENSIONS};
pub use batch::{BatchExecutor, BatchOptions};
pub use codec::{Codec, NativeCodec};
pub use decoder::{check_dimensions, probe_metadata};
pub use planner::{
    fit_inside, plan_transform, should_resize, EncoderOptions, ResizePlan, SourceMetadata,
    TiffCompression, TransformPlan,
};
pub use pool::{build_pool, resolve_thread_count};
pub use record::{percentage_saved, ResultRecord};
