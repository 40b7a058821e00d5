// lib.rs
//
// optipress: batch image transcoder
//
// Design goals:
// - One result per submitted file, in submission order
// - A bad file never takes down its batch
// - Smaller output than the input where the format allows it
// - Bounded memory under concurrent decodes

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "server")]
pub mod server;
pub mod settings;

pub use engine::{BatchExecutor, BatchOptions, InputItem, ResultRecord};
pub use error::{BatchError, ErrorCategory, Result, TranscodeError};
pub use settings::{ProcessingSettings, ResizeMode, ResizeSettings, TargetFormat};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Input extensions accepted by admission.
pub fn supported_input_formats() -> &'static [&'static str] {
    engine::SUPPORTED_INPUT_EXTENSIONS
}

/// Output formats with a dedicated encoder.
pub fn supported_output_formats() -> &'static [&'static str] {
    &["jpeg", "png", "webp", "avif", "tiff", "gif"]
}

/// Run one batch on a fresh executor with default options.
///
/// Servers should build one `BatchExecutor` and reuse it; this builds a
/// worker pool per call.
pub fn process_batch(
    items: &[InputItem],
    settings: &ProcessingSettings,
) -> std::result::Result<Vec<ResultRecord>, BatchError> {
    BatchExecutor::new(BatchOptions::default())?.run(items, settings)
}
