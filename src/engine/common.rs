// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::{Result, TranscodeError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a codec stage, converting a panic into `InternalPanic`.
///
/// Native codecs (mozjpeg, libwebp) and the pure-Rust decoders can panic on
/// hostile input; a panic must end only the item that triggered it.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(TranscodeError::internal_panic(format!(
            "{stage} panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
