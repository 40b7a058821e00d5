// src/engine/pool.rs
//
// Worker pool for batch processing.
//
// One pool is built per executor and reused for every batch it runs; building
// a pool per request costs milliseconds of thread spawn for nothing.
//
// Thread count:
// - 0 means "detect": std::thread::available_parallelism() (respects cgroup/CPU quota)
// - Fallback is MIN_THREADS when detection fails

use crate::error::BatchError;
use rayon::ThreadPool;

/// Minimum number of worker threads
const MIN_THREADS: usize = 1;

/// Upper bound on an explicitly requested thread count
pub const MAX_THREADS: usize = 1024;

/// Resolve a configured thread count (0 = auto) to a concrete one.
pub fn resolve_thread_count(requested: usize) -> usize {
    if requested == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_THREADS)
    } else {
        requested.clamp(MIN_THREADS, MAX_THREADS)
    }
}

/// Build the worker pool that runs per-item transforms.
pub fn build_pool(requested_threads: usize) -> Result<ThreadPool, BatchError> {
    let num_threads = resolve_thread_count(requested_threads);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("optipress-worker-{i}"))
        .build()?;
    tracing::debug!(num_threads, "worker pool ready");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_detected_parallelism() {
        assert!(resolve_thread_count(0) >= MIN_THREADS);
    }

    #[test]
    fn test_explicit_counts_are_clamped() {
        assert_eq!(resolve_thread_count(3), 3);
        assert_eq!(resolve_thread_count(MAX_THREADS + 10), MAX_THREADS);
    }

    #[test]
    fn test_pool_has_requested_threads() {
        let pool = build_pool(2).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        let name = pool.install(|| std::thread::current().name().map(str::to_owned));
        assert!(name.unwrap().starts_with("optipress-worker-"));
    }
}
