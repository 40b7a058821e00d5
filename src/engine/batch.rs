// src/engine/batch.rs
//
// Batch executor: settle-all processing of independent items.
//
// - every item yields exactly one record, in input order
// - an item's failure (error or panic) becomes its own error record
// - the batch fails as a whole only on a deadline breach
//
// Memory permits are taken on the calling thread, never on a pool worker:
// codecs run nested rayon work, and a worker waiting on that work may steal
// another item's job, which must not block while the thread holds a permit.

use crate::engine::admission::{admit, InputItem};
use crate::engine::codec::{Codec, NativeCodec};
use crate::engine::common::run_with_panic_policy;
use crate::engine::memory::{estimate_item_bytes, WeightedSemaphore};
use crate::engine::planner::{plan_transform, SourceMetadata, TransformPlan};
use crate::engine::pool::build_pool;
use crate::engine::record::{ResultRecord, SuccessParts};
use crate::error::{BatchError, Result, TranscodeError};
use crate::settings::ProcessingSettings;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default wall-clock bound for one batch.
pub const DEFAULT_BATCH_DEADLINE: Duration = Duration::from_secs(120);

/// Default byte budget for concurrently decoded images.
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOptions {
    /// Worker threads; 0 = available parallelism.
    pub worker_threads: usize,
    /// Batch wall-clock bound; `None` disables it.
    pub deadline: Option<Duration>,
    pub memory_budget_bytes: u64,
    /// Attach `originalDataUrl` to success records.
    pub include_original: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            deadline: Some(DEFAULT_BATCH_DEADLINE),
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            include_original: true,
        }
    }
}

/// An item after admission and planning.
enum Staged {
    Settled(ResultRecord),
    Planned {
        source: SourceMetadata,
        plan: TransformPlan,
    },
}

pub struct BatchExecutor {
    codec: Arc<dyn Codec>,
    pool: ThreadPool,
    memory: Arc<WeightedSemaphore>,
    options: BatchOptions,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("threads", &self.pool.current_num_threads())
            .field("memory_capacity", &self.memory.capacity())
            .field("options", &self.options)
            .finish()
    }
}

impl BatchExecutor {
    /// Executor over the native codec stack.
    pub fn new(options: BatchOptions) -> std::result::Result<Self, BatchError> {
        Self::with_codec(NativeCodec, options)
    }

    pub fn with_codec(
        codec: impl Codec + 'static,
        options: BatchOptions,
    ) -> std::result::Result<Self, BatchError> {
        Ok(Self {
            codec: Arc::new(codec),
            pool: build_pool(options.worker_threads)?,
            memory: Arc::new(WeightedSemaphore::new(options.memory_budget_bytes)),
            options,
        })
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run a batch under the configured deadline.
    pub fn run(
        &self,
        items: &[InputItem],
        settings: &ProcessingSettings,
    ) -> std::result::Result<Vec<ResultRecord>, BatchError> {
        self.run_with_deadline(items, settings, self.options.deadline)
    }

    /// Run a batch under a caller-supplied deadline.
    ///
    /// Items are not cancelled when the deadline passes; every item settles
    /// first, then a breach fails the whole batch.
    #[tracing::instrument(skip_all, fields(items = items.len(), format = %settings.format))]
    pub fn run_with_deadline(
        &self,
        items: &[InputItem],
        settings: &ProcessingSettings,
        deadline: Option<Duration>,
    ) -> std::result::Result<Vec<ResultRecord>, BatchError> {
        let started = Instant::now();

        // header reads only; nothing here waits on the memory budget
        let staged: Vec<Staged> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| self.stage_item(item, settings))
                .collect()
        });

        // one slot per item keeps input order regardless of completion order
        let slots: Vec<Mutex<Option<ResultRecord>>> =
            items.iter().map(|_| Mutex::new(None)).collect();

        self.pool.in_place_scope(|scope| {
            for ((item, stage), slot) in items.iter().zip(staged).zip(&slots) {
                match stage {
                    Staged::Settled(record) => *slot.lock() = Some(record),
                    Staged::Planned { source, plan } => {
                        let permit = self
                            .memory
                            .acquire(estimate_item_bytes(&source, item.bytes.len(), &plan));
                        scope.spawn(move |_| {
                            let record = self.finish_item(item, settings, &source, &plan);
                            drop(permit);
                            *slot.lock() = Some(record);
                        });
                    }
                }
            }
        });

        let records: Vec<ResultRecord> = slots
            .into_iter()
            .filter_map(Mutex::into_inner)
            .collect();

        let elapsed = started.elapsed();
        if let Some(limit) = deadline {
            if elapsed > limit {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    limit_ms = limit.as_millis() as u64,
                    "batch deadline exceeded"
                );
                return Err(BatchError::DeadlineExceeded {
                    elapsed_ms: elapsed.as_millis() as u64,
                    limit_ms: limit.as_millis() as u64,
                });
            }
        }

        let failed = records.iter().filter(|r| r.is_error()).count();
        info!(
            succeeded = records.len() - failed,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "batch complete"
        );
        Ok(records)
    }

    /// Admission, header probe and plan. Failures settle here.
    fn stage_item(&self, item: &InputItem, settings: &ProcessingSettings) -> Staged {
        let staged = run_with_panic_policy("item", || {
            admit(item)?;
            let source = self.codec.decode_metadata(&item.bytes)?;
            let plan = plan_transform(&source, settings);
            Ok((source, plan))
        });
        match staged {
            Ok((source, plan)) => Staged::Planned { source, plan },
            Err(err) => Staged::Settled(self.failure(item, settings, &err)),
        }
    }

    /// Codec work for a planned item. Runs on a pool worker under a permit.
    fn finish_item(
        &self,
        item: &InputItem,
        settings: &ProcessingSettings,
        source: &SourceMetadata,
        plan: &TransformPlan,
    ) -> ResultRecord {
        match run_with_panic_policy("item", || self.transform(item, settings, source, plan)) {
            Ok(record) => record,
            Err(err) => self.failure(item, settings, &err),
        }
    }

    fn failure(
        &self,
        item: &InputItem,
        settings: &ProcessingSettings,
        err: &TranscodeError,
    ) -> ResultRecord {
        warn!(
            name = %item.name,
            category = err.category().as_str(),
            error = %err,
            "item failed"
        );
        ResultRecord::failure(&item.name, item.declared_size, settings.format.as_str(), err)
    }

    fn transform(
        &self,
        item: &InputItem,
        settings: &ProcessingSettings,
        source: &SourceMetadata,
        plan: &TransformPlan,
    ) -> Result<ResultRecord> {
        let processed = self.codec.encode(&item.bytes, plan)?;
        let output = self.codec.decode_metadata(&processed)?;

        debug!(
            name = %item.name,
            original_size = item.bytes.len(),
            processed_size = processed.len(),
            width = output.width,
            height = output.height,
            "item processed"
        );

        ResultRecord::success(SuccessParts {
            original_name: &item.name,
            original_bytes: &item.bytes,
            original_format: &source.format,
            processed_bytes: &processed,
            processed_format: settings.format.as_str(),
            width: output.width,
            height: output.height,
            include_original: self.options.include_original,
        })
    }
}
