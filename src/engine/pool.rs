// src/engine/pool.rs
//
// Global thread pool for batch processing.
//
// One process-wide rayon pool is shared by every batch instead of building a
// pool per call. It is created lazily on first use; later changes to
// PIXPIPE_THREADS have no effect.
//
// Thread count: PIXPIPE_THREADS when set and positive, otherwise
// available_parallelism() (which respects cgroup CPU quotas), at least one.

use super::pipeline::{EncodedImage, Pipeline};
use crate::error::Result;
use crate::ops::ProcessOptions;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn configured_threads() -> usize {
    std::env::var("PIXPIPE_THREADS")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_THREADS)
        })
        .max(MIN_THREADS)
}

/// The shared batch pool. `None` when no pool could be built; batches then run
/// on rayon's global pool.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let threads = configured_threads();
            match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("pixpipe-{i}"))
                .build()
            {
                Ok(pool) => {
                    debug!(threads, "batch pool ready");
                    Some(pool)
                }
                Err(e) => {
                    warn!(threads, error = %e, "failed to build batch pool");
                    None
                }
            }
        })
        .as_ref()
}

/// One independent request in a batch.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub bytes: Vec<u8>,
    pub options: ProcessOptions,
}

impl BatchItem {
    pub fn new(bytes: Vec<u8>, options: ProcessOptions) -> Self {
        Self { bytes, options }
    }
}

/// Run every item through `pipeline` in parallel.
///
/// Items do not share state and one failure does not affect the others.
/// Results are in input order.
pub fn process_batch(pipeline: &Pipeline, items: Vec<BatchItem>) -> Vec<Result<EncodedImage>> {
    let run = || {
        items
            .par_iter()
            .map(|item| pipeline.process(&item.bytes, &item.options))
            .collect::<Vec<_>>()
    };
    let results = match get_pool() {
        Some(pool) => pool.install(run),
        None => run(),
    };
    debug!(
        items = results.len(),
        failed = results.iter().filter(|r| r.is_err()).count(),
        "batch finished"
    );
    results
}
