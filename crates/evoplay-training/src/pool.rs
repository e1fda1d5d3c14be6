//! Bounded worker pool for fitness evaluations.

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder, prelude::*};

/// Runs evaluations on at most `max_workers` threads.
///
/// Jobs beyond `max_workers` queue until a worker is free. Results come back in input
/// order whatever the completion order was.
#[derive(Debug)]
pub struct EvaluationPool {
    pool: ThreadPool,
    max_workers: usize,
}

impl EvaluationPool {
    pub fn new(max_workers: usize) -> Result<Self, ThreadPoolBuildError> {
        let max_workers = max_workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("evaluator-{i}"))
            .build()?;
        debug!("evaluation pool started with {max_workers} worker(s)");
        Ok(Self { pool, max_workers })
    }

    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Applies `f` to every item; result `i` belongs to `items[i]`.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }
}
