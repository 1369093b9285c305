//! Run coordinator: wires the job queue, workers, feeder, and result sink
//! together for one batch.
//!
//! A run proceeds as follows:
//!
//! 1. The job queue (bounded, multi-consumer) and the result sink (capacity =
//!    number of jobs) are allocated.
//! 2. `worker_count` workers are spawned onto the Tokio runtime, each holding
//!    a receiver clone of the queue and a sender clone of the sink.
//! 3. The feeder and the drain loop run concurrently on the caller's task.
//!    The feeder closes the queue when it returns; the sink closes once the
//!    last worker drops its sender.
//! 4. Every worker is joined before the collected results are returned, so no
//!    task outlives the run.
//!
//! Dropping the run future before it completes aborts every worker and
//! cancels the token handed to the processing function.

use crate::{
    config::PoolConfig,
    error::{Error, Result},
    queue::{feed, job_queue},
    result::JobResult,
    worker::{RetryPolicy, worker_loop},
};
use core::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::AbortOnDropHandle};

/// A validated pool configuration ready to run batches.
///
/// Construction fails fast on an invalid [`PoolConfig`], so a `Pool` can be
/// built once at startup and reused for any number of independent runs.
///
/// # Example
/// ```
/// use batchpool::{Pool, PoolConfig};
/// use std::time::Duration;
/// use tokio_util::{sync::CancellationToken, task::AbortOnDropHandle};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> batchpool::Result<()> {
/// let pool = Pool::new(PoolConfig::new(2, 2, 1, Duration::from_millis(10)))?;
/// let cancel = CancellationToken::new();
///
/// let results = pool
///     .run(&cancel, vec![1u64, 2, 3], |_cancel, x| async move {
///         Ok::<_, std::convert::Infallible>(x * x)
///     })
///     .await?;
///
/// let mut values: Vec<u64> = results.into_iter().filter_map(|r| r.outcome.ok()).collect();
/// values.sort_unstable();
/// assert_eq!(values, vec![1, 4, 9]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pool {
    config: PoolConfig,
}

impl Pool {
    /// Validates `config` and returns a pool that runs batches with it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the config is rejected by
    /// [`PoolConfig::validate`].
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Processes `jobs` with at most `worker_count` concurrent calls to
    /// `process`, retrying failures with the configured fixed delay.
    ///
    /// Results are returned in completion order. Without cancellation there is
    /// exactly one result per job. Once `cancel` fires, jobs not yet dequeued
    /// and jobs whose attempt, retry delay, or result delivery was interrupted
    /// produce no result; [`abandoned_indices`] recovers which ones.
    ///
    /// The returned future completes only after every worker has stopped. If
    /// it is dropped early, the workers are aborted and the token passed to
    /// `process` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPanicked`] if `process` panicked. Job failures
    /// are never returned here; they are carried by each [`JobResult`].
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime, since workers are spawned
    /// with [`tokio::spawn`].
    ///
    /// [`abandoned_indices`]: crate::abandoned_indices
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "info",
            name = "pool_run",
            skip_all,
            fields(jobs = jobs.len(), workers = self.config.worker_count)
        )
    )]
    pub async fn run<J, R, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        jobs: Vec<J>,
        process: F,
    ) -> Result<Vec<JobResult<R, E>>>
    where
        J: Clone + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(CancellationToken, J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = core::result::Result<R, E>> + Send + 'static,
    {
        let job_count = jobs.len();
        if job_count == 0 {
            return Ok(Vec::new());
        }

        let policy = RetryPolicy {
            max_attempts: self.config.max_attempts(),
            retry_delay: self.config.retry_delay,
        };
        // Scoped to this run: cancelled when the run returns or is dropped.
        let run_cancel = cancel.child_token();
        let _run_guard = run_cancel.clone().drop_guard();

        let (job_tx, job_rx) = job_queue::<J>(self.config.queue_size);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult<R, E>>(job_count);
        let process = Arc::new(process);

        let workers: Vec<_> = (0..self.config.worker_count)
            .map(|worker_id| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let process = Arc::clone(&process);
                let cancel = run_cancel.clone();
                AbortOnDropHandle::new(tokio::spawn(async move {
                    worker_loop(worker_id, jobs, results, &*process, policy, cancel).await;
                }))
            })
            .collect();
        // Workers own the only remaining handles: the sink closes when the
        // last worker exits, and the feeder sees a disconnect if they all do.
        drop(job_rx);
        drop(result_tx);

        let drain = async {
            let mut results = Vec::with_capacity(job_count);
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        };
        let (_feed_end, results) = tokio::join!(feed(job_tx, jobs, &run_cancel), drain);

        let mut panicked = None;
        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(_err) = handle.await {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker {worker_id} terminated abnormally: {_err}");
                panicked.get_or_insert(worker_id);
            }
        }

        #[cfg(feature = "tracing")]
        {
            let failed = results.iter().filter(|r| r.is_err()).count();
            tracing::info!(
                delivered = results.len(),
                failed,
                abandoned = job_count - results.len(),
                cancelled = cancel.is_cancelled(),
                feeder = ?_feed_end,
                "Pool run finished"
            );
        }

        match panicked {
            Some(worker_id) => Err(Error::WorkerPanicked { worker_id }),
            None => Ok(results),
        }
    }
}

/// Validates `config` and processes `jobs` in one call.
///
/// Equivalent to `Pool::new(config)?.run(cancel, jobs, process).await`; see
/// [`Pool::run`] for the full contract.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] before spawning anything if `config` is
/// invalid, and [`Error::WorkerPanicked`] if `process` panicked.
pub async fn run_pool<J, R, E, F, Fut>(
    cancel: &CancellationToken,
    config: PoolConfig,
    jobs: Vec<J>,
    process: F,
) -> Result<Vec<JobResult<R, E>>>
where
    J: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(CancellationToken, J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = core::result::Result<R, E>> + Send + 'static,
{
    Pool::new(config)?.run(cancel, jobs, process).await
}
