//! Sample workload: square an integer after a simulated delay.

use batchpool::CancellationToken;
use core::time::Duration;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Failure of a single attempt of the sample job.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum JobError {
    /// Failure injected through `--fail-first`.
    #[error("job {job} failed on attempt {attempt} (injected)")]
    Injected { job: u64, attempt: usize },

    /// The attempt noticed the run had been cancelled.
    #[error("job {job} interrupted")]
    Interrupted { job: u64 },
}

/// Squares jobs, failing the first `fail_first` attempts of each one.
///
/// Cheap to clone; clones share the attempt bookkeeping.
#[derive(Debug, Clone)]
pub struct SquareJob {
    latency: Duration,
    fail_first: usize,
    attempts: Arc<Mutex<HashMap<u64, usize>>>,
}

impl SquareJob {
    pub fn new(latency: Duration, fail_first: usize) -> Self {
        Self {
            latency,
            fail_first,
            attempts: Arc::default(),
        }
    }

    fn next_attempt(&self, job: u64) -> usize {
        // A poisoned map only loses bookkeeping; keep counting.
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = attempts.entry(job).or_default();
        *count += 1;
        *count
    }

    /// One attempt at `job`.
    pub async fn run(&self, cancel: CancellationToken, job: u64) -> Result<u64, JobError> {
        let attempt = self.next_attempt(job);

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(JobError::Interrupted { job }),
            () = tokio::time::sleep(self.latency) => {}
        }

        if attempt <= self.fail_first {
            return Err(JobError::Injected { job, attempt });
        }
        Ok(job * job)
    }
}
