use crate::error::{Error, Result};
use core::time::Duration;

/// Sizing and retry settings for a single run of the pool.
///
/// A config is immutable for the lifetime of one run. Every field may be set
/// directly or through the consuming `with_*` methods; [`PoolConfig::validate`]
/// is applied by [`Pool::new`] and [`run_pool`] before anything is spawned.
///
/// # Example
/// ```
/// use batchpool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::default()
///     .with_worker_count(5)
///     .with_queue_size(20)
///     .with_max_retries(2)
///     .with_retry_delay(Duration::from_millis(200));
///
/// assert_eq!(config.max_attempts(), 3);
/// assert!(config.validate().is_ok());
/// ```
///
/// [`Pool::new`]: crate::Pool::new
/// [`run_pool`]: crate::run_pool
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Number of workers processing jobs concurrently. Must be at least one.
    pub worker_count: usize,

    /// Number of jobs buffered between the feeder and the workers.
    ///
    /// Zero gives a hand-off queue: the feeder waits for a worker to take
    /// each job.
    pub queue_size: usize,

    /// Additional attempts made after a job's first failure.
    pub max_retries: usize,

    /// Fixed pause between a failed attempt and the next one.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            queue_size: 0,
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    /// Creates a config from its four settings.
    pub const fn new(
        worker_count: usize,
        queue_size: usize,
        max_retries: usize,
        retry_delay: Duration,
    ) -> Self {
        Self {
            worker_count,
            queue_size,
            max_retries,
            retry_delay,
        }
    }

    /// Set the number of concurrent workers
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the job queue capacity
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Set the number of retries after the first failed attempt
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between attempts
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Total number of times a job may be handed to the processing function.
    pub const fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Rejects configurations that could never make progress.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `worker_count` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::invalid_config("worker_count must be greater than 0"));
        }
        Ok(())
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[cfg_attr(not(any(feature = "tracing", feature = "serde")), allow(dead_code))]
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serde support for Duration as milliseconds
#[cfg(feature = "serde")]
mod duration_millis {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::saturating_millis(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
