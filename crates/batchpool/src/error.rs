//! Error types raised by the pool itself.
//!
//! Job failures are never reported here: they live inside each
//! [`JobResult`](crate::JobResult) so a failing job cannot abort the run. The
//! [`Error`] enum only covers problems with the run as a whole.
//!
//! ## Error Cases
//! - `InvalidConfig`: the [`PoolConfig`](crate::PoolConfig) was rejected
//!   before any worker started.
//! - `WorkerPanicked`: a processing function panicked and unwound its worker.

/// A result type defaulting to the pool [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors a run can produce outside of individual job outcomes.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The configuration was rejected before any work started.
    #[error("Invalid pool config: {reason}")]
    InvalidConfig { reason: String },

    /// A worker task unwound while processing a job.
    ///
    /// The remaining workers are allowed to finish the batch before this is
    /// reported, so results collected up to that point are discarded.
    #[error("Worker {worker_id} panicked while processing a job")]
    WorkerPanicked { worker_id: usize },
}

impl Error {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
