/// The outcome of one job, produced exactly once per job that was not
/// abandoned.
///
/// `outcome` holds the value of the first successful attempt, or the error of
/// the last attempt when every attempt failed. Earlier errors are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult<R, E> {
    /// Position of the job in the input batch.
    pub index: usize,
    /// Number of times the processing function was invoked for this job.
    pub attempts: usize,
    /// Value of the successful attempt or error of the final one.
    pub outcome: Result<R, E>,
}

impl<R, E> JobResult<R, E> {
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub const fn is_err(&self) -> bool {
        self.outcome.is_err()
    }

    /// Returns the produced value, if the job succeeded.
    pub fn value(&self) -> Option<&R> {
        self.outcome.as_ref().ok()
    }

    /// Returns the surfaced error, if every attempt failed.
    pub fn error(&self) -> Option<&E> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> Result<R, E> {
        self.outcome
    }
}

/// Returns the input positions of jobs that produced no [`JobResult`].
///
/// A run only drops jobs when it is cancelled, so this is empty for any run
/// that completed without cancellation. Indices are returned in ascending
/// order.
///
/// # Example
/// ```
/// use batchpool::{JobResult, abandoned_indices};
///
/// let results: Vec<JobResult<u32, ()>> = vec![
///     JobResult { index: 2, attempts: 1, outcome: Ok(9) },
///     JobResult { index: 0, attempts: 1, outcome: Ok(1) },
/// ];
/// assert_eq!(abandoned_indices(4, &results), vec![1, 3]);
/// ```
pub fn abandoned_indices<R, E>(job_count: usize, results: &[JobResult<R, E>]) -> Vec<usize> {
    let mut delivered = vec![false; job_count];
    for result in results {
        if let Some(slot) = delivered.get_mut(result.index) {
            *slot = true;
        }
    }
    delivered
        .iter()
        .enumerate()
        .filter_map(|(index, seen)| (!seen).then_some(index))
        .collect()
}
