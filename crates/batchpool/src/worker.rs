use crate::{
    queue::{JobReceiver, QueuedJob},
    result::JobResult,
};
use core::{future::Future, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Retry settings copied into every worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_attempts: usize,
    pub retry_delay: Duration,
}

/// Worker task: pulls jobs until the queue is closed and drained or the run
/// is cancelled.
///
/// Each job is run through [`process_with_retry`] and its result pushed into
/// the result sink. Every wait (next job, retry delay, result send) races
/// `cancel`, and cancellation wins ties. A job interrupted by cancellation
/// yields no result.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker (used for logs/tracing and panic
///   reports).
/// - `jobs`: This worker's handle on the shared job queue.
/// - `results`: Sending half of the result sink. Dropping it on return is
///   what eventually closes the sink.
/// - `process`: The caller's processing function.
/// - `policy`: Attempt budget and delay between attempts.
/// - `cancel`: Run-wide cancellation token.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(worker = worker_id))
)]
pub(crate) async fn worker_loop<J, R, E, F, Fut>(
    worker_id: usize,
    jobs: JobReceiver<J>,
    results: mpsc::Sender<JobResult<R, E>>,
    process: &F,
    policy: RetryPolicy,
    cancel: CancellationToken,
) where
    J: Clone,
    F: Fn(CancellationToken, J) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        let queued = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} cancelled while idle");
                break;
            }
            queued = jobs.recv_async() => match queued {
                Ok(queued) => queued,
                // Closed and drained.
                Err(_) => break,
            },
        };

        let Some(result) = process_with_retry(queued, process, policy, &cancel).await
        else {
            break;
        };
        #[cfg(feature = "tracing")]
        let job_index = result.index;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    job = job_index,
                    "Worker {worker_id} cancelled before delivering a result"
                );
                break;
            }
            sent = results.send(result) => {
                if sent.is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {worker_id} found the result sink closed");
                    break;
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");

    #[cfg(not(feature = "tracing"))]
    let _ = worker_id;
}

/// Runs one job through `process` until it succeeds or the attempt budget is
/// spent.
///
/// Returns `None` when `cancel` fires during an attempt or during the delay
/// before the next one; the job is then abandoned. Otherwise the returned
/// result holds the first success or the error of the final attempt.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "trace", skip_all, fields(job = queued.index))
)]
pub(crate) async fn process_with_retry<J, R, E, F, Fut>(
    queued: QueuedJob<J>,
    process: &F,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Option<JobResult<R, E>>
where
    J: Clone,
    F: Fn(CancellationToken, J) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let QueuedJob { index, job } = queued;
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "Job {index} abandoned mid-attempt");
                return None;
            }
            outcome = process(cancel.clone(), job.clone()) => outcome,
        };

        match outcome {
            Ok(value) => {
                return Some(JobResult {
                    index,
                    attempts: attempt,
                    outcome: Ok(value),
                });
            }
            Err(err) if attempt >= max_attempts => {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempts = attempt, "Job {index} failed on its final attempt");
                return Some(JobResult {
                    index,
                    attempts: attempt,
                    outcome: Err(err),
                });
            }
            // Job errors are opaque here; the caller sees the last one.
            Err(_) => {}
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempt,
            delay_ms = crate::config::saturating_millis(policy.retry_delay),
            "Job {index} attempt failed, retrying"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "Job {index} abandoned during retry delay");
                return None;
            }
            () = tokio::time::sleep(policy.retry_delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::job_queue;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    const POLICY: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        retry_delay: Duration::from_millis(5),
    };

    fn queued<J>(index: usize, job: J) -> QueuedJob<J> {
        QueuedJob { index, job }
    }

    #[tokio::test]
    async fn first_success_stops_retrying() {
        let calls = AtomicUsize::new(0);
        let process = |_cancel: CancellationToken, job: u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(job * 2) }
        };

        let cancel = CancellationToken::new();
        let result = process_with_retry(queued(4, 21), &process, POLICY, &cancel)
            .await
            .unwrap();

        assert_eq!(result.index, 4);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let process = |_cancel: CancellationToken, job: u32| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call < 3 {
                    Err(format!("attempt {call} failed"))
                } else {
                    Ok(job)
                }
            }
        };

        let cancel = CancellationToken::new();
        let result = process_with_retry(queued(0, 7), &process, POLICY, &cancel)
            .await
            .unwrap();

        assert_eq!(result.outcome, Ok(7));
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_the_last_error() {
        let calls = AtomicUsize::new(0);
        let process = |_cancel: CancellationToken, _job: ()| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err::<(), _>(format!("attempt {call} failed")) }
        };

        let cancel = CancellationToken::new();
        let result = process_with_retry(queued(0, ()), &process, POLICY, &cancel)
            .await
            .unwrap();

        assert_eq!(result.outcome, Err("attempt 3 failed".to_string()));
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn zero_attempt_budget_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            retry_delay: Duration::ZERO,
        };
        let process =
            |_cancel: CancellationToken, _job: ()| async { Err::<(), _>("nope".to_string()) };

        let cancel = CancellationToken::new();
        let result = process_with_retry(queued(0, ()), &process, policy, &cancel)
            .await
            .unwrap();
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_retry_delay_abandons_job() {
        let policy = RetryPolicy {
            max_attempts: 2,
            retry_delay: Duration::from_secs(60),
        };
        let calls = AtomicUsize::new(0);
        let process = |_cancel: CancellationToken, _job: ()| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("fail".to_string()) }
        };

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            })
        };

        let result = process_with_retry(queued(0, ()), &process, policy, &cancel).await;
        canceller.await.unwrap();

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_slow_attempt() {
        let process = |_cancel: CancellationToken, _job: ()| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, String>(())
        };

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };

        let result = process_with_retry(queued(0, ()), &process, POLICY, &cancel).await;
        canceller.await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn worker_drains_queue_then_exits() {
        let (job_tx, job_rx) = job_queue(8);
        let (result_tx, mut result_rx) = mpsc::channel(8);
        for (index, job) in [1u32, 2, 3].into_iter().enumerate() {
            job_tx.send_async(queued(index, job)).await.unwrap();
        }
        drop(job_tx);

        let process = |_cancel: CancellationToken, job: u32| async move { Ok::<_, String>(job * job) };
        worker_loop(
            0,
            job_rx,
            result_tx,
            &process,
            POLICY,
            CancellationToken::new(),
        )
        .await;

        let mut values = Vec::new();
        while let Some(result) = result_rx.recv().await {
            values.push(result.outcome.unwrap());
        }
        assert_eq!(values, vec![1, 4, 9]);
    }

    #[tokio::test]
    async fn cancelled_worker_emits_nothing() {
        let (job_tx, job_rx) = job_queue(8);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult<u32, String>>(8);
        job_tx.send_async(queued(0, 1u32)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let seen = Arc::new(AtomicUsize::new(0));
        let process = {
            let seen = Arc::clone(&seen);
            move |_cancel: CancellationToken, job: u32| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok(job) }
            }
        };
        worker_loop(0, job_rx, result_tx, &process, POLICY, cancel).await;

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(result_rx.recv().await.is_none());
        // The job stays queued; the worker never took it.
        assert_eq!(job_tx.len(), 1);
    }
}
