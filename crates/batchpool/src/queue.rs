//! Bounded job queue shared by every worker, and the feeder that fills it.
//!
//! The queue is a [`flume`] channel so each worker holds its own cloned
//! receiver and no worker holds a lock while parked on `recv_async()`.
//! Dropping the last [`JobSender`] closes the queue; workers drain what is
//! buffered and then observe the close.

use tokio_util::sync::CancellationToken;

/// A job tagged with its position in the input batch.
#[derive(Debug)]
pub(crate) struct QueuedJob<J> {
    pub index: usize,
    pub job: J,
}

pub(crate) type JobSender<J> = flume::Sender<QueuedJob<J>>;
pub(crate) type JobReceiver<J> = flume::Receiver<QueuedJob<J>>;

/// Creates the job queue with room for `capacity` buffered jobs.
///
/// A zero `capacity` gives a rendezvous queue: every send waits until a
/// worker takes the job.
pub(crate) fn job_queue<J>(capacity: usize) -> (JobSender<J>, JobReceiver<J>) {
    flume::bounded(capacity)
}

/// Why the feeder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedEnd {
    /// Every job was enqueued.
    Exhausted,
    /// The cancellation token fired before all jobs were enqueued.
    Cancelled { fed: usize },
    /// Every worker dropped its receiver.
    Disconnected { fed: usize },
}

/// Pushes `jobs` into the queue in input order, then closes it.
///
/// Each enqueue races `cancel`; cancellation wins when both are ready and the
/// remaining jobs are dropped. The queue is closed exactly once on every exit
/// path because `tx` is consumed and dropped here.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(jobs = jobs.len())))]
pub(crate) async fn feed<J>(
    tx: JobSender<J>,
    jobs: Vec<J>,
    cancel: &CancellationToken,
) -> FeedEnd {
    for (index, job) in jobs.into_iter().enumerate() {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(fed = index, "Feeder cancelled; dropping remaining jobs");
                return FeedEnd::Cancelled { fed: index };
            }
            sent = tx.send_async(QueuedJob { index, job }) => {
                if sent.is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(fed = index, "Job queue has no consumers left");
                    return FeedEnd::Disconnected { fed: index };
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("All jobs enqueued; closing job queue");
    FeedEnd::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feeds_in_order_then_closes() {
        let (tx, rx) = job_queue(4);
        let cancel = CancellationToken::new();

        let end = feed(tx, vec!['a', 'b', 'c'], &cancel).await;
        assert_eq!(end, FeedEnd::Exhausted);

        let mut seen = Vec::new();
        while let Ok(queued) = rx.recv_async().await {
            seen.push((queued.index, queued.job));
        }
        assert_eq!(seen, vec![(0, 'a'), (1, 'b'), (2, 'c')]);
        assert!(rx.is_disconnected());
    }

    #[tokio::test]
    async fn cancellation_stops_a_blocked_feeder() {
        let (tx, rx) = job_queue(1);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(core::time::Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        // One slot and nobody reading: the second send blocks until cancelled.
        let end = feed(tx, vec![1, 2, 3], &cancel).await;
        canceller.await.unwrap();

        assert_eq!(end, FeedEnd::Cancelled { fed: 1 });
        assert_eq!(rx.recv_async().await.unwrap().job, 1);
        assert!(rx.recv_async().await.is_err(), "queue must be closed");
    }

    #[tokio::test]
    async fn already_cancelled_feeds_nothing() {
        let (tx, rx) = job_queue::<u8>(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let end = feed(tx, vec![1, 2], &cancel).await;
        assert_eq!(end, FeedEnd::Cancelled { fed: 0 });
        assert!(rx.is_empty());
        assert!(rx.is_disconnected());
    }

    #[tokio::test]
    async fn zero_capacity_buffers_nothing() {
        let (tx, rx) = job_queue(0);

        // Nobody is waiting, so there is nowhere to put the job.
        assert!(matches!(
            tx.try_send(QueuedJob { index: 0, job: 'a' }),
            Err(flume::TrySendError::Full(_))
        ));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_feeder_hands_off_to_a_waiting_worker() {
        let (tx, rx) = job_queue(0);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(queued) = rx.recv_async().await {
                seen.push(queued.job);
            }
            seen
        });

        let end = feed(tx, vec![1, 2, 3], &cancel).await;
        assert_eq!(end, FeedEnd::Exhausted);
        assert_eq!(worker.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_capacity_feeder_blocks_until_cancelled() {
        let (tx, rx) = job_queue(0);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(core::time::Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let end = feed(tx, vec!['a', 'b'], &cancel).await;
        canceller.await.unwrap();

        assert_eq!(end, FeedEnd::Cancelled { fed: 0 });
        assert!(rx.recv_async().await.is_err(), "nothing was handed off");
    }

    #[tokio::test]
    async fn stops_when_consumers_are_gone() {
        let (tx, rx) = job_queue(1);
        drop(rx);
        let cancel = CancellationToken::new();

        let end = feed(tx, vec![1, 2], &cancel).await;
        assert_eq!(end, FeedEnd::Disconnected { fed: 0 });
    }
}
