use core::time::Duration;
use tokio_util::sync::CancellationToken;

/// Derives a token that is cancelled when `parent` is cancelled or once
/// `after` has elapsed, whichever happens first.
///
/// The timer runs on a detached Tokio task that exits as soon as the returned
/// token is cancelled by any means, so handing a short-lived run a long
/// deadline does not leave a timer behind. Must be called from within a Tokio
/// runtime.
///
/// # Example
/// ```
/// use batchpool::with_deadline;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let root = CancellationToken::new();
/// let run = with_deadline(&root, Duration::from_millis(10));
/// run.cancelled().await;
/// assert!(!root.is_cancelled());
/// # }
/// ```
pub fn with_deadline(parent: &CancellationToken, after: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            () = timer.cancelled() => {}
            () = tokio::time::sleep(after) => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    deadline_ms = crate::config::saturating_millis(after),
                    "Run deadline elapsed"
                );
                timer.cancel();
            }
        }
    });

    token
}
