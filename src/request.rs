use std::future::Future;
use std::time::Duration;

use tokio::time;

/// Result of a fallible request that was given a deadline.
#[derive(Debug)]
pub enum RequestOutcome<T, E> {
    Completed(T),
    TimedOut(Duration),
    Failed(E),
}

impl<T, E> RequestOutcome<T, E> {
    pub fn into_result(self, on_timeout: impl FnOnce(Duration) -> E) -> Result<T, E> {
        match self {
            RequestOutcome::Completed(value) => Ok(value),
            RequestOutcome::TimedOut(limit) => Err(on_timeout(limit)),
            RequestOutcome::Failed(err) => Err(err),
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, RequestOutcome::TimedOut(_))
    }
}

/// Drives `request` until it finishes or `limit` elapses. On timeout the
/// request future is dropped, cancelling whatever it had in flight.
pub async fn with_timeout<F, T, E>(limit: Duration, request: F) -> RequestOutcome<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match time::timeout(limit, request).await {
        Ok(Ok(value)) => RequestOutcome::Completed(value),
        Ok(Err(err)) => RequestOutcome::Failed(err),
        Err(_) => RequestOutcome::TimedOut(limit),
    }
}
