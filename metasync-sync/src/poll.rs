//! Scheduled-tick polling of remote jobs under a wall-clock budget.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use metasync_remote::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug)]
pub enum PollOutcome<T> {
    Done(T),
    TimedOut { elapsed: Duration },
}

/// Sleep one interval, check elapsed time against the budget, then issue a
/// status check; repeat until `is_done` accepts a status. Check errors end
/// the loop immediately and are never retried here.
pub async fn poll_until<T, F, Fut>(
    budget: PollBudget,
    mut check: F,
    is_done: impl Fn(&T) -> bool,
) -> Result<PollOutcome<T>, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let started = Instant::now();
    let mut ticks = 0u32;
    loop {
        sleep(budget.interval).await;
        let elapsed = started.elapsed();
        if elapsed >= budget.timeout {
            tracing::warn!(ticks, elapsed_ms = elapsed.as_millis() as u64, "poll budget exhausted");
            return Ok(PollOutcome::TimedOut { elapsed });
        }
        ticks += 1;
        let status = check().await?;
        if is_done(&status) {
            tracing::debug!(ticks, elapsed_ms = elapsed.as_millis() as u64, "poll finished");
            return Ok(PollOutcome::Done(status));
        }
    }
}
