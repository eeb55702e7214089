//! Shared "poll until predicate or deadline" loop.
//!
//! Every scan phase and the scanner startup probe wait on the same shape:
//! call a status endpoint, stop when a predicate holds, otherwise sleep a
//! fixed interval. Only some callers carry a deadline.

use std::future::Future;

use tokio::time::{sleep, Duration, Instant};

/// How often to poll and for how long at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub deadline: Option<Duration>,
}

impl PollSpec {
    pub fn every(interval: Duration) -> Self {
        Self { interval, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Completed(T),
    /// Deadline reached; carries the last observed value.
    TimedOut(T),
}

impl<T> PollOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, PollOutcome::Completed(_))
    }
}

/// Calls `probe` until `done` accepts its value or the deadline passes.
///
/// A probe error ends the loop immediately; nothing is retried.
pub async fn poll_until<T, E, F, Fut, P>(spec: PollSpec, mut probe: F, mut done: P) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    let started = Instant::now();
    loop {
        let value = probe().await?;
        if done(&value) {
            return Ok(PollOutcome::Completed(value));
        }

        let pause = match spec.deadline {
            Some(limit) => {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Ok(PollOutcome::TimedOut(value));
                }
                spec.interval.min(limit - elapsed)
            }
            None => spec.interval,
        };
        sleep(pause).await;
    }
}
