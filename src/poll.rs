use std::{future::Future, time::Duration};

use tokio::time::{sleep, timeout, Instant};

use crate::error::{Error, PollTarget, Result, TimeoutError};

/// What one status poll observed.
pub(crate) enum Observation<T> {
    /// A terminal state was reached.
    Done(T),

    /// Still in progress, with the status the CA reported.
    InProgress(String),
}

/// Bounded poll loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Poller {
    pub(crate) target: PollTarget,
    pub(crate) timeout: Duration,
    pub(crate) interval: Duration,
}

impl Poller {
    /// Calls `observe` until it reports a terminal state.
    ///
    /// Between observations the task sleeps for `interval`. If the next observation could only
    /// happen after `timeout` has elapsed since the first one, the loop stops without issuing it
    /// and returns a [`TimeoutError`]. An observation still in flight when `timeout` runs out is
    /// dropped with the same error. Errors from `observe` end the loop immediately.
    pub(crate) async fn run<T, F, Fut>(self, mut observe: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>>>,
    {
        let started = Instant::now();
        let mut polls = 0;
        let mut last_status = String::from("unknown");

        loop {
            polls += 1;

            let remaining = self.timeout.saturating_sub(started.elapsed());
            let observation = match timeout(remaining, observe()).await {
                Ok(observation) => observation?,
                Err(_) => {
                    log::debug!("{} timed out waiting for poll {polls}", self.target);
                    return Err(self.timed_out(polls, last_status));
                }
            };

            let status = match observation {
                Observation::Done(value) => {
                    log::debug!("{} finished after {polls} polls", self.target);
                    return Ok(value);
                }
                Observation::InProgress(status) => status,
            };

            if started.elapsed() + self.interval > self.timeout {
                log::debug!("{} timed out in status {status}", self.target);
                return Err(self.timed_out(polls, status));
            }

            log::trace!("{} is {status}, polling again in {:?}", self.target, self.interval);
            last_status = status;
            sleep(self.interval).await;
        }
    }

    fn timed_out(self, polls: u32, last_status: String) -> Error {
        TimeoutError {
            target: self.target,
            timeout: self.timeout,
            polls,
            last_status,
        }
        .into()
    }
}
