//! Wait - Bounded polling for eventually consistent remote operations

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between two checks
    pub interval: Duration,
    /// Give up once this much time has passed since the first check
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// How a poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The check reported completion
    Converged,
    /// The deadline passed before the check reported completion
    TimedOut,
}

/// Error raised by a poll loop
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("polling was cancelled")]
    Cancelled,

    #[error("{0}")]
    Check(E),
}

/// Run `check` until it returns `true`, the deadline passes or `cancel` fires
///
/// The first check runs immediately. A timeout is not an error: the caller
/// decides what an unconverged result means. Errors from `check` end the loop.
pub async fn poll_until<F, Fut, E>(
    config: &PollConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<PollOutcome, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + config.timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        if check().await.map_err(PollError::Check)? {
            return Ok(PollOutcome::Converged);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut);
        }

        let delay = config.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
