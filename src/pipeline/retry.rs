use crate::config::WatchlistConfig;
use crate::scraper::SectionError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WatchlistConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::ZERO,
        }
    }
}

/// Result of running one section under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub enum SectionOutcome<T> {
    Success(T),
    Exhausted { placeholder: T, last_error: String },
}

impl<T> SectionOutcome<T> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SectionOutcome::Exhausted { .. })
    }

    pub fn into_value(self) -> T {
        match self {
            SectionOutcome::Success(v) => v,
            SectionOutcome::Exhausted { placeholder, .. } => placeholder,
        }
    }
}

/// Runs `op` until it succeeds or `policy.max_attempts` attempts have failed,
/// in which case the outcome carries `placeholder()` and the last error.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    placeholder: impl FnOnce() -> T,
    mut op: F,
) -> SectionOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SectionError>>,
{
    let strategy = FixedInterval::new(policy.delay).take(policy.max_attempts.saturating_sub(1));
    let max = policy.max_attempts.max(1);
    let mut attempt = 0usize;

    let result = Retry::spawn(strategy, || {
        attempt += 1;
        let n = attempt;
        debug!("{}: attempt {}/{}", label, n, max);
        let fut = op();
        async move {
            fut.await
                .inspect_err(|e| warn!("{}: attempt {}/{} failed: {}", label, n, max, e))
        }
    })
    .await;

    match result {
        Ok(v) => SectionOutcome::Success(v),
        Err(e) => SectionOutcome::Exhausted {
            placeholder: placeholder(),
            last_error: e.to_string(),
        },
    }
}
