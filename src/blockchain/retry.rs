use backon::{ConstantBuilder, Retryable};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry: `attempts` tries in total, sleeping `delay` between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Transaction and signature fetches.
    pub const fn fetch() -> Self {
        Self::new(5, Duration::from_secs(1))
    }

    /// Current slot lookups on the startup path.
    pub const fn slot() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

pub async fn with_retries<T, E, F, Fut>(policy: RetryPolicy, what: &str, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let backoff = ConstantBuilder::default()
        .with_delay(policy.delay)
        .with_max_times(policy.attempts.saturating_sub(1));

    f.retry(backoff)
        .notify(|e: &E, dur: Duration| warn!("{} failed, retrying in {:?}: {}", what, dur, e))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result: Result<(), String> = with_retries(policy, "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        })
        .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(5, Duration::from_millis(1));

        let result: Result<usize, String> = with_retries(policy, "op", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err("not yet".to_string()) } else { Ok(n) }
        })
        .await;

        assert_eq!(result, Ok(2));
    }
}
