use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed inter-attempt backoff.
///
/// The control plane answers 400/404 for a short window while a channel is
/// still coming up; callers wrap those operations in a policy instead of
/// inlining sleep loops, so the retry contract stays testable.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Add-to-bridge style operations: 10 attempts, 50ms apart.
    pub fn bridge_add() -> Self {
        Self::new(10, Duration::from_millis(50))
    }

    /// Wait-until-queryable polling: 100 attempts, 50ms apart (5s budget).
    pub fn channel_poll() -> Self {
        Self::new(100, Duration::from_millis(50))
    }

    /// Runs `op` until it succeeds or the attempt budget is exhausted.
    /// Returns the final attempt's error when every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        for _ in 1..self.max_attempts.max(1) {
            if let Ok(v) = op().await {
                return Ok(v);
            }
            tokio::time::sleep(self.backoff).await;
        }
        op().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let res: Result<u32, &str> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not ready")
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(res, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let res: Result<(), &str> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still broken") }
            })
            .await;
        assert_eq!(res, Err("still broken"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
