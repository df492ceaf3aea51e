//! 获取连接的重试策略

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use rat_logger::warn;

use crate::error::QuickPoolResult;

/// 有界重试
///
/// 只重试 [`is_retryable`](crate::error::QuickPoolError::is_retryable) 的错误，
/// 退避间隔按指数增长并叠加随机抖动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次重试前的等待时间（从 0 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2_u32.saturating_pow(attempt.min(16)));
        let capped = exponential.min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter_ms)
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> QuickPoolResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = QuickPoolResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "操作失败，{:?} 后第 {}/{} 次重试: {}",
                        delay, attempt, self.max_retries, e
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuickPoolError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn exhausted() -> QuickPoolError {
        QuickPoolError::PoolExhausted {
            max_connections: 1,
            waited_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaustion_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = RetryPolicy::default()
            .run(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(exhausted())
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: QuickPoolResult<()> = RetryPolicy::default()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(exhausted())
            })
            .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_constraint_violation_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: QuickPoolResult<()> = RetryPolicy::default()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(QuickPoolError::ConstraintViolation {
                    message: "duplicate".to_string(),
                    constraint: None,
                    source: None,
                })
            })
            .await;
        assert!(result.unwrap_err().is_constraint_violation());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(30);
        assert!(delay >= policy.max_delay);
        assert!(delay <= policy.max_delay + policy.max_delay / 2);
    }
}
