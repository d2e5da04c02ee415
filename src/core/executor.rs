//! 请求执行器 - 对可能暂时失败的请求进行指数退避重试

use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

pub const DEFAULT_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct RequestExecutor {
    retries: u32,
    base_delay_ms: u64,
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, DEFAULT_BASE_DELAY_MS)
    }
}

impl RequestExecutor {
    pub fn new(retries: u32, base_delay_ms: u64) -> Self {
        Self {
            retries,
            base_delay_ms,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// `base * 2^attempt` 加上 `[0, base)` 内的随机抖动
    fn delay(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        let jitter = if self.base_delay_ms > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_ms)
        } else {
            0
        };
        Duration::from_millis(backoff.saturating_add(jitter))
    }

    /// 执行 `request` 并重试暂时性失败，
    /// 重试次数用尽后返回最后一次错误
    pub async fn execute<T, F, Fut>(&self, label: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.retries => {
                    error!("{} failed after {} retries: {}", label, self.retries, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    attempt += 1;
                    warn!(
                        "{} failed, retrying in {}ms ({}/{}): {}",
                        label,
                        delay.as_millis(),
                        attempt,
                        self.retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
