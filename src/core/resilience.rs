//! 重试包装：指数退避 + 随机抖动
//!
//! 所有上游调用都经过 with_retry。认证类错误（401/403/API key）不重试，直接返回；
//! 其余错误最多重试 retries 次，每次等待 min(delay + jitter, max_delay)，之后 delay *= factor。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// 重试参数；对应配置中的 [ai.retry]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 首次失败后的最大重试次数（总调用次数 = retries + 1）
    pub retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    /// 每次等待额外附加的随机抖动上限，0 表示不加抖动
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            factor: 2.0,
            max_jitter_ms: 200,
        }
    }
}

impl RetryConfig {
    /// 本地服务用：仅重试一次，首轮等待 500ms
    pub fn local() -> Self {
        Self {
            retries: 1,
            initial_delay_ms: 500,
            ..Self::default()
        }
    }

    /// 计算某次等待时长（不含抖动时为确定值，便于测试）
    fn wait_for(&self, delay_ms: f64) -> u64 {
        let jitter = if self.max_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.max_jitter_ms)
        } else {
            0
        };
        let base = delay_ms.max(0.0).min(self.max_delay_ms as f64) as u64;
        base.saturating_add(jitter).min(self.max_delay_ms)
    }
}

/// 错误信息是否表示认证问题（401 / 403 / API key 缺失或无效）
pub fn is_auth_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    message.contains("401")
        || message.contains("403")
        || lower.contains("api key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
}

/// 带退避的重试执行器
///
/// operation 每次调用产生一个新的 future；认证类错误立即返回，其余错误在预算内重试，
/// 预算耗尽后返回最后一次的错误。
pub async fn with_retry<F, Fut, T, E>(mut operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    let mut delay = config.initial_delay_ms as f64;

    loop {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let message = e.to_string();
                if is_auth_failure(&message) {
                    tracing::debug!(error = %message, "auth failure, not retrying");
                    return Err(e);
                }
                if attempt >= config.retries {
                    tracing::error!(attempts = attempt + 1, error = %message, "retry budget exhausted");
                    return Err(e);
                }
                attempt += 1;
                let wait_ms = config.wait_for(delay);
                tracing::warn!(attempt, wait_ms, error = %message, "operation failed, retrying");
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                delay = (delay * config.factor).min(config.max_delay_ms as f64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_classification() {
        assert!(is_auth_failure("HTTP 401: bad key"));
        assert!(is_auth_failure("status 403 Forbidden"));
        assert!(is_auth_failure("Google API Key not configured"));
        assert!(!is_auth_failure("HTTP 500: internal error"));
        assert!(!is_auth_failure("connection reset"));
    }

    #[test]
    fn test_wait_is_capped_by_max_delay() {
        let cfg = RetryConfig {
            max_jitter_ms: 0,
            ..RetryConfig::default()
        };
        assert_eq!(cfg.wait_for(1000.0), 1000);
        assert_eq!(cfg.wait_for(16_000.0), 10_000);

        let jittered = RetryConfig::default();
        for _ in 0..20 {
            let w = jittered.wait_for(1000.0);
            assert!((1000..=1200).contains(&w));
        }
    }

    #[test]
    fn test_wait_saturates_on_huge_delay() {
        let cfg = RetryConfig {
            max_delay_ms: 1,
            ..RetryConfig::default()
        };
        assert_eq!(cfg.wait_for(f64::MAX), 1);
        assert_eq!(cfg.wait_for(f64::INFINITY), 1);
    }

    #[test]
    fn test_local_profile() {
        let cfg = RetryConfig::local();
        assert_eq!(cfg.retries, 1);
        assert_eq!(cfg.initial_delay_ms, 500);
        assert_eq!(cfg.max_delay_ms, 10_000);
    }
}
