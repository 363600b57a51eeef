use std::time::Duration;

use codex_worker_core::config::RetryConfig;
use codex_worker_core::pool::RetryStrategyPlugin;

/// `base * 2^(failures - 1)`, capped at `max_delay_ms`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

/// `base * failures`, capped at `max_delay_ms`.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, failures: u32, _error: &str) -> Option<Duration> {
        if failures == 0 || failures > self.config.max_retries {
            return None;
        }
        let exp = 1u64 << (failures - 1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, failures: u32, _error: &str) -> Option<Duration> {
        if failures == 0 || failures > self.config.max_retries {
            return None;
        }
        let delay = self.config.base_delay_ms.saturating_mul(failures as u64);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_retries: u32, strategy: &str) -> RetryConfig {
        RetryConfig {
            max_retries,
            strategy: strategy.to_string(),
            base_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let plugin = ExponentialBackoffPlugin::new(cfg(5, "exponential-backoff"));
        assert_eq!(plugin.next_delay(1, "err").unwrap().as_millis(), 100);
        assert_eq!(plugin.next_delay(2, "err").unwrap().as_millis(), 200);
        assert_eq!(plugin.next_delay(3, "err").unwrap().as_millis(), 400);
        assert_eq!(plugin.next_delay(5, "err").unwrap().as_millis(), 1000);
        assert_eq!(plugin.next_delay(6, "err"), None);
        assert!(plugin.should_retry(5, "err"));
        assert!(!plugin.should_retry(6, "err"));
    }

    #[test]
    fn test_linear_backoff() {
        let plugin = LinearRetryPlugin::new(cfg(3, "linear"));
        assert_eq!(plugin.next_delay(1, "err").unwrap().as_millis(), 100);
        assert_eq!(plugin.next_delay(3, "err").unwrap().as_millis(), 300);
        assert_eq!(plugin.next_delay(4, "err"), None);
    }

    #[test]
    fn no_retries_means_no_delay() {
        let plugin = ExponentialBackoffPlugin::new(cfg(0, "exponential-backoff"));
        assert!(!plugin.should_retry(1, "err"));
        assert_eq!(plugin.next_delay(1, "err"), None);
    }
}
