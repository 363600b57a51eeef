use std::time::Duration;

/// Decides whether and when a failed task gets another try.
///
/// `failures` counts the failed tries so far, the one just finished
/// included, so it is at least 1.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, failures: u32, error: &str) -> Option<Duration>;
    fn max_retries(&self) -> u32;
    fn should_retry(&self, failures: u32, error: &str) -> bool {
        failures <= self.max_retries() && !self.is_fatal_error(error)
    }
    fn is_fatal_error(&self, _error: &str) -> bool {
        false
    }
}

/// Retries right away, up to `max_retries` times.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateRetry {
    pub max_retries: u32,
}

impl ImmediateRetry {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl RetryStrategyPlugin for ImmediateRetry {
    fn name(&self) -> &str {
        "immediate"
    }

    fn next_delay(&self, failures: u32, _error: &str) -> Option<Duration> {
        (failures <= self.max_retries).then_some(Duration::ZERO)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
