use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Default wall-clock bound for a job; `0` disables the default deadline.
    pub timeout_secs: u64,
    pub cancel_grace_ms: u64,
    /// Per-stream capture cap.
    pub max_log_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            cancel_grace_ms: 5000,
            max_log_bytes: 1024 * 1024,
        }
    }
}

impl LimitsConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn max_log_bytes(&self) -> usize {
        usize::try_from(self.max_log_bytes).unwrap_or(usize::MAX)
    }
}
