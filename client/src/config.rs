use std::time::Duration;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Lower bound applied by [`TelemetryConfig::with_reconnect_delay`]
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Tunables shared by every connection handle in a registry.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Fixed delay between a closed transport and the next connection attempt
    pub reconnect_delay: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl TelemetryConfig {
    /// Delays below [`MIN_RECONNECT_DELAY`] are raised to it
    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay.max(MIN_RECONNECT_DELAY);
        self
    }
}
