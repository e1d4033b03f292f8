//! Exponential backoff between session attempts

use std::time::Duration;

use cr_core::config::BackoffConfig;

/// Exponential backoff with jitter for reconnection attempts
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay handed out first and after a reset
    initial: Duration,
    /// Delay the next call is based on
    current: Duration,
    /// Upper bound before jitter
    max: Duration,
    multiplier: f64,
    /// Fraction of the base delay added at random (0.0 to 1.0)
    jitter: f64,
    /// Delays handed out since the last reset
    attempts: u32,
}

impl ExponentialBackoff {
    /// Create a backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a backoff with explicit parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            current: initial.min(max),
            max,
            // NaN falls to the floor; infinity saturates at `max`
            multiplier: multiplier.max(1.0),
            jitter: if jitter.is_nan() {
                0.0
            } else {
                jitter.clamp(0.0, 1.0)
            },
            attempts: 0,
        }
    }

    /// Next delay; advances the backoff
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.attempts = self.attempts.saturating_add(1);

        let grown = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = grown.min(self.max);

        let extra = base.as_secs_f64() * self.jitter * rand::random::<f64>();
        base.saturating_add(Duration::try_from_secs_f64(extra).unwrap_or_default())
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start over from the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
        self.attempts = 0;
    }
}
