// crates/core/src/config.rs
//! Worker tunables.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unit delay min ({min:?}) exceeds max ({max:?})")]
    DelayBounds { min: Duration, max: Duration },
}

/// Timing knobs for the per-job processing loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Lower bound of the random pause before each unit.
    pub unit_delay_min: Duration,
    /// Upper bound (inclusive) of the random pause before each unit.
    pub unit_delay_max: Duration,
    /// Pause between `start` and the "started" notification.
    pub start_delay: Duration,
    /// Pause before announcing a cancellation, so the cancel request's own
    /// response reaches the client first.
    pub cancel_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            unit_delay_min: Duration::from_millis(1000),
            unit_delay_max: Duration::from_millis(5000),
            start_delay: Duration::from_millis(1000),
            cancel_grace: Duration::from_millis(500),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unit_delay_min > self.unit_delay_max {
            return Err(ConfigError::DelayBounds {
                min: self.unit_delay_min,
                max: self.unit_delay_max,
            });
        }
        Ok(())
    }

    /// Draw a per-unit delay uniformly from `[unit_delay_min, unit_delay_max]`.
    pub fn unit_delay(&self) -> Duration {
        let min = self.unit_delay_min.as_millis() as u64;
        let max = self.unit_delay_max.as_millis() as u64;
        if min >= max {
            return self.unit_delay_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.unit_delay_min, Duration::from_secs(1));
        assert_eq!(config.unit_delay_max, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unit_delay_within_bounds() {
        let config = WorkerConfig {
            unit_delay_min: Duration::from_millis(10),
            unit_delay_max: Duration::from_millis(20),
            ..Default::default()
        };
        for _ in 0..200 {
            let d = config.unit_delay();
            assert!(d >= config.unit_delay_min && d <= config.unit_delay_max, "{d:?}");
        }
    }

    #[test]
    fn test_fixed_delay() {
        let config = WorkerConfig {
            unit_delay_min: Duration::ZERO,
            unit_delay_max: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.unit_delay(), Duration::ZERO);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = WorkerConfig {
            unit_delay_min: Duration::from_millis(50),
            unit_delay_max: Duration::from_millis(10),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DelayBounds { .. })));
    }
}
