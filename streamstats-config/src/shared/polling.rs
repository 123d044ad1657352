use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Controls the readiness polling of the basin characteristics stage.
///
/// After the first request, the stage sleeps `backoff_base^attempt` time units
/// (attempt starting at 1) and asks again, at most `max_extra_polls` times.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Extra requests allowed after the first one before the stage fails.
    ///
    /// Default: 4
    #[serde(default = "default_max_extra_polls")]
    pub max_extra_polls: u32,

    /// Base of the exponential backoff.
    ///
    /// Default: 3
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,

    /// Length of one backoff time unit in milliseconds.
    ///
    /// Default: 1000ms
    #[serde(default = "default_time_unit_ms")]
    pub time_unit_ms: u64,
}

fn default_max_extra_polls() -> u32 {
    4
}

fn default_backoff_base() -> u32 {
    3
}

fn default_time_unit_ms() -> u64 {
    1000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_extra_polls: default_max_extra_polls(),
            backoff_base: default_backoff_base(),
            time_unit_ms: default_time_unit_ms(),
        }
    }
}

impl PollingConfig {
    /// Returns the sleep before the poll following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let units = u64::from(self.backoff_base).saturating_pow(attempt);
        Duration::from_millis(units.saturating_mul(self.time_unit_ms))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backoff_base == 0 {
            return Err(ValidationError::PollingConfig(
                "`backoff_base` cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_as_powers_of_base() {
        let polling = PollingConfig::default();
        assert_eq!(polling.backoff(1), Duration::from_secs(3));
        assert_eq!(polling.backoff(2), Duration::from_secs(9));
        assert_eq!(polling.backoff(4), Duration::from_secs(81));
    }

    #[test]
    fn zero_base_is_rejected() {
        let polling = PollingConfig {
            backoff_base: 0,
            ..PollingConfig::default()
        };
        assert!(matches!(
            polling.validate(),
            Err(ValidationError::PollingConfig(_))
        ));
    }
}
