use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{PollingConfig, ValidationError};

/// Settings of the point-processing pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Backend identities, one worker each.
    ///
    /// Default: `["prodweba", "prodwebb"]`
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,

    /// Failed stage attempts tolerated per point before it is reported as exhausted.
    ///
    /// Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Statistic group requested from the scenarios service.
    ///
    /// Default: 2 (peak-flow statistics)
    #[serde(default = "default_stat_group")]
    pub stat_group: u32,

    /// Upper bound on a single remote call, in milliseconds.
    ///
    /// Default: 61000ms
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_backends() -> Vec<String> {
    vec!["prodweba".to_string(), "prodwebb".to_string()]
}

fn default_max_retries() -> u32 {
    3
}

fn default_stat_group() -> u32 {
    2
}

fn default_request_timeout_ms() -> u64 {
    61_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            max_retries: default_max_retries(),
            stat_group: default_stat_group(),
            request_timeout_ms: default_request_timeout_ms(),
            polling: PollingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backends to run workers for: all of them when `parallel`, otherwise only the first.
    pub fn backends_for(&self, parallel: bool) -> &[String] {
        if parallel {
            &self.backends
        } else {
            &self.backends[..self.backends.len().min(1)]
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backends.is_empty() {
            return Err(ValidationError::NoBackends);
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.trim().is_empty() {
                return Err(ValidationError::BlankBackend);
            }
            if !seen.insert(backend.to_lowercase()) {
                return Err(ValidationError::DuplicateBackend(backend.clone()));
            }
        }

        if self.request_timeout_ms == 0 {
            return Err(ValidationError::RequestTimeoutZero);
        }

        self.polling.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_two_mirrored_backends() {
        let config = PipelineConfig::default();
        assert_eq!(config.backends_for(true), ["prodweba", "prodwebb"]);
        assert_eq!(config.backends_for(false), ["prodweba"]);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_timeout(), Duration::from_secs(61));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_backends_are_rejected_case_insensitively() {
        let config = PipelineConfig {
            backends: vec!["prodweba".into(), "ProdWebA".into()],
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateBackend("ProdWebA".into()))
        );
    }

    #[test]
    fn empty_or_blank_backends_are_rejected() {
        let mut config = PipelineConfig {
            backends: vec![],
            ..PipelineConfig::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::NoBackends));

        config.backends = vec!["  ".into()];
        assert_eq!(config.validate(), Err(ValidationError::BlankBackend));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = PipelineConfig {
            request_timeout_ms: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::RequestTimeoutZero));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.stat_group, 2);
        assert_eq!(config.polling, PollingConfig::default());
    }
}
