use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{EndpointsConfig, PipelineConfig, ValidationError};

/// Top-level configuration of a batch run.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;
        self.endpoints.validate()
    }
}

impl Config for BatchConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["pipeline.backends"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_valid_defaults() {
        let config: BatchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BatchConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn endpoint_errors_surface_after_pipeline_checks() {
        let mut config = BatchConfig::default();
        config.endpoints.watershed = "https://static.example.com".into();
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingBackendPlaceholder("watershed"))
        );
    }
}
