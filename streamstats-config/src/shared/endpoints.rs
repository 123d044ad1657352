use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Placeholder substituted with the backend identity in endpoint templates.
pub const BACKEND_PLACEHOLDER: &str = "{backend}";

/// Logical names of the remote endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Watershed,
    RegressionRegions,
    Scenarios,
    BasinCharacteristics,
    FlowStatistics,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Watershed => "watershed",
            Endpoint::RegressionRegions => "regression_regions",
            Endpoint::Scenarios => "scenarios",
            Endpoint::BasinCharacteristics => "basin_characteristics",
            Endpoint::FlowStatistics => "flow_statistics",
        }
    }
}

/// URL templates of the StreamStats services.
///
/// The watershed and basin characteristics services keep per-backend workspaces, so their
/// templates carry a `{backend}` placeholder. The NSS services are backend agnostic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointsConfig {
    #[serde(default = "default_watershed")]
    pub watershed: String,
    #[serde(default = "default_regression_regions")]
    pub regression_regions: String,
    #[serde(default = "default_scenarios")]
    pub scenarios: String,
    #[serde(default = "default_basin_characteristics")]
    pub basin_characteristics: String,
    #[serde(default = "default_flow_statistics")]
    pub flow_statistics: String,
    /// Response header naming the backend that served a delineation.
    #[serde(default = "default_backend_header")]
    pub backend_header: String,
}

fn default_watershed() -> String {
    "https://{backend}.streamstats.usgs.gov/streamstatsservices/watershed.geojson".to_string()
}

fn default_regression_regions() -> String {
    "https://streamstats.usgs.gov/nssservices/regressionregions/bylocation".to_string()
}

fn default_scenarios() -> String {
    "https://streamstats.usgs.gov/nssservices/scenarios.json".to_string()
}

fn default_basin_characteristics() -> String {
    "https://{backend}.streamstats.usgs.gov/streamstatsservices/parameters.json".to_string()
}

fn default_flow_statistics() -> String {
    "https://streamstats.usgs.gov/nssservices/scenarios/estimate.json".to_string()
}

fn default_backend_header() -> String {
    "USGSWiM-HostName".to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            watershed: default_watershed(),
            regression_regions: default_regression_regions(),
            scenarios: default_scenarios(),
            basin_characteristics: default_basin_characteristics(),
            flow_statistics: default_flow_statistics(),
            backend_header: default_backend_header(),
        }
    }
}

impl EndpointsConfig {
    /// Points every endpoint at `base_url`, keeping the service paths.
    ///
    /// Backend-affine endpoints become `{base_url}/{backend}/...` so a single local
    /// server can stand in for all backends.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            watershed: format!("{base_url}/{BACKEND_PLACEHOLDER}/streamstatsservices/watershed.geojson"),
            regression_regions: format!("{base_url}/nssservices/regressionregions/bylocation"),
            scenarios: format!("{base_url}/nssservices/scenarios.json"),
            basin_characteristics: format!(
                "{base_url}/{BACKEND_PLACEHOLDER}/streamstatsservices/parameters.json"
            ),
            flow_statistics: format!("{base_url}/nssservices/scenarios/estimate.json"),
            backend_header: default_backend_header(),
        }
    }

    fn template(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Watershed => &self.watershed,
            Endpoint::RegressionRegions => &self.regression_regions,
            Endpoint::Scenarios => &self.scenarios,
            Endpoint::BasinCharacteristics => &self.basin_characteristics,
            Endpoint::FlowStatistics => &self.flow_statistics,
        }
    }

    /// Resolves the URL of `endpoint` for `backend`.
    pub fn url_for(&self, endpoint: Endpoint, backend: &str) -> String {
        self.template(endpoint).replace(BACKEND_PLACEHOLDER, backend)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for endpoint in [Endpoint::Watershed, Endpoint::BasinCharacteristics] {
            if !self.template(endpoint).contains(BACKEND_PLACEHOLDER) {
                return Err(ValidationError::MissingBackendPlaceholder(endpoint.name()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_is_substituted_into_affine_templates() {
        let endpoints = EndpointsConfig::default();
        assert_eq!(
            endpoints.url_for(Endpoint::Watershed, "prodwebb"),
            "https://prodwebb.streamstats.usgs.gov/streamstatsservices/watershed.geojson"
        );
        assert_eq!(
            endpoints.url_for(Endpoint::Scenarios, "prodwebb"),
            "https://streamstats.usgs.gov/nssservices/scenarios.json"
        );
    }

    #[test]
    fn base_url_override_keeps_placeholders() {
        let endpoints = EndpointsConfig::with_base_url("http://127.0.0.1:9000/");
        assert!(endpoints.validate().is_ok());
        assert_eq!(
            endpoints.url_for(Endpoint::BasinCharacteristics, "prodweba"),
            "http://127.0.0.1:9000/prodweba/streamstatsservices/parameters.json"
        );
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let endpoints = EndpointsConfig {
            basin_characteristics: "https://example.com/parameters.json".into(),
            ..EndpointsConfig::default()
        };
        assert_eq!(
            endpoints.validate(),
            Err(ValidationError::MissingBackendPlaceholder("basin_characteristics"))
        );
    }
}
