use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use streamstats_config::shared::{Endpoint, EndpointsConfig};
use tracing::debug;

use crate::error::{ErrorKind, StreamStatsResult, body_excerpt};
use crate::gateway::Gateway;
use crate::gateway::models::{
    EstimateResponse, WatershedResponse, flow_statistics_from_response, scenario_from_response,
};
use crate::types::{
    BackendId, BasinCharacteristics, Crs, Delineation, FlowStatistics, RegressionRegion, Scenario,
};
use crate::{bail, ss_error};

/// HTTP client for the StreamStats and NSS services.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct StreamStatsClient {
    client: Client,
    endpoints: Arc<EndpointsConfig>,
}

impl StreamStatsClient {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(endpoints: EndpointsConfig, timeout: Duration) -> StreamStatsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            ss_error!(
                ErrorKind::ConfigError,
                "Failed to build HTTP client",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Self {
            client,
            endpoints: Arc::new(endpoints),
        })
    }

    pub fn endpoints(&self) -> &EndpointsConfig {
        &self.endpoints
    }

    /// Sends a request and fails on any non-success status.
    async fn send(&self, request: RequestBuilder) -> StreamStatsResult<Response> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            bail!(
                ErrorKind::RemoteStatus,
                "Remote service returned an error status",
                format!("{status} from {url}: {}", body_excerpt(&body))
            );
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> StreamStatsResult<T> {
        let url = response.url().to_string();
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|err| {
            ss_error!(
                ErrorKind::InvalidResponse,
                "Remote response has an unexpected shape",
                format!("{err} from {url}: {}", body_excerpt(&body)),
                source: err
            )
        })
    }

    fn backend_from(&self, response: &Response) -> StreamStatsResult<BackendId> {
        let header = &self.endpoints.backend_header;

        response
            .headers()
            .get(header.as_str())
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(BackendId::new)
            .ok_or_else(|| {
                ss_error!(
                    ErrorKind::InvalidResponse,
                    "Watershed response does not name its backend",
                    format!("missing `{header}` header")
                )
            })
    }
}

impl Gateway for StreamStatsClient {
    async fn delineate_watershed(
        &self,
        region_code: &str,
        x: f64,
        y: f64,
        crs: Crs,
        backend: &BackendId,
    ) -> StreamStatsResult<Delineation> {
        let url = self.endpoints.url_for(Endpoint::Watershed, backend.as_str());
        debug!(%url, region_code, x, y, "delineating watershed");

        let request = self.client.get(&url).query(&[
            ("rcode", region_code.to_string()),
            ("xlocation", x.to_string()),
            ("ylocation", y.to_string()),
            ("crs", crs.code().to_string()),
            ("simplify", "true".to_string()),
            ("includeparameters", "true".to_string()),
            ("includeflowtypes", "false".to_string()),
            ("includefeatures", "true".to_string()),
        ]);

        let response = self.send(request).await?;
        let served_by = self.backend_from(&response)?;
        let watershed: WatershedResponse = Self::decode(response).await?;

        watershed.into_delineation(served_by)
    }

    async fn get_regression_regions(
        &self,
        geometry: &Value,
    ) -> StreamStatsResult<Vec<RegressionRegion>> {
        let url = self.endpoints.url_for(Endpoint::RegressionRegions, "");
        let response = self.send(self.client.post(&url).json(geometry)).await?;

        Self::decode(response).await
    }

    async fn get_scenarios(
        &self,
        region_code: &str,
        stat_group: u32,
        regression_region_codes: &[String],
    ) -> StreamStatsResult<Scenario> {
        let url = self.endpoints.url_for(Endpoint::Scenarios, "");
        let request = self.client.get(&url).query(&[
            ("regions", region_code.to_string()),
            ("statisticgroups", stat_group.to_string()),
            ("regressionregions", regression_region_codes.join(",")),
        ]);

        let response = self.send(request).await?;
        scenario_from_response(Self::decode(response).await?)
    }

    async fn get_basin_characteristics(
        &self,
        region_code: &str,
        workspace_id: &str,
        parameter_codes: &[String],
        backend: &BackendId,
    ) -> StreamStatsResult<BasinCharacteristics> {
        let url = self
            .endpoints
            .url_for(Endpoint::BasinCharacteristics, backend.as_str());
        let request = self.client.get(&url).query(&[
            ("rcode", region_code.to_string()),
            ("workspaceID", workspace_id.to_string()),
            ("includeparameters", parameter_codes.join(",")),
        ]);

        let response = self.send(request).await?;
        Self::decode(response).await
    }

    async fn compute_flow_statistics(
        &self,
        region_code: &str,
        scenario: &Value,
    ) -> StreamStatsResult<FlowStatistics> {
        let url = self.endpoints.url_for(Endpoint::FlowStatistics, "");
        let request = self
            .client
            .post(&url)
            .query(&[("regions", region_code)])
            .json(&[scenario]);

        let response = self.send(request).await?;
        let estimates: Vec<EstimateResponse> = Self::decode(response).await?;

        flow_statistics_from_response(estimates)
    }
}
