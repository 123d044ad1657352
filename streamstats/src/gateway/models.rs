//! Wire formats of the StreamStats and NSS services.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ErrorKind, StreamStatsResult};
use crate::ss_error;
use crate::types::{
    BackendId, Delineation, Feature, FlowStatistic, FlowStatistics, RegionStatistics, Scenario,
};

const OUTLET_COLLECTION: &str = "globalwatershedpoint";
const WATERSHED_COLLECTION: &str = "globalwatershed";

#[derive(Debug, Deserialize)]
pub(crate) struct WatershedResponse {
    #[serde(rename = "workspaceID")]
    workspace_id: Value,
    #[serde(default)]
    featurecollection: Vec<NamedFeatureCollection>,
}

#[derive(Debug, Deserialize)]
struct NamedFeatureCollection {
    #[serde(default)]
    name: Option<String>,
    feature: FeatureCollection,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

impl WatershedResponse {
    fn collection(&self, name: &str, fallback: usize) -> Option<&NamedFeatureCollection> {
        self.featurecollection
            .iter()
            .find(|collection| {
                collection
                    .name
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
            })
            .or_else(|| self.featurecollection.get(fallback))
    }

    pub(crate) fn into_delineation(self, backend: BackendId) -> StreamStatsResult<Delineation> {
        let workspace_id = match &self.workspace_id {
            Value::String(id) if !id.is_empty() => id.clone(),
            Value::Number(id) => id.to_string(),
            other => {
                return Err(ss_error!(
                    ErrorKind::InvalidResponse,
                    "Watershed response has no workspace",
                    format!("workspaceID = {other}")
                ));
            }
        };

        let outlet = self
            .collection(OUTLET_COLLECTION, 0)
            .map(|collection| collection.feature.features.clone())
            .unwrap_or_default();
        let watershed = self
            .collection(WATERSHED_COLLECTION, 1)
            .map(|collection| collection.feature.features.clone())
            .unwrap_or_default();

        if watershed.is_empty() {
            return Err(ss_error!(
                ErrorKind::InvalidResponse,
                "Watershed response has no watershed polygon",
                format!("workspace {workspace_id}")
            ));
        }

        Ok(Delineation {
            workspace_id,
            backend,
            outlet,
            watershed,
        })
    }
}

/// Picks the first scenario and collects the parameter codes of all its regression regions.
pub(crate) fn scenario_from_response(scenarios: Vec<Value>) -> StreamStatsResult<Scenario> {
    let Some(body) = scenarios.into_iter().next() else {
        return Err(ss_error!(
            ErrorKind::InvalidResponse,
            "Scenario response is empty"
        ));
    };

    let mut parameter_codes: Vec<String> = Vec::new();
    let regions = body
        .get("regressionRegions")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ss_error!(
                ErrorKind::InvalidResponse,
                "Scenario has no regression regions"
            )
        })?;

    for region in regions {
        let parameters = region
            .get("parameters")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for code in parameters
            .iter()
            .filter_map(|parameter| parameter.get("code").and_then(Value::as_str))
        {
            if !parameter_codes
                .iter()
                .any(|known| known.eq_ignore_ascii_case(code))
            {
                parameter_codes.push(code.to_string());
            }
        }
    }

    Ok(Scenario {
        body,
        parameter_codes,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct EstimateResponse {
    #[serde(default, rename = "regressionRegions")]
    regression_regions: Vec<EstimateRegion>,
}

#[derive(Debug, Deserialize)]
struct EstimateRegion {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "percentWeight")]
    percent_weight: Option<f64>,
    #[serde(default)]
    results: Vec<EstimateResult>,
}

#[derive(Debug, Deserialize)]
struct EstimateResult {
    code: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default, alias = "units")]
    unit: Option<Value>,
    #[serde(default, rename = "equivalentYears")]
    equivalent_years: Option<f64>,
    #[serde(default, rename = "intervalBounds")]
    interval_bounds: Option<IntervalBounds>,
}

#[derive(Debug, Deserialize)]
struct IntervalBounds {
    #[serde(default)]
    lower: Option<f64>,
    #[serde(default)]
    upper: Option<f64>,
}

/// Units come either as plain text or as `{ "unit": ..., "abbr": ... }`.
fn unit_label(unit: Option<Value>) -> Option<String> {
    match unit? {
        Value::String(label) => Some(label),
        Value::Object(object) => object
            .get("abbr")
            .or_else(|| object.get("unit"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

pub(crate) fn flow_statistics_from_response(
    estimates: Vec<EstimateResponse>,
) -> StreamStatsResult<FlowStatistics> {
    let Some(estimate) = estimates.into_iter().next() else {
        return Err(ss_error!(
            ErrorKind::InvalidResponse,
            "Flow statistics response is empty"
        ));
    };

    let regions = estimate
        .regression_regions
        .into_iter()
        .map(|region| RegionStatistics {
            code: region.code.unwrap_or_default(),
            name: region.name,
            percent_weight: region.percent_weight,
            results: region
                .results
                .into_iter()
                .map(|result| {
                    let (interval_lower, interval_upper) = result
                        .interval_bounds
                        .map(|bounds| (bounds.lower, bounds.upper))
                        .unwrap_or_default();

                    FlowStatistic {
                        name: result.name.unwrap_or_else(|| result.code.clone()),
                        code: result.code,
                        value: result.value,
                        unit: unit_label(result.unit),
                        equivalent_years: result.equivalent_years,
                        interval_lower,
                        interval_upper,
                    }
                })
                .collect(),
        })
        .collect();

    Ok(FlowStatistics { regions })
}
