use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{BackendId, Stage};

/// A GeoJSON feature with opaque geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: Value,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Output of the delineation stage.
///
/// `backend` is the server holding `workspace_id`; basin characteristics must be requested
/// from that same server.
#[derive(Debug, Clone, PartialEq)]
pub struct Delineation {
    pub workspace_id: String,
    pub backend: BackendId,
    pub outlet: Vec<Feature>,
    pub watershed: Vec<Feature>,
}

impl Delineation {
    /// Geometry of the watershed polygon sent to the regression region lookup.
    pub fn watershed_geometry(&self) -> Option<&Value> {
        self.watershed.first().map(|feature| &feature.geometry)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionRegion {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "percentWeight")]
    pub percent_weight: Option<f64>,
}

/// The scenario chosen for a point, and the basin parameters its equations need.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub body: Value,
    pub parameter_codes: Vec<String>,
}

impl Scenario {
    /// Returns the scenario with every regression-region parameter valued from `characteristics`.
    ///
    /// Codes are matched case-insensitively. Parameters without a match keep their current value.
    pub fn with_values(&self, characteristics: &BasinCharacteristics) -> Value {
        let mut body = self.body.clone();

        let Some(regions) = body
            .get_mut("regressionRegions")
            .and_then(Value::as_array_mut)
        else {
            return body;
        };

        for region in regions {
            let Some(parameters) = region.get_mut("parameters").and_then(Value::as_array_mut) else {
                continue;
            };

            for parameter in parameters {
                let Some(code) = parameter.get("code").and_then(Value::as_str) else {
                    continue;
                };

                if let Some(value) = characteristics.value_of(code)
                    && let Some(object) = parameter.as_object_mut()
                {
                    object.insert("value".to_string(), Value::from(value));
                }
            }
        }

        body
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinParameter {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "units")]
    pub unit: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Basin characteristics of a workspace. Values may be missing while the server computes them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BasinCharacteristics {
    pub parameters: Vec<BasinParameter>,
}

impl BasinCharacteristics {
    /// True when every parameter carries a value.
    pub fn is_complete(&self) -> bool {
        self.parameters.iter().all(|parameter| parameter.value.is_some())
    }

    pub fn missing_codes(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|parameter| parameter.value.is_none())
            .map(|parameter| parameter.code.as_str())
            .collect()
    }

    pub fn value_of(&self, code: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|parameter| parameter.code.eq_ignore_ascii_case(code))
            .and_then(|parameter| parameter.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStatistic {
    pub code: String,
    pub name: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub equivalent_years: Option<f64>,
    pub interval_lower: Option<f64>,
    pub interval_upper: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStatistics {
    pub code: String,
    pub name: Option<String>,
    pub percent_weight: Option<f64>,
    pub results: Vec<FlowStatistic>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowStatistics {
    pub regions: Vec<RegionStatistics>,
}

/// Output of one successful stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Delineation(Delineation),
    RegressionRegions(Vec<RegressionRegion>),
    Scenario(Scenario),
    BasinCharacteristics(BasinCharacteristics),
    FlowStatistics(FlowStatistics),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Delineation(_) => Stage::Delineate,
            StageOutput::RegressionRegions(_) => Stage::RegressionRegions,
            StageOutput::Scenario(_) => Stage::Scenarios,
            StageOutput::BasinCharacteristics(_) => Stage::BasinCharacteristics,
            StageOutput::FlowStatistics(_) => Stage::FlowStatistics,
        }
    }
}

/// Results accumulated by a point, one slot per stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageResults {
    pub delineation: Option<Delineation>,
    pub regression_regions: Option<Vec<RegressionRegion>>,
    pub scenario: Option<Scenario>,
    pub basin_characteristics: Option<BasinCharacteristics>,
    pub flow_statistics: Option<FlowStatistics>,
}

impl StageResults {
    pub fn insert(&mut self, output: StageOutput) {
        match output {
            StageOutput::Delineation(value) => self.delineation = Some(value),
            StageOutput::RegressionRegions(value) => self.regression_regions = Some(value),
            StageOutput::Scenario(value) => self.scenario = Some(value),
            StageOutput::BasinCharacteristics(value) => self.basin_characteristics = Some(value),
            StageOutput::FlowStatistics(value) => self.flow_statistics = Some(value),
        }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        match stage {
            Stage::Delineate => self.delineation.is_some(),
            Stage::RegressionRegions => self.regression_regions.is_some(),
            Stage::Scenarios => self.scenario.is_some(),
            Stage::BasinCharacteristics => self.basin_characteristics.is_some(),
            Stage::FlowStatistics => self.flow_statistics.is_some(),
        }
    }

    /// Stages holding a result, in execution order.
    pub fn completed(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.contains(*stage))
            .collect()
    }

    /// First stage without a result, or `None` once all five are present.
    pub fn next_pending(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| !self.contains(*stage))
    }

    /// Last stage of the unbroken prefix of completed stages.
    pub fn last_completed(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .take_while(|stage| self.contains(*stage))
            .last()
    }

    pub fn is_empty(&self) -> bool {
        self.completed().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.next_pending().is_none()
    }

    pub fn clear(&mut self) {
        *self = StageResults::default();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn characteristics(values: &[(&str, Option<f64>)]) -> BasinCharacteristics {
        BasinCharacteristics {
            parameters: values
                .iter()
                .map(|(code, value)| BasinParameter {
                    code: code.to_string(),
                    name: None,
                    description: None,
                    unit: None,
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn scenario_values_are_merged_case_insensitively() {
        let scenario = Scenario {
            body: json!({
                "statisticGroupID": 2,
                "regressionRegions": [
                    {"code": "GC1", "parameters": [{"code": "DRNAREA"}, {"code": "ELEV", "value": 1.0}]},
                    {"code": "GC2", "parameters": [{"code": "drnarea"}]}
                ]
            }),
            parameter_codes: vec!["DRNAREA".into(), "ELEV".into()],
        };

        let merged = scenario.with_values(&characteristics(&[
            ("DrnArea", Some(12.5)),
            ("ELEV", None),
        ]));

        assert_eq!(merged["regressionRegions"][0]["parameters"][0]["value"], json!(12.5));
        assert_eq!(merged["regressionRegions"][0]["parameters"][1]["value"], json!(1.0));
        assert_eq!(merged["regressionRegions"][1]["parameters"][0]["value"], json!(12.5));
        assert!(scenario.body["regressionRegions"][0]["parameters"][0].get("value").is_none());
    }

    #[test]
    fn completeness_tracks_missing_values() {
        let partial = characteristics(&[("A", Some(1.0)), ("B", None), ("C", None)]);
        assert!(!partial.is_complete());
        assert_eq!(partial.missing_codes(), vec!["B", "C"]);

        let complete = characteristics(&[("A", Some(1.0))]);
        assert!(complete.is_complete());
    }

    #[test]
    fn pending_stage_follows_execution_order() {
        let mut results = StageResults::default();
        assert_eq!(results.next_pending(), Some(Stage::Delineate));
        assert_eq!(results.last_completed(), None);

        results.insert(StageOutput::RegressionRegions(vec![]));
        assert_eq!(results.next_pending(), Some(Stage::Delineate));
        assert_eq!(results.completed(), vec![Stage::RegressionRegions]);

        results.insert(StageOutput::Delineation(Delineation {
            workspace_id: "ws".into(),
            backend: BackendId::new("prodweba"),
            outlet: vec![],
            watershed: vec![],
        }));
        assert_eq!(results.next_pending(), Some(Stage::Scenarios));
        assert_eq!(results.last_completed(), Some(Stage::RegressionRegions));

        results.clear();
        assert!(results.is_empty());
    }
}
