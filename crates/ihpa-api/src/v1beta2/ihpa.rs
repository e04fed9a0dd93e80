use k8s_openapi::api::autoscaling::v2::{CrossVersionObjectReference, MetricSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::job::{ChangePointDetectionConfig, JobPatchSpec};
use super::provider::{EstimateMode, MetricProvider};

/// `IntelligentHorizontalPodAutoscaler` declares a workload to be
/// autoscaled with predictive, anchored forecasts in addition to the
/// reactive metrics a plain HorizontalPodAutoscaler already reacts to.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ihpa.ake.example.io",
    version = "v1beta2",
    kind = "IntelligentHorizontalPodAutoscaler",
    shortname = "ihpa",
    namespaced,
    status = "IntelligentHorizontalPodAutoscalerStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct IntelligentHorizontalPodAutoscalerSpec {
    pub horizontal_pod_autoscaler_template: ExtendedHorizontalPodAutoscalerTemplateSpec,
    #[serde(default)]
    pub estimator_patch_spec: EstimatorPatchSpec,
    pub metric_provider: MetricProvider,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct IntelligentHorizontalPodAutoscalerStatus {}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedHorizontalPodAutoscalerTemplateSpec {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ExtendedHorizontalPodAutoscalerSpec,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedHorizontalPodAutoscalerSpec {
    pub scale_target_ref: CrossVersionObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    pub max_replicas: i32,
    pub metrics: Vec<ExtendedMetricSpec>,
}

/// A declared metric together with the training-job patch that governs how
/// its forecaster is fit.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedMetricSpec {
    #[serde(flatten)]
    pub metric: MetricSpec,
    pub fitting_job_patch_spec: FittingJobPatchSpec,
}

/// Everything an IHPA author may patch about the training job generated for
/// one declared metric.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FittingJobPatchSpec {
    #[serde(flatten)]
    pub job_patch_spec: JobPatchSpec,
    #[serde(default = "default_seasonality")]
    pub seasonality: String,
    #[serde(default = "default_execute_on")]
    pub execute_on: i32,
    #[serde(default)]
    pub change_point_detection_config: ChangePointDetectionConfig,
    #[serde(default)]
    pub custom_config: String,
}

fn default_seasonality() -> String {
    "auto".to_string()
}

fn default_execute_on() -> i32 {
    4
}

/// Governs how an estimator worker turns raw forecasts into emitted metrics.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EstimatorPatchSpec {
    #[serde(default)]
    pub mode: EstimateMode,
    #[serde(default = "default_gap_minutes")]
    pub gap_minutes: i32,
}

fn default_gap_minutes() -> i32 {
    10
}

impl Default for EstimatorPatchSpec {
    fn default() -> Self {
        Self {
            mode: EstimateMode::default(),
            gap_minutes: default_gap_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::autoscaling::v2::{ResourceMetricSource, MetricTarget};

    #[test]
    fn extended_metric_spec_flattens_the_metric_spec_fields_alongside_the_patch() {
        let spec = ExtendedMetricSpec {
            metric: MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: "cpu".to_string(),
                    target: MetricTarget { type_: "Utilization".to_string(), average_utilization: Some(50), ..Default::default() },
                }),
                ..Default::default()
            },
            fitting_job_patch_spec: FittingJobPatchSpec {
                job_patch_spec: JobPatchSpec::default(),
                seasonality: "auto".to_string(),
                execute_on: 4,
                change_point_detection_config: ChangePointDetectionConfig::default(),
                custom_config: String::new(),
            },
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "Resource");
        assert_eq!(json["resource"]["name"], "cpu");
        assert_eq!(json["fittingJobPatchSpec"]["seasonality"], "auto");

        let round_tripped: ExtendedMetricSpec = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped.metric.resource.unwrap().name, "cpu");
        assert_eq!(round_tripped.fitting_job_patch_spec.execute_on, 4);
    }

    #[test]
    fn estimator_patch_spec_defaults_to_adjust_mode_and_ten_minute_gap() {
        let spec: EstimatorPatchSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.mode, EstimateMode::Adjust);
        assert_eq!(spec.gap_minutes, 10);
    }

    #[test]
    fn fitting_job_patch_spec_defaults_seasonality_and_execute_on() {
        // FittingJobPatchSpec flattens JobPatchSpec's own fields (including
        // the required `image`) directly alongside seasonality/executeOn.
        let spec: FittingJobPatchSpec = serde_json::from_value(serde_json::json!({ "image": "x" })).unwrap();
        assert_eq!(spec.seasonality, "auto");
        assert_eq!(spec.execute_on, 4);
    }
}
