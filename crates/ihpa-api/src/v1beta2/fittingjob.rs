use k8s_openapi::api::autoscaling::v2::MetricIdentifier;
use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::job::{ChangePointDetectionConfig, JobPatchSpec};
use super::provider::MetricProvider;

/// `FittingJob` is the generated record of one periodic forecaster-fitting
/// training job for a single declared metric of one IHPA.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ihpa.ake.example.io",
    version = "v1beta2",
    kind = "FittingJob",
    shortname = "fj",
    namespaced,
    status = "FittingJobStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct FittingJobSpec {
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
    pub data_config_map: LocalObjectReference,
    pub target_metric: MetricIdentifier,
    pub provider: MetricProvider,
}

fn default_seasonality() -> String {
    "auto".to_string()
}

fn default_execute_on() -> i32 {
    4
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct FittingJobStatus {}
