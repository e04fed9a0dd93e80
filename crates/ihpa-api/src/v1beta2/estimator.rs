use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::provider::{EstimateMode, MetricProvider};

/// `Estimator` is the generated record of one live estimator worker: it
/// names the base and forecasted metric the worker reads/writes and the
/// provider and exchange ConfigMap it uses to do so.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ihpa.ake.example.io",
    version = "v1beta2",
    kind = "Estimator",
    namespaced,
    status = "EstimatorStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct EstimatorSpec {
    #[serde(default)]
    pub mode: EstimateMode,
    #[serde(default = "default_gap_minutes")]
    pub gap_minutes: i32,
    pub metric_name: String,
    pub metric_tags: Vec<String>,
    #[serde(default)]
    pub base_metric_name: String,
    #[serde(default)]
    pub base_metric_tags: Vec<String>,
    pub provider: MetricProvider,
    pub data_config_map: LocalObjectReference,
}

fn default_gap_minutes() -> i32 {
    10
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EstimatorStatus {}
