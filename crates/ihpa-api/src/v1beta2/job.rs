use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvFromSource, EnvVar, LocalObjectReference, PodSpec, PodTemplateSpec,
    ResourceRequirements, Toleration, Volume, VolumeMount,
};
use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The subset of a batch Job's shape an IHPA author may patch for the
/// forecast-fitting training job. Mirrors the upstream `JobPatchSpec`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobPatchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<LocalObjectReference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_from: Option<Vec<EnvFromSource>>,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

impl JobPatchSpec {
    /// Builds a full `batch/v1::JobSpec`. Volume mounts are derived
    /// automatically as `/<volume-name>`, matching the original generator.
    pub fn to_job_spec(&self, container_name: &str, pod_labels: BTreeMap<String, String>) -> JobSpec {
        let volume_mounts: Option<Vec<VolumeMount>> = self.volumes.as_ref().map(|volumes| {
            volumes
                .iter()
                .map(|v| VolumeMount {
                    name: v.name.clone(),
                    mount_path: format!("/{}", v.name),
                    ..Default::default()
                })
                .collect()
        });

        let container = Container {
            name: container_name.to_string(),
            image: Some(self.image.clone()),
            image_pull_policy: self.image_pull_policy.clone(),
            args: self.args.clone(),
            command: self.command.clone(),
            env: self.env.clone(),
            env_from: self.env_from.clone(),
            resources: self.resources.clone(),
            volume_mounts,
            ..Default::default()
        };

        let pod_spec = PodSpec {
            affinity: self.affinity.clone(),
            containers: vec![container],
            image_pull_secrets: self.image_pull_secrets.clone(),
            node_selector: self.node_selector.clone(),
            restart_policy: Some("OnFailure".to_string()),
            service_account_name: self.service_account_name.clone(),
            tolerations: self.tolerations.clone(),
            volumes: self.volumes.clone(),
            ..Default::default()
        };

        JobSpec {
            active_deadline_seconds: self.active_deadline_seconds,
            backoff_limit: self.backoff_limit,
            completions: self.completions,
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }
    }
}

/// Tunables for the change-point-detection pass the training job runs before
/// (re)fitting a forecaster.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangePointDetectionConfig {
    #[serde(default = "default_percentage_threshold")]
    pub percentage_threshold: i32,
    #[serde(default = "default_window_size")]
    pub window_size: i32,
    #[serde(default = "default_trajectory_rows")]
    pub trajectory_rows: i32,
    #[serde(default = "default_trajectory_features")]
    pub trajectory_features: i32,
    #[serde(default = "default_test_rows")]
    pub test_rows: i32,
    #[serde(default = "default_test_features")]
    pub test_features: i32,
    #[serde(default = "default_lag")]
    pub lag: i32,
}

fn default_percentage_threshold() -> i32 {
    50
}
fn default_window_size() -> i32 {
    100
}
fn default_trajectory_rows() -> i32 {
    50
}
fn default_trajectory_features() -> i32 {
    5
}
fn default_test_rows() -> i32 {
    50
}
fn default_test_features() -> i32 {
    5
}
fn default_lag() -> i32 {
    288
}

impl Default for ChangePointDetectionConfig {
    fn default() -> Self {
        Self {
            percentage_threshold: default_percentage_threshold(),
            window_size: default_window_size(),
            trajectory_rows: default_trajectory_rows(),
            trajectory_features: default_trajectory_features(),
            test_rows: default_test_rows(),
            test_features: default_test_features(),
            lag: default_lag(),
        }
    }
}

/// A label selector's match-labels, sorted and rendered as `"k:v"` strings,
/// the same shape the original generator uses for metric tag lists.
pub fn sorted_label_pairs(selector: &LabelSelector) -> Vec<String> {
    let mut pairs: Vec<String> = selector
        .match_labels
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect();
    pairs.sort();
    pairs
}
