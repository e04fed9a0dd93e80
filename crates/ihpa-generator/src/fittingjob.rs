//! Derives the two resources a `FittingJob` owns: the training config
//! ConfigMap consumed by the training container, and the CronJob that runs
//! it on a schedule. Grounded in `fittingjob_generator_impl.go`'s
//! `ConfigMapResource`/`CronJobResource`.

use std::collections::BTreeMap;

use ihpa_api::v1beta2::{ChangePointDetectionConfig, FittingJob, MetricProvider};
use ihpa_core::provider::config::active_provider;
use ihpa_core::util::{add_owner_reference, random_minute_cron_format};

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{ConfigMap, ConfigMapVolumeSource, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

use crate::error::{Error, Result};

const OWNER_API_VERSION: &str = "ihpa.ake.example.io/v1beta2";
const OWNER_KIND: &str = "FittingJob";
const CONTAINER_NAME: &str = "fittingjob";
const CONFIG_VOLUME_NAME: &str = "fittingjob-config";
const CONFIG_MOUNT_PATH: &str = "/fittingjob-config";
const DEFAULT_IMAGE: &str = "ake/ihpa-fittingjob:latest";

/// The JSON payload written to the `config.json` key of the training config
/// ConfigMap. Field names and shape match the upstream `FittingJobConfig`:
/// the training container needs the full provider config (endpoint/keys),
/// not just its name, to fetch metrics itself.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FittingJobConfig {
    provider: MetricProvider,
    dump_path: String,
    target_metrics_name: String,
    target_tags: BTreeMap<String, String>,
    seasonality: String,
    data_config_map_name: String,
    data_config_map_namespace: String,
    #[serde(rename = "changePointDetection")]
    change_point_detection_config: ChangePointDetectionConfig,
    custom_config: String,
}

pub struct FittingJobGenerator<'a> {
    fitting_job: &'a FittingJob,
}

impl<'a> FittingJobGenerator<'a> {
    pub fn new(fitting_job: &'a FittingJob) -> Self {
        Self { fitting_job }
    }

    fn namespace(&self) -> String {
        self.fitting_job.metadata.namespace.clone().unwrap_or_default()
    }

    fn name(&self) -> String {
        self.fitting_job.metadata.name.clone().unwrap_or_default()
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.name())
    }

    fn set_owner(&self, meta: &mut ObjectMeta) {
        add_owner_reference(OWNER_API_VERSION, OWNER_KIND, &self.fitting_job.metadata, meta);
    }

    /// Builds the training config ConfigMap. Overwritten in place on every
    /// reconcile, matching upstream's create-or-update (the exchange
    /// ConfigMap the estimator reads from is a separate object, never
    /// touched here).
    pub fn config_map_resource(&self) -> Result<ConfigMap> {
        let provider = active_provider(&self.fitting_job.spec.provider).ok_or(Error::NoProviderConfigured)?;
        let target_metrics_name = provider.add_sum_aggregator(&self.fitting_job.spec.target_metric.name);
        let target_tags = self
            .fitting_job
            .spec
            .target_metric
            .selector
            .as_ref()
            .and_then(|s| s.match_labels.clone())
            .unwrap_or_default();

        let config = FittingJobConfig {
            provider: self.fitting_job.spec.provider.clone(),
            dump_path: format!("/fittingjob-data/{}.pkl", self.name()),
            target_metrics_name,
            target_tags,
            seasonality: self.fitting_job.spec.seasonality.clone(),
            data_config_map_name: self.fitting_job.spec.data_config_map.name.clone().unwrap_or_default(),
            data_config_map_namespace: self.namespace(),
            change_point_detection_config: self.fitting_job.spec.change_point_detection_config.clone(),
            custom_config: self.fitting_job.spec.custom_config.clone(),
        };
        let body = serde_json::to_string(&config).map_err(Error::ConfigSerialize)?;

        let mut metadata = ObjectMeta {
            name: Some(self.config_map_name()),
            namespace: Some(self.namespace()),
            ..Default::default()
        };
        self.set_owner(&mut metadata);

        Ok(ConfigMap {
            metadata,
            data: Some(BTreeMap::from([("config.json".to_string(), body)])),
            ..Default::default()
        })
    }

    /// Builds the CronJob that runs the training container on the schedule
    /// `execute_on` describes (a random minute within that hour, daily).
    pub fn cron_job_resource(&self) -> CronJob {
        let mut job_patch = self.fitting_job.spec.job_patch_spec.clone();
        if job_patch.image.is_empty() {
            job_patch.image = DEFAULT_IMAGE.to_string();
        }

        let mut job_spec = job_patch.to_job_spec(CONTAINER_NAME, BTreeMap::new());
        if let Some(pod_spec) = job_spec.template.spec.as_mut() {
            pod_spec.volumes.get_or_insert_with(Vec::new).push(Volume {
                name: CONFIG_VOLUME_NAME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(self.config_map_name()),
                    ..Default::default()
                }),
                ..Default::default()
            });
            if let Some(container) = pod_spec.containers.first_mut() {
                container.volume_mounts.get_or_insert_with(Vec::new).push(
                    k8s_openapi::api::core::v1::VolumeMount {
                        name: CONFIG_VOLUME_NAME.to_string(),
                        mount_path: CONFIG_MOUNT_PATH.to_string(),
                        ..Default::default()
                    },
                );
            }
        }

        let mut metadata = ObjectMeta {
            name: Some(self.name()),
            namespace: Some(self.namespace()),
            ..Default::default()
        };
        self.set_owner(&mut metadata);

        CronJob {
            metadata,
            spec: Some(CronJobSpec {
                schedule: random_minute_cron_format(self.fitting_job.spec.execute_on),
                job_template: JobTemplateSpec {
                    spec: Some(job_spec),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ihpa_api::v1beta2::{
        ChangePointDetectionConfig, DatadogProviderSource, FittingJobStatus, JobPatchSpec,
        MetricProvider, ProviderSource,
    };
    use k8s_openapi::api::autoscaling::v2::MetricIdentifier;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn fitting_job(execute_on: i32) -> FittingJob {
        let mut match_labels = BTreeMap::new();
        match_labels.insert("kube_namespace".to_string(), "default".to_string());

        FittingJob {
            metadata: ObjectMeta {
                name: Some("ihpa-nginx-cpu".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: ihpa_api::v1beta2::FittingJobSpec {
                job_patch_spec: JobPatchSpec { image: "ake/fittingjob:v1".to_string(), ..Default::default() },
                seasonality: "auto".to_string(),
                execute_on,
                change_point_detection_config: ChangePointDetectionConfig::default(),
                custom_config: String::new(),
                data_config_map: k8s_openapi::api::core::v1::LocalObjectReference {
                    name: Some("ihpa-nginx-cpu-exchange".to_string()),
                },
                target_metric: MetricIdentifier {
                    name: "kubernetes.cpu.usage.total".to_string(),
                    selector: Some(LabelSelector { match_labels: Some(match_labels), ..Default::default() }),
                },
                provider: MetricProvider {
                    name: "datadog".to_string(),
                    provider_source: ProviderSource {
                        datadog: Some(DatadogProviderSource {
                            api_key: "k".to_string(),
                            app_key: "a".to_string(),
                            keys_from: None,
                        }),
                        prometheus: None,
                    },
                },
            },
            status: Some(FittingJobStatus::default()),
        }
    }

    #[test]
    fn config_map_encodes_sum_aggregated_target_and_exchange_coordinates() {
        let fj = fitting_job(4);
        let generator = FittingJobGenerator::new(&fj);
        let config_map = generator.config_map_resource().unwrap();

        assert_eq!(config_map.metadata.name, Some("ihpa-nginx-cpu-config".to_string()));
        let body = config_map.data.unwrap().get("config.json").unwrap().clone();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["targetMetricsName"], "sum:kubernetes.cpu.usage.total");
        assert_eq!(parsed["dataConfigMapName"], "ihpa-nginx-cpu-exchange");
        assert_eq!(parsed["dataConfigMapNamespace"], "default");
        assert_eq!(parsed["targetTags"]["kube_namespace"], "default");
        assert_eq!(parsed["provider"]["name"], "datadog");
        assert_eq!(parsed["provider"]["datadog"]["api_key"], "k");
    }

    #[test]
    fn config_map_carries_an_owner_reference_to_the_fitting_job() {
        let fj = fitting_job(4);
        let generator = FittingJobGenerator::new(&fj);
        let config_map = generator.config_map_resource().unwrap();
        let owners = config_map.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "FittingJob");
        assert_eq!(owners[0].name, "ihpa-nginx-cpu");
    }

    #[test]
    fn cron_job_schedule_uses_the_declared_hour() {
        let fj = fitting_job(17);
        let generator = FittingJobGenerator::new(&fj);
        let cron_job = generator.cron_job_resource();
        let schedule = cron_job.spec.unwrap().schedule;
        let parts: Vec<&str> = schedule.split(' ').collect();
        assert_eq!(parts[1], "17");
        assert_eq!(&parts[2..], &["*", "*", "*"]);
    }

    #[test]
    fn cron_job_mounts_the_training_config_map_into_the_container() {
        let fj = fitting_job(4);
        let generator = FittingJobGenerator::new(&fj);
        let cron_job = generator.cron_job_resource();
        let pod_spec = cron_job.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();

        let volume = pod_spec.volumes.unwrap().into_iter().find(|v| v.name == CONFIG_VOLUME_NAME).unwrap();
        assert_eq!(volume.config_map.unwrap().name, Some("ihpa-nginx-cpu-config".to_string()));

        let container = &pod_spec.containers[0];
        assert_eq!(container.image, Some("ake/fittingjob:v1".to_string()));
        let mount = container.volume_mounts.as_ref().unwrap().iter().find(|m| m.name == CONFIG_VOLUME_NAME).unwrap();
        assert_eq!(mount.mount_path, CONFIG_MOUNT_PATH);
    }

    #[test]
    fn cron_job_falls_back_to_the_default_image_when_unset() {
        let mut fj = fitting_job(4);
        fj.spec.job_patch_spec.image = String::new();
        let generator = FittingJobGenerator::new(&fj);
        let cron_job = generator.cron_job_resource();
        let pod_spec = cron_job.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.containers[0].image, Some(DEFAULT_IMAGE.to_string()));
    }
}
