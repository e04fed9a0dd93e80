//! Resource derivation: the HorizontalPodAutoscaler, FittingJob, Estimator,
//! and RBAC objects generated from one IHPA. Grounded in full in
//! `intelligenthorizontalpodautoscaler_generator_impl.go`.

use std::collections::BTreeMap;

use ihpa_api::v1beta2::{
    sorted_label_pairs, Estimator, EstimatorSpec, EstimatorStatus, ExtendedMetricSpec, FittingJob,
    FittingJobSpec, FittingJobStatus, IntelligentHorizontalPodAutoscaler,
};
use ihpa_api::ForecastIdentity;
use ihpa_core::provider::config::active_provider;
use ihpa_core::quantity::{scaled_value, to_base_units};
use ihpa_core::util::{add_owner_reference, corresponding_forecasted_metric_name, extract_scoped_metric_info, generate_metric_unique_filter};

use k8s_openapi::api::autoscaling::v2::{
    ExternalMetricSource, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricIdentifier,
    MetricSpec, MetricTarget,
};
use k8s_openapi::api::core::v1::{LocalObjectReference, ServiceAccount};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::error::{Error, Result};
use crate::naming::{config_map_name, hpa_name, ihpa_metric_string, rbac_name};

/// Annotation recording which declared metric a generated FittingJob or
/// Estimator belongs to. Matches upstream's `fittingJobIDAnnotation`.
pub const FITTING_JOB_ID_ANNOTATION: &str = "ihpa.ake.example.io/fittingjob-id";

const OWNER_API_VERSION: &str = "ihpa.ake.example.io/v1beta2";
const OWNER_KIND: &str = "IntelligentHorizontalPodAutoscaler";

/// Derives every resource one IHPA needs, given the cluster facts the
/// reconciler already fetched: the `kube-system` namespace UID (for unique
/// metric scoping) and the scale target's summed container resource
/// requests (for utilization-to-average-value conversion).
pub struct IhpaGenerator<'a> {
    ihpa: &'a IntelligentHorizontalPodAutoscaler,
    kube_system_uid: String,
    scale_target_requests: BTreeMap<String, Quantity>,
}

impl<'a> IhpaGenerator<'a> {
    pub fn new(
        ihpa: &'a IntelligentHorizontalPodAutoscaler,
        kube_system_uid: String,
        scale_target_requests: BTreeMap<String, Quantity>,
    ) -> Self {
        Self { ihpa, kube_system_uid, scale_target_requests }
    }

    fn namespace(&self) -> String {
        self.ihpa.metadata.namespace.clone().unwrap_or_default()
    }

    fn target_kind(&self) -> String {
        self.ihpa
            .spec
            .horizontal_pod_autoscaler_template
            .spec
            .scale_target_ref
            .kind
            .clone()
    }

    fn target_name(&self) -> String {
        self.ihpa
            .spec
            .horizontal_pod_autoscaler_template
            .spec
            .scale_target_ref
            .name
            .clone()
    }

    fn unique_metric_filters(&self) -> BTreeMap<String, String> {
        generate_metric_unique_filter(&self.kube_system_uid, &self.namespace(), &self.target_kind(), &self.target_name())
    }

    fn unique_metric_selector(&self) -> LabelSelector {
        LabelSelector {
            match_labels: Some(self.unique_metric_filters()),
            ..Default::default()
        }
    }

    fn unique_metric_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.unique_metric_filters().into_iter().map(|(k, v)| format!("{k}:{v}")).collect();
        tags.sort();
        tags
    }

    fn owner_meta(&self) -> &ObjectMeta {
        &self.ihpa.metadata
    }

    fn set_owner(&self, meta: &mut ObjectMeta) {
        add_owner_reference(OWNER_API_VERSION, OWNER_KIND, self.owner_meta(), meta);
    }

    /// The plain declared name and forecasted-name pair `ForecastIdentity`
    /// hashes over, matching `uniqueMetricHash`'s literal inputs (the
    /// *untranslated* metric name, not the provider-specific one used when
    /// reporting the forecasted metric itself).
    fn identity_inputs(&self, metric: &ExtendedMetricSpec) -> (String, String) {
        let plain_name = extract_scoped_metric_info(&metric.metric);
        let forecasted = corresponding_forecasted_metric_name(&plain_name);
        (plain_name, forecasted)
    }

    fn unique_metric_id(&self, metric: &ExtendedMetricSpec) -> String {
        let (plain_name, forecasted) = self.identity_inputs(metric);
        ForecastIdentity::compute(&plain_name, &forecasted, &self.namespace(), &self.target_kind(), &self.target_name()).to_hex()
    }

    /// Translates a declared metric into the `MetricIdentifier` its
    /// generated FittingJob/Estimator refer to it by.
    fn convert_metric_spec_to_identifier(&self, metric: &ExtendedMetricSpec) -> Result<MetricIdentifier> {
        if let Some(resource) = &metric.metric.resource {
            let provider = active_provider(&self.ihpa.spec.metric_provider).ok_or(Error::NoProviderConfigured)?;
            let translated = provider
                .convert_resource_metric_name(&resource.name, false)
                .ok_or_else(|| Error::MissingResourceTranslation(resource.name.clone()))?;
            Ok(MetricIdentifier {
                name: translated.name,
                selector: Some(self.unique_metric_selector()),
            })
        } else if let Some(external) = &metric.metric.external {
            Ok(external.metric.clone())
        } else {
            Err(Error::UnsupportedMetricType)
        }
    }

    /// Builds the forecasted counterpart of one declared metric: same scope,
    /// forecasted name, reported as an `External`/`AverageValue` metric.
    fn generate_forecasted_metric_spec(&self, metric: &ExtendedMetricSpec) -> Result<MetricSpec> {
        let selector = self.unique_metric_selector();

        if let Some(resource) = &metric.metric.resource {
            let provider = active_provider(&self.ihpa.spec.metric_provider).ok_or(Error::NoProviderConfigured)?;
            let translated = provider
                .convert_resource_metric_name(&resource.name, false)
                .ok_or_else(|| Error::MissingResourceTranslation(resource.name.clone()))?;
            let forecasted_name = corresponding_forecasted_metric_name(&translated.name);

            let average_value = match resource.target.average_utilization {
                Some(utilization) => {
                    let percentage = f64::from(utilization) / 100.0;
                    let request = self
                        .scale_target_requests
                        .get(&resource.name)
                        .ok_or_else(|| Error::MissingContainerRequest(resource.name.clone()))?;
                    let base_units = to_base_units(request);
                    // CPU is the only resource Kubernetes represents in milli
                    // units; scale the request up to milli-cores before
                    // applying the provider scale, and compensate the scale
                    // itself by +3, or a 0.5-core request silently loses
                    // three orders of magnitude against a nanocore provider.
                    let (scaled_base, scale_adjust) = if resource.name == "cpu" {
                        (base_units * 1000.0, 3)
                    } else {
                        (base_units, 0)
                    };
                    let request_total = scaled_value(scaled_base, translated.scale + scale_adjust);
                    let avg = (request_total * percentage).round() as i64;
                    Quantity(avg.to_string())
                }
                None => resource
                    .target
                    .average_value
                    .clone()
                    .or_else(|| resource.target.value.clone())
                    .unwrap_or_else(|| Quantity("0".to_string())),
            };

            Ok(MetricSpec {
                type_: "External".to_string(),
                external: Some(ExternalMetricSource {
                    metric: MetricIdentifier { name: forecasted_name, selector: Some(selector) },
                    target: MetricTarget {
                        type_: "AverageValue".to_string(),
                        average_value: Some(average_value),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            })
        } else if let Some(external) = &metric.metric.external {
            let forecasted_name = corresponding_forecasted_metric_name(&external.metric.name);
            let average_value = external.target.average_value.clone().or_else(|| external.target.value.clone());
            Ok(MetricSpec {
                type_: "External".to_string(),
                external: Some(ExternalMetricSource {
                    metric: MetricIdentifier { name: forecasted_name, selector: Some(selector) },
                    target: MetricTarget {
                        type_: "AverageValue".to_string(),
                        average_value,
                        ..Default::default()
                    },
                }),
                ..Default::default()
            })
        } else {
            Err(Error::UnsupportedMetricType)
        }
    }

    pub fn horizontal_pod_autoscaler_resource(&self) -> Result<HorizontalPodAutoscaler> {
        let template = &self.ihpa.spec.horizontal_pod_autoscaler_template;
        let mut metrics = Vec::new();
        for declared in &template.spec.metrics {
            metrics.push(declared.metric.clone());
            metrics.push(self.generate_forecasted_metric_spec(declared)?);
        }

        let mut metadata = ObjectMeta {
            name: Some(hpa_name(self.ihpa.metadata.name.as_deref().unwrap_or_default())),
            namespace: Some(self.namespace()),
            ..template.metadata.clone()
        };
        self.set_owner(&mut metadata);

        Ok(HorizontalPodAutoscaler {
            metadata,
            spec: Some(HorizontalPodAutoscalerSpec {
                scale_target_ref: template.spec.scale_target_ref.clone(),
                min_replicas: template.spec.min_replicas,
                max_replicas: template.spec.max_replicas,
                metrics: Some(metrics),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    pub fn fitting_job_resources(&self) -> Result<Vec<FittingJob>> {
        self.ihpa
            .spec
            .horizontal_pod_autoscaler_template
            .spec
            .metrics
            .iter()
            .map(|m| self.fitting_job_resource(m))
            .collect()
    }

    fn fitting_job_resource(&self, metric: &ExtendedMetricSpec) -> Result<FittingJob> {
        let identifier = self.convert_metric_spec_to_identifier(metric)?;
        let metric_name = extract_scoped_metric_info(&metric.metric);
        let name = ihpa_metric_string(self.ihpa.metadata.name.as_deref().unwrap_or_default(), &metric_name);

        let patch = &metric.fitting_job_patch_spec;
        let mut job_patch = patch.job_patch_spec.clone();
        if job_patch.service_account_name.is_none() {
            job_patch.service_account_name = Some(rbac_name(self.ihpa.metadata.name.as_deref().unwrap_or_default()));
        }

        let spec = FittingJobSpec {
            job_patch_spec: job_patch,
            seasonality: patch.seasonality.clone(),
            execute_on: patch.execute_on,
            change_point_detection_config: patch.change_point_detection_config.clone(),
            custom_config: patch.custom_config.clone(),
            data_config_map: LocalObjectReference {
                name: Some(config_map_name(self.ihpa.metadata.name.as_deref().unwrap_or_default(), &metric_name)),
            },
            target_metric: identifier,
            provider: self.ihpa.spec.metric_provider.clone(),
        };

        let mut metadata = ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace()),
            annotations: Some(BTreeMap::from([(FITTING_JOB_ID_ANNOTATION.to_string(), self.unique_metric_id(metric))])),
            ..Default::default()
        };
        self.set_owner(&mut metadata);

        Ok(FittingJob { metadata, spec, status: Some(FittingJobStatus::default()) })
    }

    pub fn estimator_resources(&self) -> Result<Vec<Estimator>> {
        self.ihpa
            .spec
            .horizontal_pod_autoscaler_template
            .spec
            .metrics
            .iter()
            .map(|m| self.estimator_resource(m))
            .collect()
    }

    fn estimator_resource(&self, metric: &ExtendedMetricSpec) -> Result<Estimator> {
        let identifier = self.convert_metric_spec_to_identifier(metric)?;
        let raw_metric_name = extract_scoped_metric_info(&metric.metric);
        let name = ihpa_metric_string(self.ihpa.metadata.name.as_deref().unwrap_or_default(), &raw_metric_name);

        let base_metric_tags = self.base_metric_tags_for(&identifier.name);

        let estimator_patch = &self.ihpa.spec.estimator_patch_spec;
        let spec = EstimatorSpec {
            mode: estimator_patch.mode,
            gap_minutes: estimator_patch.gap_minutes,
            metric_name: corresponding_forecasted_metric_name(&identifier.name),
            metric_tags: self.unique_metric_tags(),
            base_metric_name: identifier.name,
            base_metric_tags,
            provider: self.ihpa.spec.metric_provider.clone(),
            data_config_map: LocalObjectReference {
                name: Some(config_map_name(self.ihpa.metadata.name.as_deref().unwrap_or_default(), &raw_metric_name)),
            },
        };

        let mut metadata = ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace()),
            annotations: Some(BTreeMap::from([(FITTING_JOB_ID_ANNOTATION.to_string(), self.unique_metric_id(metric))])),
            ..Default::default()
        };
        self.set_owner(&mut metadata);

        Ok(Estimator { metadata, spec, status: Some(EstimatorStatus::default()) })
    }

    /// Looks for a declared External metric whose own translated name
    /// matches `base_metric_name`, and if found, uses its own selector's
    /// sorted match-labels instead of the generic unique-metric tag set.
    fn base_metric_tags_for(&self, base_metric_name: &str) -> Vec<String> {
        for declared in &self.ihpa.spec.horizontal_pod_autoscaler_template.spec.metrics {
            if let Some(external) = &declared.metric.external {
                if external.metric.name == base_metric_name {
                    if let Some(selector) = &external.metric.selector {
                        return sorted_label_pairs(selector);
                    }
                }
            }
        }
        self.unique_metric_tags()
    }

    pub fn all_config_map_names(&self) -> Vec<String> {
        self.ihpa
            .spec
            .horizontal_pod_autoscaler_template
            .spec
            .metrics
            .iter()
            .map(|m| config_map_name(self.ihpa.metadata.name.as_deref().unwrap_or_default(), &extract_scoped_metric_info(&m.metric)))
            .collect()
    }

    /// The ServiceAccount/Role/RoleBinding triple every IHPA's generated
    /// FittingJobs use to read and patch their own exchange ConfigMaps.
    pub fn rbac_resources(&self) -> (ServiceAccount, Role, RoleBinding) {
        let name = rbac_name(self.ihpa.metadata.name.as_deref().unwrap_or_default());
        let namespace = self.namespace();

        let mut sa_meta = ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            ..Default::default()
        };
        self.set_owner(&mut sa_meta);
        let service_account = ServiceAccount { metadata: sa_meta, ..Default::default() };

        let mut role_meta = ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            ..Default::default()
        };
        self.set_owner(&mut role_meta);
        let role = Role {
            metadata: role_meta,
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["configmaps".to_string()]),
                resource_names: Some(self.all_config_map_names()),
                verbs: vec!["get".to_string(), "update".to_string(), "patch".to_string()],
                ..Default::default()
            }]),
        };

        let mut rb_meta = ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            ..Default::default()
        };
        self.set_owner(&mut rb_meta);
        let role_binding = RoleBinding {
            metadata: rb_meta,
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name,
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: service_account.metadata.name.clone().unwrap_or_default(),
                namespace: Some(namespace),
                ..Default::default()
            }]),
        };

        (service_account, role, role_binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ihpa_api::v1beta2::{
        ChangePointDetectionConfig, DatadogProviderSource, EstimatorPatchSpec,
        ExtendedHorizontalPodAutoscalerSpec, ExtendedHorizontalPodAutoscalerTemplateSpec,
        ExtendedMetricSpec, FittingJobPatchSpec, IntelligentHorizontalPodAutoscalerSpec,
        IntelligentHorizontalPodAutoscalerStatus, JobPatchSpec, MetricProvider, ProviderSource,
    };
    use k8s_openapi::api::autoscaling::v2::{CrossVersionObjectReference, ResourceMetricSource};

    fn datadog_provider() -> MetricProvider {
        MetricProvider {
            name: "datadog".to_string(),
            provider_source: ProviderSource {
                datadog: Some(DatadogProviderSource {
                    api_key: "key".to_string(),
                    app_key: "app".to_string(),
                    keys_from: None,
                }),
                prometheus: None,
            },
        }
    }

    fn resource_metric(name: &str, utilization: i32) -> ExtendedMetricSpec {
        ExtendedMetricSpec {
            metric: MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: name.to_string(),
                    target: MetricTarget {
                        type_: "Utilization".to_string(),
                        average_utilization: Some(utilization),
                        ..Default::default()
                    },
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
        }
    }

    fn ihpa_with_metrics(name: &str, metrics: Vec<ExtendedMetricSpec>) -> IntelligentHorizontalPodAutoscaler {
        IntelligentHorizontalPodAutoscaler {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: IntelligentHorizontalPodAutoscalerSpec {
                horizontal_pod_autoscaler_template: ExtendedHorizontalPodAutoscalerTemplateSpec {
                    metadata: ObjectMeta::default(),
                    spec: ExtendedHorizontalPodAutoscalerSpec {
                        scale_target_ref: CrossVersionObjectReference {
                            kind: "Deployment".to_string(),
                            name: "nginx".to_string(),
                            api_version: Some("apps/v1".to_string()),
                        },
                        min_replicas: Some(1),
                        max_replicas: 10,
                        metrics,
                    },
                },
                estimator_patch_spec: EstimatorPatchSpec::default(),
                metric_provider: datadog_provider(),
            },
            status: Some(IntelligentHorizontalPodAutoscalerStatus::default()),
        }
    }

    #[test]
    fn cpu_utilization_converts_to_nanocore_average_value() {
        let ihpa = ihpa_with_metrics("nginx", vec![resource_metric("cpu", 50)]);
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity("500m".to_string()));
        let generator = IhpaGenerator::new(&ihpa, "kube-system-uid".to_string(), requests);

        let hpa = generator.horizontal_pod_autoscaler_resource().unwrap();
        let metrics = hpa.spec.unwrap().metrics.unwrap();
        let forecasted = &metrics[1];
        let average_value = forecasted.external.as_ref().unwrap().target.average_value.clone().unwrap();
        assert_eq!(average_value.0, "250000000");
    }

    #[test]
    fn memory_utilization_converts_to_byte_average_value() {
        let ihpa = ihpa_with_metrics("nginx", vec![resource_metric("memory", 80)]);
        let mut requests = BTreeMap::new();
        requests.insert("memory".to_string(), Quantity("500M".to_string()));
        let generator = IhpaGenerator::new(&ihpa, "kube-system-uid".to_string(), requests);

        let hpa = generator.horizontal_pod_autoscaler_resource().unwrap();
        let metrics = hpa.spec.unwrap().metrics.unwrap();
        let forecasted = &metrics[1];
        let average_value = forecasted.external.as_ref().unwrap().target.average_value.clone().unwrap();
        assert_eq!(average_value.0, "400000000");
    }

    #[test]
    fn fitting_job_identity_annotation_matches_known_digest() {
        let ihpa = ihpa_with_metrics("nginx", vec![resource_metric("cpu", 50)]);
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity("500m".to_string()));
        let generator = IhpaGenerator::new(&ihpa, "kube-system-uid".to_string(), requests);

        let jobs = generator.fitting_job_resources().unwrap();
        assert_eq!(jobs.len(), 1);
        let id = jobs[0].metadata.annotations.as_ref().unwrap().get(FITTING_JOB_ID_ANNOTATION).unwrap();
        let expected = ForecastIdentity::compute("cpu", "ake.ihpa.forecasted_cpu", "default", "Deployment", "nginx").to_hex();
        assert_eq!(id, &expected);
    }

    #[test]
    fn fitting_job_and_estimator_share_the_same_identity_annotation() {
        let ihpa = ihpa_with_metrics("nginx", vec![resource_metric("cpu", 50)]);
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity("500m".to_string()));
        let generator = IhpaGenerator::new(&ihpa, "kube-system-uid".to_string(), requests);

        let job_id = generator.fitting_job_resources().unwrap()[0]
            .metadata
            .annotations
            .as_ref()
            .unwrap()
            .get(FITTING_JOB_ID_ANNOTATION)
            .cloned();
        let estimator_id = generator.estimator_resources().unwrap()[0]
            .metadata
            .annotations
            .as_ref()
            .unwrap()
            .get(FITTING_JOB_ID_ANNOTATION)
            .cloned();
        assert_eq!(job_id, estimator_id);
    }

    #[test]
    fn rbac_role_scopes_to_generated_config_map_names() {
        let ihpa = ihpa_with_metrics("nginx", vec![resource_metric("cpu", 50), resource_metric("memory", 80)]);
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity("500m".to_string()));
        requests.insert("memory".to_string(), Quantity("500M".to_string()));
        let generator = IhpaGenerator::new(&ihpa, "kube-system-uid".to_string(), requests);

        let (_sa, role, _rb) = generator.rbac_resources();
        let resource_names = role.rules.unwrap()[0].resource_names.clone().unwrap();
        assert_eq!(resource_names.len(), 2);
        assert_eq!(resource_names, generator.all_config_map_names());
    }
}
