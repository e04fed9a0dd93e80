//! Naming, resource-summation, and owner-reference helpers shared across
//! the generator and the reconcilers. Grounded in `controllers/util.go`.

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::MetricSpec;
use k8s_openapi::api::core::v1::{Container, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use rand::Rng;

use crate::quantity::{from_base_units, to_base_units};

/// The provider the original upstream deployment was built for; kept as the
/// label value `generate_metric_unique_filter` writes under
/// `kube_<kind>` style keys.
pub const METRIC_PATH: &str = "ake.ihpa";

/// Replaces characters that are illegal in Kubernetes resource names.
pub fn sanitize_for_kubernetes_resource_name(name: &str) -> String {
    name.replace('.', "-").replace('_', "-")
}

/// Builds the forecasted counterpart of a declared metric name, e.g.
/// `cpu.usage` -> `ake.ihpa.forecasted_cpu_usage`.
pub fn corresponding_forecasted_metric_name(metric_name: &str) -> String {
    let replaced = metric_name.replace('.', "_").replace('-', "_");
    format!("{METRIC_PATH}.forecasted_{replaced}")
}

/// Extracts the metric name and scale-target reference a `MetricSpec`
/// describes, regardless of its type. Returns `"unknown_metric"` for a
/// `MetricSpec` this controller does not recognize (it has no `type_` this
/// build understands).
pub fn extract_scoped_metric_info(metric: &MetricSpec) -> String {
    if let Some(resource) = &metric.resource {
        return resource.name.clone();
    }
    if let Some(object) = &metric.object {
        return object.metric.name.clone();
    }
    if let Some(pods) = &metric.pods {
        return pods.metric.name.clone();
    }
    if let Some(external) = &metric.external {
        return external.metric.name.clone();
    }
    "unknown_metric".to_string()
}

/// Builds the set of provider tags that uniquely scope a generated metric to
/// one target workload within one cluster.
pub fn generate_metric_unique_filter(
    kube_system_uid: &str,
    namespace: &str,
    target_kind: &str,
    target_name: &str,
) -> BTreeMap<String, String> {
    let mut filters = BTreeMap::new();
    filters.insert("kube_system_uid".to_string(), kube_system_uid.to_string());
    filters.insert("kube_namespace".to_string(), namespace.to_string());
    filters.insert(format!("kube_{}", target_kind.to_lowercase()), target_name.to_string());
    filters
}

/// Sums the resource requests of a list of containers, matching
/// `totalResourceList`/`sumUpResourceLists`.
pub fn total_resource_list(containers: &[Container]) -> BTreeMap<String, Quantity> {
    let lists = containers
        .iter()
        .filter_map(|c| c.resources.as_ref())
        .filter_map(ResourceRequirements::requests_map);
    sum_up_resource_lists(lists)
}

/// Sums a sequence of Kubernetes resource lists, quantity by quantity.
pub fn sum_up_resource_lists<I>(lists: I) -> BTreeMap<String, Quantity>
where
    I: IntoIterator<Item = BTreeMap<String, Quantity>>,
{
    let mut total: BTreeMap<String, f64> = BTreeMap::new();
    for list in lists {
        for (name, quantity) in list {
            *total.entry(name).or_insert(0.0) += to_base_units(&quantity);
        }
    }
    total
        .into_iter()
        .map(|(name, value)| (name, from_base_units(value)))
        .collect()
}

trait ResourceRequirementsExt {
    fn requests_map(&self) -> Option<BTreeMap<String, Quantity>>;
}

impl ResourceRequirementsExt for ResourceRequirements {
    fn requests_map(&self) -> Option<BTreeMap<String, Quantity>> {
        self.requests.clone()
    }
}

/// Sets a single controller owner reference on a dependent object's metadata,
/// matching `addOwnerReference`.
pub fn add_owner_reference(
    owner_api_version: &str,
    owner_kind: &str,
    owner_meta: &ObjectMeta,
    dependent_meta: &mut ObjectMeta,
) {
    let owner_ref = OwnerReference {
        api_version: owner_api_version.to_string(),
        kind: owner_kind.to_string(),
        name: owner_meta.name.clone().unwrap_or_default(),
        uid: owner_meta.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
        ..Default::default()
    };
    dependent_meta.owner_references.get_or_insert_with(Vec::new).push(owner_ref);
}

/// Produces a random-minute daily cron schedule for the given hour,
/// e.g. `"37 4 * * *"`. Matches `randomMinuteCronFormat`.
pub fn random_minute_cron_format(hour: i32) -> String {
    let mut hour = hour;
    if hour < 0 {
        hour = 0;
    }
    hour %= 24;
    let minute = rand::thread_rng().gen_range(0..60);
    format!("{minute} {hour} * * *")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_dots_and_underscores() {
        assert_eq!(sanitize_for_kubernetes_resource_name("my.metric_name"), "my-metric-name");
    }

    #[test]
    fn forecasted_metric_name_uses_the_metric_path_prefix() {
        assert_eq!(
            corresponding_forecasted_metric_name("cpu.usage-total"),
            "ake.ihpa.forecasted_cpu_usage_total"
        );
    }

    #[test]
    fn unique_filter_has_three_keys() {
        let filters = generate_metric_unique_filter("uid-1", "default", "Deployment", "web");
        assert_eq!(filters.get("kube_system_uid"), Some(&"uid-1".to_string()));
        assert_eq!(filters.get("kube_namespace"), Some(&"default".to_string()));
        assert_eq!(filters.get("kube_deployment"), Some(&"web".to_string()));
    }

    #[test]
    fn sums_quantities_across_lists() {
        let mut a = BTreeMap::new();
        a.insert("cpu".to_string(), Quantity("100m".to_string()));
        let mut b = BTreeMap::new();
        b.insert("cpu".to_string(), Quantity("0.05".to_string()));
        let total = sum_up_resource_lists(vec![a, b]);
        let cpu = total.get("cpu").unwrap();
        let value: f64 = cpu.0.parse().unwrap();
        assert!((value - 0.15).abs() < 1e-9);
    }

    #[test]
    fn cron_format_wraps_hour_modulo_24() {
        let s = random_minute_cron_format(30);
        assert!(s.ends_with("* * *"));
        let parts: Vec<&str> = s.split(' ').collect();
        assert_eq!(parts[1], "6");
    }

    #[test]
    fn cron_format_clamps_negative_hour_to_zero() {
        let s = random_minute_cron_format(-5);
        let parts: Vec<&str> = s.split(' ').collect();
        assert_eq!(parts[1], "0");
    }
}
