//! Naming derivation shared by every resource the generator produces.
//! Grounded in the `ihpaString`/`ihpaMetricString`/`hpaName`/`rbacName`/
//! `configMapName` family of helpers in
//! `intelligenthorizontalpodautoscaler_generator_impl.go`.

use ihpa_core::util::sanitize_for_kubernetes_resource_name;

/// `ihpa-<lowercased ihpa name>`, sanitized for use as a resource name.
pub fn ihpa_string(ihpa_name: &str) -> String {
    sanitize_for_kubernetes_resource_name(&format!("ihpa-{}", ihpa_name.to_lowercase()))
}

/// The name shared by the generated HorizontalPodAutoscaler, ServiceAccount,
/// Role, and RoleBinding.
pub fn hpa_name(ihpa_name: &str) -> String {
    ihpa_string(ihpa_name)
}

pub fn rbac_name(ihpa_name: &str) -> String {
    ihpa_string(ihpa_name)
}

/// `<ihpa_string>-<lowercased metric name>`, sanitized. Shared by the
/// per-metric FittingJob, Estimator, and exchange ConfigMap names.
pub fn ihpa_metric_string(ihpa_name: &str, metric_name: &str) -> String {
    sanitize_for_kubernetes_resource_name(&format!("{}-{}", ihpa_string(ihpa_name), metric_name.to_lowercase()))
}

pub fn config_map_name(ihpa_name: &str, metric_name: &str) -> String {
    ihpa_metric_string(ihpa_name, metric_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ihpa_string_lowercases_and_sanitizes() {
        assert_eq!(ihpa_string("My.App_1"), "ihpa-my-app-1");
    }

    #[test]
    fn metric_string_combines_ihpa_and_metric_name() {
        assert_eq!(ihpa_metric_string("web", "CPU.Usage"), "ihpa-web-cpu-usage");
    }
}
