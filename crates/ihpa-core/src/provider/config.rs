//! Selects a live [`MetricProviderHandle`] from an IHPA's declared
//! [`ihpa_api::v1beta2::MetricProvider`]. Grounded in
//! `controllers/metricprovider/config/config.go`'s
//! `ConvertMetricProvider`/`ActiveProvider`, following the priority-ordered
//! provider factory idiom used elsewhere in this workspace.

use std::sync::Arc;

use ihpa_api::v1beta2::MetricProvider;

use super::{datadog::Datadog, prometheus::Prometheus, MetricProviderHandle};

/// Builds the one provider implementation a `MetricProvider` selection
/// names. Datadog is tried before Prometheus, matching the upstream
/// `if/else if` precedence.
pub fn active_provider(selection: &MetricProvider) -> Option<Arc<dyn MetricProviderHandle>> {
    if let Some(datadog) = &selection.provider_source.datadog {
        return Some(Arc::new(Datadog::new(datadog.api_key.clone(), datadog.app_key.clone())));
    }
    if selection.provider_source.prometheus.is_some() {
        return Some(Arc::new(Prometheus::new()));
    }
    None
}
