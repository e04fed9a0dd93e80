//! The metric provider adapter (C1): a pluggable boundary between the
//! estimator worker and whatever external system stores the raw and
//! forecasted metric series.

pub mod config;
pub mod datadog;
pub mod prometheus;

use async_trait::async_trait;

use crate::error::Result;

/// A provider-specific name/scale pair, mirroring the Go `MetricIdentifier`
/// interface (`GetName()`/`GetScale()`).
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderMetricIdentifier {
    pub name: String,
    pub scale: i32,
}

/// The boundary the estimator worker and the IHPA generator use to talk to
/// an external metrics backend. Implementations are selected at reconcile
/// time from the IHPA's declared provider (see [`config::active_provider`]).
#[async_trait]
pub trait MetricProviderHandle: Send + Sync {
    /// Sends one point for `metric_name` at `timestamp`, tagged with `tags`.
    /// `unit_reference` names a resource metric whose unit metadata should be
    /// synced onto `metric_name`, if the provider supports that.
    async fn send(
        &self,
        metric_name: &str,
        timestamp: i64,
        point: f64,
        tags: &[String],
        unit_reference: Option<&str>,
    ) -> Result<()>;

    /// Fetches the single value of `metric_name` nearest to `timestamp`.
    async fn fetch(&self, metric_name: &str, timestamp: i64, tags: &[String]) -> Result<f64>;

    /// Translates a Kubernetes `Resource`-type metric name to/from this
    /// provider's own naming, or `None` if the provider has no mapping.
    fn convert_resource_metric_name(&self, metric_name: &str, reverse: bool) -> Option<ProviderMetricIdentifier>;

    /// Translates a Kubernetes `Object`-type metric name to/from this
    /// provider's own naming.
    fn convert_object_metric_name(&self, metric_name: &str, reverse: bool) -> Option<ProviderMetricIdentifier>;

    /// Translates a Kubernetes `Pods`-type metric name to/from this
    /// provider's own naming.
    fn convert_pods_metric_name(&self, metric_name: &str, reverse: bool) -> Option<ProviderMetricIdentifier>;

    /// Wraps `metric_name` with this provider's sum-aggregation syntax, used
    /// when fetching a metric that may be reported per-host.
    fn add_sum_aggregator(&self, metric_name: &str) -> String;
}
