//! Prometheus implementation of [`MetricProviderHandle`]. Grounded in
//! `controllers/metricprovider/prometheus/prometheus.go`: upstream never
//! filled this adapter in beyond a selectable, inert placeholder, and this
//! mirrors that rather than inventing behavior the original never had.

use async_trait::async_trait;

use crate::error::Result;

use super::{MetricProviderHandle, ProviderMetricIdentifier};

#[derive(Default)]
pub struct Prometheus {}

impl Prometheus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricProviderHandle for Prometheus {
    async fn send(&self, _metric_name: &str, _timestamp: i64, _point: f64, _tags: &[String], _unit_reference: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, _metric_name: &str, _timestamp: i64, _tags: &[String]) -> Result<f64> {
        Ok(0.0)
    }

    fn convert_resource_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<ProviderMetricIdentifier> {
        None
    }

    fn convert_object_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<ProviderMetricIdentifier> {
        None
    }

    fn convert_pods_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<ProviderMetricIdentifier> {
        None
    }

    fn add_sum_aggregator(&self, metric_name: &str) -> String {
        metric_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_fetch_are_no_ops() {
        let p = Prometheus::new();
        p.send("m", 0, 1.0, &[], None).await.unwrap();
        assert_eq!(p.fetch("m", 0, &[]).await.unwrap(), 0.0);
    }

    #[test]
    fn name_translation_has_no_mapping() {
        let p = Prometheus::new();
        assert!(p.convert_resource_metric_name("cpu", false).is_none());
    }

    #[test]
    fn sum_aggregator_is_the_identity() {
        let p = Prometheus::new();
        assert_eq!(p.add_sum_aggregator("m"), "m");
    }
}
