//! Datadog implementation of [`MetricProviderHandle`]. Grounded in
//! `controllers/metricprovider/datadog/datadog.go`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};

use super::{MetricProviderHandle, ProviderMetricIdentifier};

const DEFAULT_BASE_URL: &str = "https://api.datadoghq.com";
/// Margin applied on either side of the requested timestamp when querying,
/// matching the original's `from`/`to` window.
const QUERY_MARGIN_SECONDS: i64 = 600;
const MAX_SEND_ATTEMPTS: u32 = 3;

pub struct Datadog {
    api_key: String,
    app_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl Datadog {
    pub fn new(api_key: String, app_key: String) -> Self {
        Self {
            api_key,
            app_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Builds a client against a non-default base URL, for use against a
    /// Datadog-compatible proxy or, in tests, a local mock server.
    pub fn with_base_url(api_key: String, app_key: String, base_url: String) -> Self {
        Self {
            api_key,
            app_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn send_once(&self, metric_name: &str, timestamp: i64, point: f64, tags: &[String]) -> Result<()> {
        let body = json!({
            "series": [{
                "metric": metric_name,
                "points": [[timestamp, point]],
                "tags": tags,
            }]
        });
        let resp = self
            .client
            .post(format!("{}/api/v1/series", self.base_url))
            .query(&[("api_key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        if resp.status().as_u16() != 202 {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderResponse { status, body: text });
        }
        Ok(())
    }

    async fn get_unit(&self, metric_name: &str) -> Result<MetricMetadata> {
        let resp = self
            .client
            .get(format!("{}/api/v1/metrics/{}", self.base_url, metric_name))
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .send()
            .await?;
        Ok(resp.json::<MetricMetadata>().await?)
    }

    async fn set_unit(&self, metric_name: &str, metadata: &MetricMetadata) -> Result<()> {
        self.client
            .put(format!("{}/api/v1/metrics/{}", self.base_url, metric_name))
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .json(metadata)
            .send()
            .await?;
        Ok(())
    }

    async fn sync_unit(&self, metric_name: &str, unit_reference: &str) {
        // Failures here are reported but never retried or propagated: losing
        // unit metadata is cosmetic, unlike losing a datapoint.
        match self.get_unit(unit_reference).await {
            Ok(metadata) => {
                if let Err(err) = self.set_unit(metric_name, &metadata).await {
                    tracing::warn!(metric_name, %err, "failed to sync datadog unit metadata");
                }
            }
            Err(err) => {
                tracing::warn!(unit_reference, %err, "failed to read datadog unit metadata");
            }
        }
    }

    async fn fetch_once(&self, metric_name: &str, timestamp: i64, tags: &[String]) -> Result<f64> {
        let tag_filter = tags.join(",");
        let query = format!("{metric_name}{{{tag_filter}}}by{{host}}");
        let from = timestamp - QUERY_MARGIN_SECONDS;
        let to = timestamp + QUERY_MARGIN_SECONDS;
        let resp = self
            .client
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("api_key", self.api_key.as_str())])
            .query(&[("query", query.as_str())])
            .query(&[("from", from.to_string()), ("to", to.to_string())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderResponse { status: status.as_u16(), body: text });
        }
        let parsed: QueryResponse = resp.json().await?;
        let merged = merge_all_series_datapoints(&parsed.series);
        binary_search_near_timestamp(&merged, timestamp).ok_or_else(|| {
            Error::ProviderResponse {
                status: 0,
                body: "no datapoints in query response".to_string(),
            }
        })
    }
}

#[async_trait]
impl MetricProviderHandle for Datadog {
    async fn send(
        &self,
        metric_name: &str,
        timestamp: i64,
        point: f64,
        tags: &[String],
        unit_reference: Option<&str>,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(metric_name, timestamp, point, tags).await {
                Ok(()) => break,
                Err(err) if attempt < MAX_SEND_ATTEMPTS => {
                    tracing::warn!(metric_name, attempt, %err, "retrying datadog send");
                    tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
        if let Some(unit_reference) = unit_reference {
            self.sync_unit(metric_name, unit_reference).await;
        }
        Ok(())
    }

    async fn fetch(&self, metric_name: &str, timestamp: i64, tags: &[String]) -> Result<f64> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(metric_name, timestamp, tags).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < MAX_SEND_ATTEMPTS => {
                    tracing::warn!(metric_name, attempt, %err, "retrying datadog fetch");
                    tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn convert_resource_metric_name(&self, metric_name: &str, reverse: bool) -> Option<ProviderMetricIdentifier> {
        resource_metric_lookup(metric_name, reverse)
    }

    fn convert_object_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<ProviderMetricIdentifier> {
        None
    }

    fn convert_pods_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<ProviderMetricIdentifier> {
        None
    }

    fn add_sum_aggregator(&self, metric_name: &str) -> String {
        format!("sum:{metric_name}")
    }
}

const RESOURCE_METRIC_MAP: &[(&str, &str, i32)] = &[
    ("cpu", "kubernetes.cpu.usage.total", -9),
    ("memory", "kubernetes.memory.usage", 0),
];

fn resource_metric_lookup(name: &str, reverse: bool) -> Option<ProviderMetricIdentifier> {
    if !reverse {
        RESOURCE_METRIC_MAP
            .iter()
            .find(|(k, _, _)| *k == name)
            .map(|(_, v, scale)| ProviderMetricIdentifier { name: (*v).to_string(), scale: *scale })
    } else {
        RESOURCE_METRIC_MAP
            .iter()
            .find(|(_, v, _)| *v == name)
            .map(|(k, _, scale)| ProviderMetricIdentifier { name: (*k).to_string(), scale: *scale })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    series: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    pointlist: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetricMetadata {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
}

/// Sums duplicate timestamps across multiple series (one per host) into a
/// single sorted list of `(unix_time_seconds, value)` points.
fn merge_all_series_datapoints(series: &[Series]) -> Vec<(i64, f64)> {
    use std::collections::BTreeMap;
    let mut merged: BTreeMap<i64, f64> = BTreeMap::new();
    for s in series {
        for (ts_ms, value) in &s.pointlist {
            let ts = (*ts_ms / 1000.0).round() as i64;
            *merged.entry(ts).or_insert(0.0) += value;
        }
    }
    merged.into_iter().collect()
}

/// Finds the point nearest `target` (unix seconds) by repeatedly halving the
/// sorted slice: a midpoint strictly after `target` narrows into the left
/// half (excluding the midpoint), otherwise into the right half (including
/// it). This is a direct port of the original's recursive
/// `binarySearchNearTimestamp`, not a textbook nearest-neighbor search: it is
/// biased toward the floor, converging on the greatest point at or before
/// `target` when one exists.
fn binary_search_near_timestamp(points: &[(i64, f64)], target: i64) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let mut lo = 0usize;
    let mut hi = points.len();
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if points[mid].0 > target {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some(points[lo].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_metric_lookup_forward_and_reverse() {
        let cpu = resource_metric_lookup("cpu", false).unwrap();
        assert_eq!(cpu.name, "kubernetes.cpu.usage.total");
        assert_eq!(cpu.scale, -9);

        let back = resource_metric_lookup("kubernetes.memory.usage", true).unwrap();
        assert_eq!(back.name, "memory");
    }

    #[test]
    fn unknown_resource_metric_has_no_mapping() {
        assert!(resource_metric_lookup("unknown", false).is_none());
    }

    #[test]
    fn merge_sums_duplicate_timestamps_across_series() {
        let series = vec![
            Series { pointlist: vec![(1_000.0, 1.0), (2_000.0, 2.0)] },
            Series { pointlist: vec![(1_000.0, 3.0)] },
        ];
        let merged = merge_all_series_datapoints(&series);
        assert_eq!(merged, vec![(1, 4.0), (2, 2.0)]);
    }

    #[test]
    fn binary_search_converges_on_the_floor_point() {
        let points = vec![(0, 1.0), (60, 2.0), (120, 3.0), (180, 4.0)];
        // 125 sits between 120 and 180; the halving search converges on 120,
        // matching the original's floor-biased recursion rather than a
        // strict nearest-by-distance search.
        assert_eq!(binary_search_near_timestamp(&points, 125), Some(3.0));
        assert_eq!(binary_search_near_timestamp(&points, 120), Some(3.0));
    }

    #[test]
    fn binary_search_returns_the_smallest_point_when_target_precedes_all() {
        let points = vec![(100, 1.0), (200, 2.0)];
        assert_eq!(binary_search_near_timestamp(&points, 10), Some(1.0));
    }

    #[test]
    fn binary_search_returns_the_largest_point_when_target_follows_all() {
        let points = vec![(100, 1.0), (200, 2.0)];
        assert_eq!(binary_search_near_timestamp(&points, 1_000), Some(2.0));
    }

    #[test]
    fn add_sum_aggregator_prefixes_with_sum() {
        let dd = Datadog::new("k".to_string(), "a".to_string());
        assert_eq!(dd.add_sum_aggregator("kubernetes.cpu.usage.total"), "sum:kubernetes.cpu.usage.total");
    }
}
