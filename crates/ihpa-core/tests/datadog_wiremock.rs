//! Integration tests for the Datadog provider adapter against a local mock
//! server, covering the wire protocol described for the metric provider
//! adapter: `POST /api/v1/series` and `GET /api/v1/query`.

use ihpa_core::provider::datadog::Datadog;
use ihpa_core::provider::MetricProviderHandle;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn send_posts_a_series_point_and_succeeds_on_202() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/series"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let dd = Datadog::with_base_url("k".to_string(), "a".to_string(), server.uri());
    let result = dd
        .send("ake.ihpa.forecasted_cpu", 1_000, 42.0, &["env:prod".to_string()], None)
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn send_surfaces_a_non_2xx_response_as_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/series"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad metric"))
        .mount(&server)
        .await;

    let dd = Datadog::with_base_url("k".to_string(), "a".to_string(), server.uri());
    let result = dd.send("bad.metric", 1_000, 1.0, &[], None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn fetch_sums_series_and_returns_the_point_nearest_the_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "series": [
                {"pointlist": [[1_000_000.0, 1.0], [1_060_000.0, 2.0]]},
                {"pointlist": [[1_000_000.0, 3.0]]}
            ]
        })))
        .mount(&server)
        .await;

    let dd = Datadog::with_base_url("k".to_string(), "a".to_string(), server.uri());
    let value = dd.fetch("kubernetes.cpu.usage.total", 1_060, &["env:prod".to_string()]).await.unwrap();
    assert_eq!(value, 2.0);
}

#[tokio::test]
async fn fetch_retries_on_transient_failure_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "series": [{"pointlist": [[5_000.0, 7.0]]}]
        })))
        .mount(&server)
        .await;

    let dd = Datadog::with_base_url("k".to_string(), "a".to_string(), server.uri());
    let value = dd.fetch("kubernetes.cpu.usage.total", 5, &[]).await.unwrap();
    assert_eq!(value, 7.0);
}
