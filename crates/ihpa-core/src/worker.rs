//! The estimator worker (C3): the per-target cooperative task that walks a
//! forecast batch forward in time, anchors it against reality in `adjust`
//! mode, and emits bare/raw/upper/lower points to the metric provider.
//! Grounded in `controllers/estimator.go`'s `estimator()` method.

use std::sync::Arc;
use std::time::Duration;

use ihpa_api::v1beta2::EstimateMode;
use tokio::sync::{mpsc, watch};

use crate::estimate::{adjust_yhat, join_estimate_data, read_estimate_data_csv, EstimateDatum};
use crate::provider::MetricProviderHandle;
use crate::queue::PastPredictionQueue;

/// Default wait between ticks when there is no forecast data to process,
/// matching the original's fallback `5 * time.Second`.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Capacity of a worker's ingestion channel. Matches spec's stated
/// backpressure default.
pub const DATA_CHANNEL_CAPACITY: usize = 5;

/// Everything a worker needs to know about the metric it estimates.
#[derive(Clone)]
pub struct EstimateTarget {
    pub id: String,
    pub mode: EstimateMode,
    pub gap_minutes: i32,
    pub metric_name: String,
    pub metric_tags: Vec<String>,
    pub base_metric_name: String,
    pub base_metric_tags: Vec<String>,
    pub provider: Arc<dyn MetricProviderHandle>,
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// The worker's in-memory state: the current forecast batch, its read
/// position, and the queue of already-sent predictions awaiting anchoring.
#[derive(Default)]
pub struct WorkerState {
    data: Vec<EstimateDatum>,
    position: usize,
    past_queue: PastPredictionQueue,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn position(&self) -> usize {
        self.position
    }

    #[cfg(test)]
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Ingests a freshly received CSV batch: parses it, shifts it back by
    /// `gap_minutes`, joins it onto the current batch, drops everything at
    /// or before `now`, and resets the read position to the start of what
    /// remains.
    pub fn ingest(&mut self, csv: &[u8], gap_minutes: i32, now: i64) -> crate::error::Result<Duration> {
        let mut new_batch = read_estimate_data_csv(csv)?;
        let gap_seconds = i64::from(gap_minutes) * 60;
        for datum in &mut new_batch {
            datum.estimate_unix_time -= gap_seconds;
        }
        let joined = join_estimate_data(new_batch, std::mem::take(&mut self.data));
        self.data = joined.into_iter().filter(|d| d.estimate_unix_time > now).collect();
        self.position = 0;
        Ok(self.next_wait(now))
    }

    fn next_wait(&self, now: i64) -> Duration {
        match self.data.get(self.position) {
            Some(next) => {
                let delta = next.estimate_unix_time - now;
                Duration::from_secs(delta.max(0) as u64)
            }
            None => DEFAULT_WAIT,
        }
    }

    /// Runs one timer-tick's worth of work: if there is a forecast due,
    /// optionally anchors it against the provider's observed reality, sends
    /// all four derived points, advances the read position, and returns the
    /// wait until the next tick.
    pub async fn tick(&mut self, target: &EstimateTarget, now: i64) -> Duration {
        if self.data.is_empty() || self.position >= self.data.len() {
            return DEFAULT_WAIT;
        }

        let current = self.data[self.position];
        let mut adjusted_yhat = current.yhat;

        if self.position != 0 && target.mode == EstimateMode::Adjust {
            if let Some(previous) = self.past_queue.seek_by_unix_time(now) {
                let fetch_metric = target.provider.add_sum_aggregator(&target.base_metric_name);
                let actual = match target.provider.fetch(&fetch_metric, previous.unix_time, &target.base_metric_tags).await {
                    Ok(value) => value,
                    Err(_) => previous.yhat,
                };
                let candidate = adjust_yhat(&previous, &current, actual);
                if candidate > adjusted_yhat {
                    adjusted_yhat = candidate;
                }
            }
        }

        send_all(target, &current, adjusted_yhat).await;

        self.past_queue.enqueue(current);
        self.position += 1;
        self.next_wait(now)
    }
}

async fn send_all(target: &EstimateTarget, current: &EstimateDatum, adjusted_yhat: f64) {
    let ts = current.estimate_unix_time;
    let sends = [
        (target.metric_name.clone(), adjusted_yhat),
        (format!("{}.raw", target.metric_name), current.yhat),
        (format!("{}.upper", target.metric_name), current.upper_yhat),
        (format!("{}.lower", target.metric_name), current.lower_yhat),
    ];
    for (name, value) in sends {
        if let Err(err) = target
            .provider
            .send(&name, ts, value, &target.metric_tags, Some(&target.base_metric_name))
            .await
        {
            tracing::warn!(metric = %name, %err, "failed to send forecast point");
        }
    }
}

/// The handle the estimator manager holds for a running worker: the
/// channel feeding it fresh CSV batches and the stop signal that ends it.
pub struct WorkerHandle {
    pub data_tx: mpsc::Sender<Vec<u8>>,
    pub stop_tx: watch::Sender<bool>,
    pub join: tokio::task::JoinHandle<()>,
}

/// Spawns a worker task for `target`. Returns the handle the manager uses
/// to feed it data and stop it.
pub fn spawn_worker(target: EstimateTarget) -> WorkerHandle {
    let (data_tx, data_rx) = mpsc::channel(DATA_CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);
    let join = tokio::spawn(run_worker(target, data_rx, stop_rx));
    WorkerHandle { data_tx, stop_tx, join }
}

async fn run_worker(target: EstimateTarget, mut data_rx: mpsc::Receiver<Vec<u8>>, mut stop_rx: watch::Receiver<bool>) {
    let mut state = WorkerState::new();
    let mut wait = DEFAULT_WAIT;

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(wait) => {
                wait = state.tick(&target, now_unix()).await;
            }
        }

        match data_rx.try_recv() {
            Ok(bytes) => match state.ingest(&bytes, target.gap_minutes, now_unix()) {
                Ok(new_wait) => wait = new_wait,
                Err(err) => tracing::warn!(id = %target.id, %err, "dropping malformed forecast batch"),
            },
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockProvider {
        sent: Mutex<Vec<(String, i64, f64)>>,
        fetch_value: Mutex<f64>,
    }

    #[async_trait]
    impl MetricProviderHandle for MockProvider {
        async fn send(&self, metric_name: &str, timestamp: i64, point: f64, _tags: &[String], _unit_reference: Option<&str>) -> crate::error::Result<()> {
            self.sent.lock().unwrap().push((metric_name.to_string(), timestamp, point));
            Ok(())
        }

        async fn fetch(&self, _metric_name: &str, _timestamp: i64, _tags: &[String]) -> crate::error::Result<f64> {
            Ok(*self.fetch_value.lock().unwrap())
        }

        fn convert_resource_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<super::super::provider::ProviderMetricIdentifier> {
            None
        }
        fn convert_object_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<super::super::provider::ProviderMetricIdentifier> {
            None
        }
        fn convert_pods_metric_name(&self, _metric_name: &str, _reverse: bool) -> Option<super::super::provider::ProviderMetricIdentifier> {
            None
        }
        fn add_sum_aggregator(&self, metric_name: &str) -> String {
            format!("sum:{metric_name}")
        }
    }

    fn target(provider: Arc<MockProvider>, mode: EstimateMode) -> EstimateTarget {
        EstimateTarget {
            id: "ns/name".to_string(),
            mode,
            gap_minutes: 10,
            metric_name: "ake.ihpa.forecasted_cpu".to_string(),
            metric_tags: vec!["env:prod".to_string()],
            base_metric_name: "kubernetes.cpu.usage.total".to_string(),
            base_metric_tags: vec!["env:prod".to_string()],
            provider,
        }
    }

    fn csv_for(rows: &[(i64, f64, f64, f64)]) -> Vec<u8> {
        let mut s = String::from("timestamp,yhat,yhat_upper,yhat_lower\n");
        for (t, y, u, l) in rows {
            s.push_str(&format!("{t},{y},{u},{l}\n"));
        }
        s.into_bytes()
    }

    #[tokio::test]
    async fn ingest_shifts_by_gap_and_drops_past_rows() {
        let provider = Arc::new(MockProvider::default());
        let mut state = WorkerState::new();
        let now = 1_000_000;
        let csv = csv_for(&[(now - 100, 1.0, 2.0, 0.0), (now + 10_000, 1.0, 2.0, 0.0)]);
        state.ingest(&csv, 10, now).unwrap();
        // gap_minutes=10 shifts estimate_unix_time back by 600s, so the
        // first row (now-100 -> now-700) is dropped as already past.
        assert_eq!(state.data_len(), 1);
        let _ = target(provider, EstimateMode::Raw);
    }

    #[tokio::test]
    async fn tick_with_empty_batch_returns_default_wait() {
        let provider = Arc::new(MockProvider::default());
        let mut state = WorkerState::new();
        let t = target(provider, EstimateMode::Raw);
        let wait = state.tick(&t, 0).await;
        assert_eq!(wait, DEFAULT_WAIT);
    }

    #[tokio::test]
    async fn raw_mode_never_anchors_against_the_provider() {
        let provider = Arc::new(MockProvider::default());
        *provider.fetch_value.lock().unwrap() = 999.0;
        let mut state = WorkerState::new();
        let now = 1_000_000;
        let csv = csv_for(&[(now + 10, 10.0, 15.0, 5.0), (now + 70, 11.0, 16.0, 6.0)]);
        state.ingest(&csv, 0, now).unwrap();
        let t = target(provider.clone(), EstimateMode::Raw);
        state.tick(&t, now + 10).await;
        state.tick(&t, now + 70).await;
        let sent = provider.sent.lock().unwrap();
        // bare forecasted metric should carry the untouched yhat both times.
        let bare: Vec<f64> = sent.iter().filter(|(name, _, _)| name == &t.metric_name).map(|(_, _, v)| *v).collect();
        assert_eq!(bare, vec![10.0, 11.0]);
    }

    #[tokio::test]
    async fn adjust_mode_sends_four_points_per_tick() {
        let provider = Arc::new(MockProvider::default());
        let mut state = WorkerState::new();
        let now = 1_000_000;
        let csv = csv_for(&[(now + 10, 10.0, 15.0, 5.0)]);
        state.ingest(&csv, 0, now).unwrap();
        let t = target(provider.clone(), EstimateMode::Adjust);
        state.tick(&t, now + 10).await;
        assert_eq!(provider.sent.lock().unwrap().len(), 4);
    }
}
