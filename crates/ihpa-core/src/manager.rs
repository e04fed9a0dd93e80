//! The estimator manager (C4): a single command loop, fed over an mpsc
//! channel, that owns the fleet of estimator worker tasks and adds/updates/
//! removes them as reconciles come in. Grounded in
//! `controllers/estimator.go`'s `estimatorHandler` goroutine, following the
//! mpsc-command-loop idiom used elsewhere in this workspace for owning
//! long-lived task state behind a channel.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::worker::{spawn_worker, EstimateTarget, WorkerHandle};

/// Default capacity of the manager's command channel. The upstream Go
/// channel is unbuffered; a bounded channel of depth 1 approximates that
/// while remaining expressible as a `tokio::mpsc` channel, which requires
/// capacity >= 1.
pub const DEFAULT_COMMAND_CAPACITY: usize = 1;

enum ManagerCommand {
    Add {
        target: EstimateTarget,
        respond_to: oneshot::Sender<mpsc::Sender<Vec<u8>>>,
    },
    Update {
        target: EstimateTarget,
        respond_to: oneshot::Sender<mpsc::Sender<Vec<u8>>>,
    },
    Remove {
        id: String,
    },
    Shutdown,
}

/// A handle to the running manager task. Cloning is not supported; share it
/// behind an `Arc` if multiple reconcilers need it.
pub struct EstimatorManager {
    sender: mpsc::Sender<ManagerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl EstimatorManager {
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_COMMAND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_manager(receiver));
        Self { sender, handle: Some(handle) }
    }

    /// Registers a new estimator worker and returns the sender the caller
    /// should keep to push freshly fetched CSV batches into it (matching the
    /// reconciler's own `estimatorChs` map upstream).
    pub async fn add(&self, target: EstimateTarget) -> Result<mpsc::Sender<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Add { target, respond_to: tx })
            .await
            .map_err(|_| Error::ManagerClosed)?;
        rx.await.map_err(|_| Error::ManagerClosed)
    }

    /// Replaces the running worker for `target.id` with a freshly spawned
    /// one built from the patched target. The data channel is recreated
    /// rather than carried over (see DESIGN.md); callers must store the
    /// returned sender in place of whatever they held before.
    pub async fn update(&self, target: EstimateTarget) -> Result<mpsc::Sender<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Update { target, respond_to: tx })
            .await
            .map_err(|_| Error::ManagerClosed)?;
        rx.await.map_err(|_| Error::ManagerClosed)
    }

    pub async fn remove(&self, id: impl Into<String>) -> Result<()> {
        self.sender
            .send(ManagerCommand::Remove { id: id.into() })
            .await
            .map_err(|_| Error::ManagerClosed)
    }

    /// Stops every worker and the manager task itself, waiting for the task
    /// to finish.
    pub async fn shutdown(mut self) {
        let _ = self.sender.send(ManagerCommand::Shutdown).await;
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for EstimatorManager {
    fn drop(&mut self) {
        let _ = self.sender.try_send(ManagerCommand::Shutdown);
    }
}

fn stop_worker(entry: &WorkerHandle) {
    let _ = entry.stop_tx.send(true);
}

async fn run_manager(mut receiver: mpsc::Receiver<ManagerCommand>) {
    let mut workers: HashMap<String, WorkerHandle> = HashMap::new();

    while let Some(command) = receiver.recv().await {
        match command {
            ManagerCommand::Add { target, respond_to } => {
                let id = target.id.clone();
                let handle = spawn_worker(target);
                let data_tx = handle.data_tx.clone();
                workers.insert(id, handle);
                let _ = respond_to.send(data_tx);
            }
            ManagerCommand::Update { target, respond_to } => {
                let id = target.id.clone();
                if let Some(old) = workers.remove(&id) {
                    stop_worker(&old);
                }
                let handle = spawn_worker(target);
                let data_tx = handle.data_tx.clone();
                workers.insert(id, handle);
                let _ = respond_to.send(data_tx);
            }
            ManagerCommand::Remove { id } => {
                if let Some(old) = workers.remove(&id) {
                    stop_worker(&old);
                }
            }
            ManagerCommand::Shutdown => {
                break;
            }
        }
    }

    for (_, handle) in workers.drain() {
        stop_worker(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::prometheus::Prometheus;
    use ihpa_api::v1beta2::EstimateMode;
    use std::sync::Arc;

    fn target(id: &str) -> EstimateTarget {
        EstimateTarget {
            id: id.to_string(),
            mode: EstimateMode::Raw,
            gap_minutes: 10,
            metric_name: "ake.ihpa.forecasted_cpu".to_string(),
            metric_tags: vec![],
            base_metric_name: "cpu".to_string(),
            base_metric_tags: vec![],
            provider: Arc::new(Prometheus::new()),
        }
    }

    #[tokio::test]
    async fn add_returns_a_usable_data_sender() {
        let manager = EstimatorManager::spawn();
        let tx = manager.add(target("ns/a")).await.unwrap();
        assert!(tx.send(b"timestamp,yhat,yhat_upper,yhat_lower\n".to_vec()).await.is_ok());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn update_replaces_the_worker_and_returns_a_new_sender() {
        let manager = EstimatorManager::spawn();
        let _ = manager.add(target("ns/a")).await.unwrap();
        let tx2 = manager.update(target("ns/a")).await.unwrap();
        assert!(tx2.send(Vec::new()).await.is_ok());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn remove_is_idempotent_for_unknown_ids() {
        let manager = EstimatorManager::spawn();
        assert!(manager.remove("does-not-exist").await.is_ok());
        manager.shutdown().await;
    }
}
