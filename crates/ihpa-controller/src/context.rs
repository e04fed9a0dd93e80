//! Shared reconciler context: the Kubernetes client, the estimator manager,
//! and the in-memory map the Estimator reconciler uses to know which worker
//! a freshly observed exchange blob belongs to.
//!
//! Grounded in `estimator_controller.go`'s `estimatorChs` field — a plain
//! in-memory map owned by the controller struct, reset whenever the process
//! restarts. The IHPA reconciler's own bookkeeping
//! (`fittingJobMap`/`fittingJobIDsAnnotation` upstream) is instead kept as
//! an annotation on the IHPA object itself here, since that state needs to
//! survive a controller restart and a plain in-memory map would not.

use std::collections::HashMap;
use std::sync::Mutex;

use ihpa_core::manager::EstimatorManager;
use kube::Client;
use tokio::sync::mpsc;

pub struct Context {
    pub client: Client,
    pub manager: EstimatorManager,
    /// Estimator namespaced name -> sender feeding that estimator's worker
    /// its forecast batches. Used to tell an Add from an Update, and to
    /// forward newly observed exchange-blob contents into the right worker.
    estimator_senders: Mutex<HashMap<String, mpsc::Sender<Vec<u8>>>>,
}

impl Context {
    pub fn new(client: Client, manager: EstimatorManager) -> Self {
        Self {
            client,
            manager,
            estimator_senders: Mutex::new(HashMap::new()),
        }
    }

    pub fn estimator_sender(&self, estimator_key: &str) -> Option<mpsc::Sender<Vec<u8>>> {
        self.estimator_senders.lock().unwrap().get(estimator_key).cloned()
    }

    pub fn set_estimator_sender(&self, estimator_key: &str, sender: mpsc::Sender<Vec<u8>>) {
        self.estimator_senders.lock().unwrap().insert(estimator_key.to_string(), sender);
    }

    pub fn forget_estimator(&self, estimator_key: &str) {
        self.estimator_senders.lock().unwrap().remove(estimator_key);
    }
}

/// The `"<namespace>/<name>"` key used throughout the fleet maps, matching
/// the Go reconcilers' use of `req.String()` (a `types.NamespacedName`) as
/// their map key.
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
