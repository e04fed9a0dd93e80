//! The three reconcile loops: one per custom resource this controller
//! manages. Each is grounded in its own upstream `*_controller.go` file and
//! driven by its own `kube::runtime::Controller`.

pub mod estimator;
pub mod fittingjob;
pub mod ihpa;

use std::fmt::Debug;
use std::time::Duration;

use kube::api::{Api, PostParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Requeue delay used after a reconcile error, matching the original's
/// fixed `RequeueAfter` on failure (upstream uses 30s across all three
/// controllers).
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Create-or-replace: fetches the existing object (if any), carries over its
/// `resourceVersion` so the update is accepted, and replaces it wholesale
/// with `desired`. Matches the Go originals' explicit Get-then-Create-or-
/// Update pattern, where an update always overwrites the whole `Spec`.
pub async fn create_or_replace<K>(api: &Api<K>, name: &str, mut desired: K) -> kube::Result<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Serialize,
{
    match api.get_opt(name).await? {
        Some(existing) => {
            desired.meta_mut().resource_version = existing.meta().resource_version.clone();
            api.replace(name, &PostParams::default(), &desired).await
        }
        None => api.create(&PostParams::default(), &desired).await,
    }
}

/// Create-if-absent: used for objects the original never updates once
/// created (the RBAC triple, and the Estimator's own exchange ConfigMap,
/// which is deliberately left alone because the FittingJob's training
/// container is the one that writes into it).
pub async fn create_if_absent<K>(api: &Api<K>, name: &str, desired: K) -> kube::Result<()>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Serialize,
{
    if api.get_opt(name).await?.is_none() {
        api.create(&PostParams::default(), &desired).await?;
    }
    Ok(())
}
