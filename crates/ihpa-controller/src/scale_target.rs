//! Fetches the scale target's container list so the generator can convert
//! utilization-percentage metrics into absolute average values. Grounded in
//! `intelligenthorizontalpodautoscaler_generator_impl.go`'s dispatch over
//! `scaleTarget.Kind` in `NewIntelligentHorizontalPodAutoscalerGenerator`.

use std::collections::BTreeMap;

use ihpa_core::util::total_resource_list;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{Api, Client};

use crate::error::{Error, Result};

/// Fetches the scale target workload and sums its containers' resource
/// requests, dispatching on `kind` the same way the original generator does.
pub async fn fetch_scale_target_requests(
    client: &Client,
    namespace: &str,
    kind: &str,
    name: &str,
) -> Result<BTreeMap<String, Quantity>> {
    let containers = match kind {
        "Deployment" => {
            let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
            let deployment = api.get(name).await?;
            deployment
                .spec
                .and_then(|spec| spec.template.spec)
                .map(|pod_spec| pod_spec.containers)
                .unwrap_or_default()
        }
        "StatefulSet" => {
            let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
            let stateful_set = api.get(name).await?;
            stateful_set
                .spec
                .and_then(|spec| spec.template.spec)
                .map(|pod_spec| pod_spec.containers)
                .unwrap_or_default()
        }
        "ReplicaSet" => {
            let api: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
            let replica_set = api.get(name).await?;
            replica_set
                .spec
                .and_then(|spec| spec.template)
                .and_then(|template| template.spec)
                .map(|pod_spec| pod_spec.containers)
                .unwrap_or_default()
        }
        other => return Err(Error::UnsupportedScaleTargetKind(other.to_string())),
    };

    Ok(total_resource_list(&containers))
}

/// Fetches the `kube-system` namespace's UID, used to scope generated
/// metrics to this cluster.
pub async fn fetch_kube_system_uid(client: &Client) -> Result<String> {
    use k8s_openapi::api::core::v1::Namespace;
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = api.get("kube-system").await?;
    Ok(ns.metadata.uid.unwrap_or_default())
}
