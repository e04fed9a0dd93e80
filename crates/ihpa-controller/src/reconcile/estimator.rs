//! Reconciles one `Estimator`: keeps its exchange ConfigMap present, adds or
//! updates its worker in the estimator manager, and forwards whatever
//! forecast batch is currently sitting in the exchange blob into that
//! worker. Tears the worker down on deletion via a finalizer, since the
//! worker lives only in this process's memory and nothing about garbage
//! collecting the Estimator object itself would stop it.
//!
//! Grounded in `estimator_controller.go`.

use std::sync::Arc;
use std::time::Duration;

use ihpa_api::v1beta2::Estimator;
use ihpa_core::provider::config::active_provider;
use ihpa_core::worker::EstimateTarget;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ResourceExt};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event};

use crate::context::{namespaced_key, Context};
use crate::error::{Error, Result};

use super::{create_if_absent, ERROR_REQUEUE};

const ESTIMATOR_FINALIZER: &str = "ihpa.ake.example.io/estimator";

pub async fn reconcile(estimator: Arc<Estimator>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = estimator.namespace().ok_or_else(|| Error::MissingNamespace(estimator.name_any()))?;
    let api: Api<Estimator> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, ESTIMATOR_FINALIZER, estimator, |event| async {
        match event {
            Event::Apply(est) => apply(est, &ctx, &namespace).await,
            Event::Cleanup(est) => cleanup(est, &ctx, &namespace).await,
        }
    })
    .await
    .map_err(|err| Error::Finalizer(err.to_string()))
}

async fn apply(estimator: Arc<Estimator>, ctx: &Arc<Context>, namespace: &str) -> Result<Action> {
    let key = namespaced_key(namespace, &estimator.name_any());

    // The exchange ConfigMap is created empty if missing and never
    // otherwise touched here: the FittingJob's training container is the
    // one that writes the forecast batch into it.
    let config_map_api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    let mut config_map_meta = k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        name: Some(estimator.spec.data_config_map.name.clone().unwrap_or_default()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    };
    ihpa_core::util::add_owner_reference(
        "ihpa.ake.example.io/v1beta2",
        "Estimator",
        &estimator.metadata,
        &mut config_map_meta,
    );
    let config_map_name = config_map_meta.name.clone().unwrap_or_default();
    create_if_absent(&config_map_api, &config_map_name, ConfigMap { metadata: config_map_meta, ..Default::default() })
        .await?;

    let provider = active_provider(&estimator.spec.provider).ok_or_else(|| Error::NoProviderConfigured(key.clone()))?;
    let target = EstimateTarget {
        id: key.clone(),
        mode: estimator.spec.mode,
        gap_minutes: estimator.spec.gap_minutes,
        metric_name: estimator.spec.metric_name.clone(),
        metric_tags: estimator.spec.metric_tags.clone(),
        base_metric_name: estimator.spec.base_metric_name.clone(),
        base_metric_tags: estimator.spec.base_metric_tags.clone(),
        provider,
    };

    let sender = match ctx.estimator_sender(&key) {
        Some(_) => ctx.manager.update(target).await?,
        None => ctx.manager.add(target).await?,
    };
    ctx.set_estimator_sender(&key, sender.clone());

    // Forward whatever batch is currently in the exchange ConfigMap, so a
    // worker that was just (re)spawned doesn't have to wait for the next
    // training run to pick up existing data.
    let config_map = config_map_api.get(&config_map_name).await?;
    let data = config_map
        .binary_data
        .as_ref()
        .and_then(|d| d.get(&estimator.spec.base_metric_name))
        .map(|b| b.0.clone())
        .or_else(|| {
            config_map
                .data
                .as_ref()
                .and_then(|d| d.get(&estimator.spec.base_metric_name))
                .map(|s| s.clone().into_bytes())
        });
    if let Some(bytes) = data {
        if let Err(err) = sender.send(bytes).await {
            tracing::warn!(%key, %err, "failed to forward exchange blob to estimator worker");
        }
    }

    Ok(Action::requeue(Duration::from_secs(60)))
}

async fn cleanup(estimator: Arc<Estimator>, ctx: &Arc<Context>, namespace: &str) -> Result<Action> {
    let key = namespaced_key(namespace, &estimator.name_any());
    ctx.manager.remove(key.clone()).await?;
    ctx.forget_estimator(&key);
    Ok(Action::await_change())
}

pub fn error_policy(_estimator: Arc<Estimator>, err: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(%err, "estimator reconcile failed, requeuing");
    Action::requeue(ERROR_REQUEUE)
}
