//! Reconciles one `IntelligentHorizontalPodAutoscaler`: derives and applies
//! its HorizontalPodAutoscaler, RBAC triple, FittingJobs, and Estimators,
//! then prunes whatever it generated on a previous pass that the current
//! spec no longer declares. Grounded in full in
//! `intelligenthorizontalpodautoscaler_controller.go`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ihpa_api::v1beta2::{Estimator, FittingJob, IntelligentHorizontalPodAutoscaler};
use ihpa_generator::{IhpaGenerator, FITTING_JOB_ID_ANNOTATION};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, ListParams, Patch, PatchParams, ResourceExt};
use kube::runtime::controller::Action;
use serde_json::json;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::scale_target::{fetch_kube_system_uid, fetch_scale_target_requests};

use super::{create_if_absent, create_or_replace, ERROR_REQUEUE};

/// Annotation on the IHPA itself recording the identity hashes of every
/// FittingJob/Estimator it most recently generated, so the next reconcile
/// can tell what fell out of the spec. Matches upstream's
/// `fittingJobIDsAnnotation`.
const FITTING_JOB_IDS_ANNOTATION: &str = "ihpa.ake.example.io/fittingjob-ids";

pub async fn reconcile(ihpa: Arc<IntelligentHorizontalPodAutoscaler>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = ihpa.namespace().ok_or_else(|| Error::MissingNamespace(ihpa.name_any()))?;
    let client = &ctx.client;

    let kube_system_uid = fetch_kube_system_uid(client).await?;
    let target_ref = &ihpa.spec.horizontal_pod_autoscaler_template.spec.scale_target_ref;
    let scale_target_requests =
        fetch_scale_target_requests(client, &namespace, &target_ref.kind, &target_ref.name).await?;

    let generator = IhpaGenerator::new(&ihpa, kube_system_uid, scale_target_requests);

    let hpa_api: Api<k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler> = Api::namespaced(client.clone(), &namespace);
    let hpa = generator.horizontal_pod_autoscaler_resource()?;
    let hpa_name = hpa.name_any();
    create_or_replace(&hpa_api, &hpa_name, hpa).await?;

    let (service_account, role, role_binding) = generator.rbac_resources();
    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);
    let role_api: Api<Role> = Api::namespaced(client.clone(), &namespace);
    let rb_api: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
    let rbac_name = service_account.name_any();
    create_if_absent(&sa_api, &rbac_name, service_account).await?;
    create_if_absent(&role_api, &rbac_name, role).await?;
    create_if_absent(&rb_api, &rbac_name, role_binding).await?;

    let fitting_job_api: Api<FittingJob> = Api::namespaced(client.clone(), &namespace);
    let estimator_api: Api<Estimator> = Api::namespaced(client.clone(), &namespace);

    let mut current_ids = BTreeSet::new();
    for fitting_job in generator.fitting_job_resources()? {
        if let Some(id) = fitting_job.annotations().get(FITTING_JOB_ID_ANNOTATION) {
            current_ids.insert(id.clone());
        }
        let name = fitting_job.name_any();
        create_or_replace(&fitting_job_api, &name, fitting_job).await?;
    }
    for estimator in generator.estimator_resources()? {
        let name = estimator.name_any();
        create_or_replace(&estimator_api, &name, estimator).await?;
    }

    let previous_ids: BTreeSet<String> = ihpa
        .annotations()
        .get(FITTING_JOB_IDS_ANNOTATION)
        .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    let delete_ids: BTreeSet<String> = previous_ids.difference(&current_ids).cloned().collect();

    if !delete_ids.is_empty() {
        let fitting_job_all: Api<FittingJob> = Api::all(client.clone());
        let estimator_all: Api<Estimator> = Api::all(client.clone());
        prune_by_identity(&fitting_job_all, &delete_ids).await?;
        prune_by_identity(&estimator_all, &delete_ids).await?;
    }

    let ihpa_api: Api<IntelligentHorizontalPodAutoscaler> = Api::namespaced(client.clone(), &namespace);
    let joined = current_ids.iter().cloned().collect::<Vec<_>>().join(",");
    let patch = json!({
        "metadata": {
            "annotations": {
                FITTING_JOB_IDS_ANNOTATION: joined,
            }
        }
    });
    ihpa_api
        .patch(&ihpa.name_any(), &PatchParams::apply("ihpa-controller"), &Patch::Merge(&patch))
        .await?;

    Ok(Action::requeue(Duration::from_secs(600)))
}

/// Deletes every object whose `FITTING_JOB_ID_ANNOTATION` value is in
/// `delete_ids`. Matches upstream listing ALL FittingJobs/Estimators
/// cluster-wide and filtering by annotation, rather than scoping the list
/// to this IHPA's namespace, since the annotation alone is the identity.
async fn prune_by_identity<K>(api: &Api<K>, delete_ids: &BTreeSet<String>) -> Result<()>
where
    K: kube::Resource<DynamicType = ()> + Clone + std::fmt::Debug + serde::de::DeserializeOwned + serde::Serialize,
{
    let list = api.list(&ListParams::default()).await?;
    for item in list {
        let matches = item
            .annotations()
            .get(FITTING_JOB_ID_ANNOTATION)
            .map(|id| delete_ids.contains(id))
            .unwrap_or(false);
        if matches {
            let _ = api.delete(&item.name_any(), &Default::default()).await;
        }
    }
    Ok(())
}

pub fn error_policy(_ihpa: Arc<IntelligentHorizontalPodAutoscaler>, err: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(%err, "ihpa reconcile failed, requeuing");
    Action::requeue(ERROR_REQUEUE)
}
