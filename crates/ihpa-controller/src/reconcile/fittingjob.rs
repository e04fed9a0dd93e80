//! Reconciles one `FittingJob`: derives and applies its training config
//! ConfigMap and its CronJob. Grounded in `fittingjob_controller.go` and
//! `fittingjob_generator_impl.go`.

use std::sync::Arc;

use ihpa_api::v1beta2::FittingJob;
use ihpa_generator::FittingJobGenerator;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ResourceExt};
use kube::runtime::controller::Action;

use crate::context::Context;
use crate::error::{Error, Result};

use super::{create_or_replace, ERROR_REQUEUE};

pub async fn reconcile(fitting_job: Arc<FittingJob>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = fitting_job.namespace().ok_or_else(|| Error::MissingNamespace(fitting_job.name_any()))?;
    let client = &ctx.client;

    let generator = FittingJobGenerator::new(&fitting_job);

    let config_map = generator.config_map_resource()?;
    let config_map_api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    create_or_replace(&config_map_api, &config_map.name_any(), config_map).await?;

    let cron_job = generator.cron_job_resource();
    let cron_job_api: Api<CronJob> = Api::namespaced(client.clone(), &namespace);
    create_or_replace(&cron_job_api, &cron_job.name_any(), cron_job).await?;

    Ok(Action::await_change())
}

pub fn error_policy(_fitting_job: Arc<FittingJob>, err: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(%err, "fittingjob reconcile failed, requeuing");
    Action::requeue(ERROR_REQUEUE)
}
