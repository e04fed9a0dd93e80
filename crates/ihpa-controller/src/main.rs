//! Binary entrypoint: wires up the Kubernetes client, the estimator
//! manager, the three reconcile loops, and the `/metrics` + `/health`
//! server, then runs all of them concurrently until one exits.

mod config;
mod context;
mod error;
mod metrics;
mod reconcile;
mod scale_target;

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use ihpa_api::v1beta2::{Estimator, FittingJob, IntelligentHorizontalPodAutoscaler};
use ihpa_core::manager::EstimatorManager;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::{Api, Client};
use prometheus::Registry;

use config::{Config, LogFormat};
use context::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    tracing::info!("starting intelligent horizontal pod autoscaler controller");

    let client = Client::try_default().await?;
    let manager = EstimatorManager::with_capacity(config.manager_command_capacity);
    let ctx = Arc::new(Context::new(client.clone(), manager));

    let registry = Registry::new();
    let (addr, server_future) = metrics::serve_with_addr(&config.metrics_addr, registry).await?;
    tracing::info!(%addr, "metrics server ready");

    let ihpa_controller = run_ihpa_controller(client.clone(), ctx.clone());
    let fitting_job_controller = run_fitting_job_controller(client.clone(), ctx.clone());
    let estimator_controller = run_estimator_controller(client.clone(), ctx.clone());

    tokio::select! {
        result = server_future => {
            if let Err(err) = result {
                tracing::error!(%err, "metrics server exited with an error");
            }
        }
        _ = ihpa_controller => tracing::warn!("ihpa controller loop exited"),
        _ = fitting_job_controller => tracing::warn!("fittingjob controller loop exited"),
        _ = estimator_controller => tracing::warn!("estimator controller loop exited"),
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

async fn run_ihpa_controller(client: Client, ctx: Arc<Context>) {
    let api: Api<IntelligentHorizontalPodAutoscaler> = Api::all(client.clone());
    Controller::new(api, watcher::Config::default())
        .owns(Api::<k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler>::all(client.clone()), watcher::Config::default())
        .owns(Api::<FittingJob>::all(client.clone()), watcher::Config::default())
        .owns(Api::<Estimator>::all(client.clone()), watcher::Config::default())
        .run(reconcile::ihpa::reconcile, reconcile::ihpa::error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                tracing::warn!(%err, "ihpa reconcile produced an error");
            }
        })
        .await;
}

async fn run_fitting_job_controller(client: Client, ctx: Arc<Context>) {
    let api: Api<FittingJob> = Api::all(client.clone());
    Controller::new(api, watcher::Config::default())
        .owns(Api::<ConfigMap>::all(client.clone()), watcher::Config::default())
        .owns(Api::<CronJob>::all(client.clone()), watcher::Config::default())
        .run(reconcile::fittingjob::reconcile, reconcile::fittingjob::error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                tracing::warn!(%err, "fittingjob reconcile produced an error");
            }
        })
        .await;
}

async fn run_estimator_controller(client: Client, ctx: Arc<Context>) {
    let api: Api<Estimator> = Api::all(client.clone());
    Controller::new(api, watcher::Config::default())
        .owns(Api::<ConfigMap>::all(client.clone()), watcher::Config::default())
        .run(reconcile::estimator::reconcile, reconcile::estimator::error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                tracing::warn!(%err, "estimator reconcile produced an error");
            }
        })
        .await;
}
