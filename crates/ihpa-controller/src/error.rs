//! Controller-level errors: everything a reconciler can fail with, wrapping
//! the Kubernetes API client and the lower crates' own error types.

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("kubernetes api request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("resource derivation failed: {0}")]
    Generator(#[from] ihpa_generator::Error),

    #[error("estimator manager request failed: {0}")]
    Manager(#[from] ihpa_core::error::Error),

    #[error("scale target {kind}/{name} has no container resource requests to translate utilization metrics against")]
    ScaleTargetNotFound { kind: String, name: String },

    #[error("scale target kind {0:?} is not supported; expected Deployment, StatefulSet, or ReplicaSet")]
    UnsupportedScaleTargetKind(String),

    #[error("object {0:?} is missing a namespace")]
    MissingNamespace(String),

    #[error("no metric provider is configured for estimator {0:?} (neither datadog nor prometheus is set)")]
    NoProviderConfigured(String),

    #[error("finalizer handling failed: {0}")]
    Finalizer(String),

    #[error("metrics server io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
