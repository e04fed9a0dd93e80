/// Errors raised while deriving resources for one declared metric. The
/// reconciler aggregates these per IHPA and reports them once, rather than
/// failing the whole reconcile on the first bad metric.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("metric is not supported yet: only Resource and External metric types are handled")]
    UnsupportedMetricType,

    #[error("no metric provider is configured for this IHPA (neither datadog nor prometheus is set)")]
    NoProviderConfigured,

    #[error("provider has no translation for resource metric {0:?}")]
    MissingResourceTranslation(String),

    #[error("scale target has no declared request for resource {0:?}")]
    MissingContainerRequest(String),

    #[error("failed to serialize training job config: {0}")]
    ConfigSerialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
