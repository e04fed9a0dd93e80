/// Errors surfaced by the provider adapter, CSV ingestion, and estimator
/// worker/manager.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("metric provider request failed: {0}")]
    ProviderRequest(#[from] reqwest::Error),

    #[error("metric provider returned an error response: {status}: {body}")]
    ProviderResponse { status: u16, body: String },

    #[error("metric provider does not support this operation: {0}")]
    ProviderUnsupported(String),

    #[error("failed to parse forecast CSV batch: {0}")]
    CsvFormat(String),

    #[error("failed to parse forecast CSV batch: {0}")]
    Csv(#[from] csv::Error),

    #[error("estimator manager command channel is closed")]
    ManagerClosed,

    #[error("estimator manager command channel is full")]
    ManagerBusy,

    #[error("no estimator worker is registered for id {0:?}")]
    UnknownWorker(String),
}

pub type Result<T> = std::result::Result<T, Error>;
