//! Resource derivation for the intelligent horizontal pod autoscaler
//! controller: turns one IHPA into the HorizontalPodAutoscaler, FittingJob,
//! Estimator, and RBAC objects it owns, and turns one FittingJob into the
//! training config ConfigMap and CronJob that actually run it.

pub mod error;
pub mod fittingjob;
pub mod naming;
pub mod resources;

pub use error::{Error, Result};
pub use fittingjob::FittingJobGenerator;
pub use resources::{IhpaGenerator, FITTING_JOB_ID_ANNOTATION};
