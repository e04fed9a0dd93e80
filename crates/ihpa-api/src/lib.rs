//! Data model for the intelligent horizontal pod autoscaler controller:
//! the `IntelligentHorizontalPodAutoscaler`, `FittingJob`, and `Estimator`
//! custom resources, their shared patch types, and the forecast identity
//! hash that ties a declared metric to everything generated from it.

pub mod identity;
pub mod v1beta2;

pub use identity::ForecastIdentity;
