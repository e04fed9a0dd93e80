mod estimator;
mod fittingjob;
mod ihpa;
mod job;
mod provider;

pub use estimator::{Estimator, EstimatorSpec, EstimatorStatus};
pub use fittingjob::{FittingJob, FittingJobSpec, FittingJobStatus};
pub use ihpa::{
    EstimatorPatchSpec, ExtendedHorizontalPodAutoscalerSpec,
    ExtendedHorizontalPodAutoscalerTemplateSpec, ExtendedMetricSpec, FittingJobPatchSpec,
    IntelligentHorizontalPodAutoscaler, IntelligentHorizontalPodAutoscalerSpec,
    IntelligentHorizontalPodAutoscalerStatus,
};
pub use job::{sorted_label_pairs, ChangePointDetectionConfig, JobPatchSpec};
pub use provider::{DatadogProviderSource, EstimateMode, MetricProvider, PrometheusProviderSource, ProviderSource};
