use k8s_openapi::api::core::v1::EnvFromSource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Selects which external metrics backend an IHPA (and the FittingJobs and
/// Estimators it generates) talks to.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct MetricProvider {
    /// Free-form name, propagated into generated FittingJob/Estimator specs
    /// so the training job and estimator agree on which provider they talk to.
    pub name: String,
    #[serde(flatten)]
    pub provider_source: ProviderSource,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ProviderSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datadog: Option<DatadogProviderSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusProviderSource>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct DatadogProviderSource {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_from: Option<Vec<EnvFromSource>>,
}

/// Intentionally empty: upstream never grew provider-specific configuration
/// for Prometheus, and the Prometheus adapter in `ihpa-core` matches that by
/// being an inert stub. See DESIGN.md.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PrometheusProviderSource {}

/// Whether an estimator worker emits raw model output or anchors it against
/// recently observed reality.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EstimateMode {
    Raw,
    Adjust,
}

impl Default for EstimateMode {
    fn default() -> Self {
        EstimateMode::Adjust
    }
}

impl<'de> Deserialize<'de> for EstimateMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "raw" => Ok(EstimateMode::Raw),
            "adjust" => Ok(EstimateMode::Adjust),
            "none" => Err(serde::de::Error::custom(
                "\"none\" is not a valid v1beta2 estimate mode; use \"raw\" (the spelling \"none\" is only accepted on the v1beta1 compatibility path, see EstimateMode::from_legacy_str)",
            )),
            other => Err(serde::de::Error::unknown_variant(other, &["raw", "adjust"])),
        }
    }
}

impl EstimateMode {
    /// Parses the v1beta1 spelling, where `"none"` is a synonym for `"raw"`.
    pub fn from_legacy_str(s: &str) -> Result<Self, String> {
        match s {
            "raw" | "none" => Ok(EstimateMode::Raw),
            "adjust" => Ok(EstimateMode::Adjust),
            other => Err(format!("unknown legacy estimate mode {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_none_on_the_current_api_version() {
        let err = serde_json::from_str::<EstimateMode>("\"none\"").unwrap_err();
        assert!(err.to_string().contains("v1beta1"));
    }

    #[test]
    fn accepts_raw_and_adjust() {
        assert_eq!(serde_json::from_str::<EstimateMode>("\"raw\"").unwrap(), EstimateMode::Raw);
        assert_eq!(serde_json::from_str::<EstimateMode>("\"adjust\"").unwrap(), EstimateMode::Adjust);
    }

    #[test]
    fn legacy_none_maps_to_raw() {
        assert_eq!(EstimateMode::from_legacy_str("none").unwrap(), EstimateMode::Raw);
        assert_eq!(EstimateMode::from_legacy_str("raw").unwrap(), EstimateMode::Raw);
        assert_eq!(EstimateMode::from_legacy_str("adjust").unwrap(), EstimateMode::Adjust);
        assert!(EstimateMode::from_legacy_str("bogus").is_err());
    }
}
