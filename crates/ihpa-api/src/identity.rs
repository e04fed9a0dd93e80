//! Forecast identity: the stable fingerprint that ties a declared metric to
//! its generated FittingJob, Estimator, and forecasted metric name.
//!
//! Grounded in `uniqueMetricHash`/`uniqueMetricID` from the original
//! generator: the digest input is the straight concatenation of the five
//! fields below, with no separators, hashed once with MD5.

use std::fmt;

/// The MD5 digest identifying a single declared metric within an IHPA.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ForecastIdentity(md5::Digest);

impl ForecastIdentity {
    /// Computes the identity for a declared metric.
    ///
    /// `metric_name` and `forecasted_metric_name` are the base and
    /// forecasted metric names as seen by the metric provider;
    /// `target_kind`/`target_name` identify the scale target workload.
    pub fn compute(
        metric_name: &str,
        forecasted_metric_name: &str,
        namespace: &str,
        target_kind: &str,
        target_name: &str,
    ) -> Self {
        let mut buf = String::with_capacity(
            metric_name.len()
                + forecasted_metric_name.len()
                + namespace.len()
                + target_kind.len()
                + target_name.len(),
        );
        buf.push_str(metric_name);
        buf.push_str(forecasted_metric_name);
        buf.push_str(namespace);
        buf.push_str(target_kind);
        buf.push_str(target_name);
        Self(md5::compute(buf.as_bytes()))
    }

    /// Hex-encodes the digest, matching the original's `hex.EncodeToString`.
    pub fn to_hex(self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for ForecastIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Debug for ForecastIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForecastIdentity({:x})", self.0)
    }
}
