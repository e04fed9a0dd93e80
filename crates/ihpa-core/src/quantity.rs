//! Minimal Kubernetes resource quantity arithmetic: enough to sum container
//! resource requests and to convert a utilization percentage into an average
//! value, the two places `apimachinery`'s `resource.Quantity` math is used
//! upstream. Not a general-purpose quantity implementation.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Parses a Kubernetes quantity string into its value expressed in base
/// units (cores for CPU, bytes for memory, bare count otherwise).
pub fn to_base_units(q: &Quantity) -> f64 {
    let s = q.0.trim();
    let (digits, multiplier) = split_suffix(s);
    digits.parse::<f64>().unwrap_or(0.0) * multiplier
}

fn split_suffix(s: &str) -> (&str, f64) {
    const BINARY: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1024.0f64.powi(2)),
        ("Gi", 1024.0f64.powi(3)),
        ("Ti", 1024.0f64.powi(4)),
        ("Pi", 1024.0f64.powi(5)),
        ("Ei", 1024.0f64.powi(6)),
    ];
    const DECIMAL: &[(&str, f64)] = &[
        ("m", 1e-3),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];
    for (suffix, mul) in BINARY {
        if let Some(rest) = s.strip_suffix(suffix) {
            return (rest, *mul);
        }
    }
    for (suffix, mul) in DECIMAL {
        if let Some(rest) = s.strip_suffix(suffix) {
            return (rest, *mul);
        }
    }
    (s, 1.0)
}

/// Expresses a quantity's base-unit value at a power-of-ten scale, matching
/// the role of `apimachinery`'s `Quantity.ScaledValue(scale)`: the returned
/// value is `base_units / 10^scale`.
pub fn scaled_value(base_units: f64, scale: i32) -> f64 {
    base_units / 10f64.powi(scale)
}

/// Renders a base-units value back into a `Quantity` using a plain decimal
/// string, sufficient for summation results that feed back into Kubernetes
/// resource specs.
pub fn from_base_units(value: f64) -> Quantity {
    Quantity(format!("{value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_milli_cpu() {
        assert!((to_base_units(&Quantity("100m".to_string())) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn parses_binary_memory() {
        assert_eq!(to_base_units(&Quantity("128Mi".to_string())), 128.0 * 1024.0 * 1024.0);
    }

    #[test]
    fn parses_plain_decimal() {
        assert_eq!(to_base_units(&Quantity("2".to_string())), 2.0);
    }

    #[test]
    fn scaled_value_shifts_decimal_point() {
        // 2 cores expressed at milli scale (-3) is 2000 millicores.
        assert_eq!(scaled_value(2.0, -3), 2000.0);
    }
}
