//! The forecast datum type, the adjustment algorithm, and the CSV exchange
//! format. Grounded in `controllers/estimator.go`'s `EstimateDatum`,
//! `adjustYHat`, `readEstimateDataAsCSV`, and `joinEstimateData`.

use std::io::Read;

const TIMESTAMP_LABEL: &str = "timestamp";
const YHAT_LABEL: &str = "yhat";
const YHAT_UPPER_LABEL: &str = "yhat_upper";
const YHAT_LOWER_LABEL: &str = "yhat_lower";

/// One forecasted point: the time it was forecast for, the time it was
/// forecast at, and the point estimate with its upper/lower bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimateDatum {
    pub unix_time: i64,
    pub estimate_unix_time: i64,
    pub yhat: f64,
    pub upper_yhat: f64,
    pub lower_yhat: f64,
}

impl EstimateDatum {
    fn is_well_formed(&self) -> bool {
        self.upper_yhat >= self.yhat && self.yhat >= self.lower_yhat
    }
}

/// Bounded, one-sided (upward-only) adjustment of a forecast against an
/// actually observed value, anchored by the previous datum's observed error.
///
/// Returns `current.yhat` unchanged if either datum violates the
/// `upper >= yhat >= lower` invariant.
pub fn adjust_yhat(previous: &EstimateDatum, current: &EstimateDatum, actual_value: f64) -> f64 {
    if !previous.is_well_formed() || !current.is_well_formed() {
        return current.yhat;
    }

    if actual_value > previous.yhat {
        let upper_width = previous.upper_yhat - previous.yhat;
        if upper_width <= 0.0 {
            return current.yhat;
        }
        let mag = (upper_width.min(actual_value - previous.yhat)) / upper_width;
        current.yhat + mag * (current.upper_yhat - current.yhat)
    } else {
        let lower_width = previous.yhat - previous.lower_yhat;
        if lower_width <= 0.0 {
            return current.yhat;
        }
        let mag = (lower_width.min(previous.yhat - actual_value)) / lower_width;
        current.yhat - mag * (current.yhat - current.lower_yhat)
    }
}

/// Parses one forecast CSV batch. Required columns are `timestamp`, `yhat`,
/// `yhat_upper`, `yhat_lower`, which may appear in any order; extra columns
/// are ignored. A row with an unparseable field is silently dropped rather
/// than failing the whole batch, matching the upstream reader.
pub fn read_estimate_data_csv<R: Read>(reader: R) -> crate::error::Result<Vec<EstimateDatum>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers().map_err(crate::error::Error::Csv)?.clone();

    let column_index = |label: &str| headers.iter().position(|h| h == label);
    let (ts_idx, yhat_idx, upper_idx, lower_idx) = match (
        column_index(TIMESTAMP_LABEL),
        column_index(YHAT_LABEL),
        column_index(YHAT_UPPER_LABEL),
        column_index(YHAT_LOWER_LABEL),
    ) {
        (Some(t), Some(y), Some(u), Some(l)) => (t, y, u, l),
        _ => {
            return Err(crate::error::Error::CsvFormat(format!(
                "missing one of required columns {TIMESTAMP_LABEL:?}, {YHAT_LABEL:?}, {YHAT_UPPER_LABEL:?}, {YHAT_LOWER_LABEL:?}"
            )))
        }
    };

    let mut out = Vec::new();
    for record in rdr.records() {
        let record = match record {
            Ok(r) => r,
            Err(_) => continue,
        };
        let parsed = (|| -> Option<EstimateDatum> {
            let unix_time: i64 = record.get(ts_idx)?.parse().ok()?;
            let yhat: f64 = record.get(yhat_idx)?.parse().ok()?;
            let upper_yhat: f64 = record.get(upper_idx)?.parse().ok()?;
            let lower_yhat: f64 = record.get(lower_idx)?.parse().ok()?;
            Some(EstimateDatum {
                unix_time,
                estimate_unix_time: unix_time,
                yhat,
                upper_yhat,
                lower_yhat,
            })
        })();
        if let Some(datum) = parsed {
            out.push(datum);
        }
    }
    Ok(out)
}

/// Merges a freshly ingested batch with the worker's current batch: both are
/// sorted by `estimate_unix_time`, and any tail of `old` overlapping `new`'s
/// time range is replaced by `new`. If `new` starts strictly after `old`
/// ends, it is simply appended.
pub fn join_estimate_data(mut new_data: Vec<EstimateDatum>, mut old_data: Vec<EstimateDatum>) -> Vec<EstimateDatum> {
    new_data.sort_by_key(|d| d.estimate_unix_time);
    old_data.sort_by_key(|d| d.estimate_unix_time);

    if new_data.is_empty() {
        return old_data;
    }
    if old_data.is_empty() {
        return new_data;
    }

    let new_start = new_data[0].estimate_unix_time;
    let old_end = old_data[old_data.len() - 1].estimate_unix_time;
    if new_start > old_end {
        old_data.extend(new_data);
        return old_data;
    }

    let mut merged: Vec<EstimateDatum> = old_data.into_iter().take_while(|d| d.estimate_unix_time < new_start).collect();
    merged.extend(new_data);
    merged
}
