//! Time-windowed aggregation
//!
//! Resamples irregular samples onto a fixed, epoch-aligned grid and
//! computes a paired sample-standard-deviation table used for
//! uncertainty bands. "No aggregation" is a first-class mode, not an
//! error.

use chrono::DateTime;
use std::collections::BTreeMap;

use crate::config::{AggMethod, DataSource, TimeWindow, ZeroFilter};
use crate::model::DataTable;

/// Resample a table onto fixed-width, left-closed buckets aligned to the
/// Unix epoch.
///
/// Returns the central-tendency table and the dispersion table. With a
/// null window the input passes through unchanged and the dispersion
/// table is empty. Otherwise every bucket between the first and last
/// occupied bucket is emitted: a bucket with no usable samples carries
/// NaN rather than being dropped, so consumers see a gap instead of a
/// time-skip. Dispersion is always the sample standard deviation of the
/// bucket's raw values, independent of `method`; buckets with fewer than
/// two usable samples get NaN dispersion.
pub fn resample(
    table: &DataTable,
    window: Option<TimeWindow>,
    method: AggMethod,
) -> (DataTable, DataTable) {
    let window = match window {
        Some(w) => w,
        None => return (table.clone(), DataTable::default()),
    };

    let names = table.channel_names();
    let mut values_out = DataTable::with_channels(&names);
    let mut std_out = DataTable::with_channels(&names);

    if table.is_empty() {
        return (values_out, std_out);
    }

    let width = window.as_secs();
    let mut buckets: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (row, ts) in table.timestamps.iter().enumerate() {
        let start = ts.timestamp().div_euclid(width) * width;
        buckets.entry(start).or_default().push(row);
    }

    // BTreeMap iteration gives the occupied buckets in order; the grid
    // still has to cover the empty ones in between.
    let first = *buckets.keys().next().unwrap_or(&0);
    let last = *buckets.keys().next_back().unwrap_or(&0);

    let empty = Vec::new();
    let mut central = vec![f64::NAN; table.columns.len()];
    let mut spread = vec![f64::NAN; table.columns.len()];

    let mut start = first;
    while start <= last {
        let bucket_ts = match DateTime::from_timestamp(start, 0) {
            Some(t) => t,
            None => break,
        };
        let rows = buckets.get(&start).unwrap_or(&empty);

        for (i, col) in table.columns.iter().enumerate() {
            let samples: Vec<f64> = rows
                .iter()
                .map(|&r| col.values[r])
                .filter(|v| !v.is_nan())
                .collect();
            central[i] = match method {
                AggMethod::Mean => mean(&samples),
                AggMethod::Median => median(&samples),
            };
            spread[i] = sample_std(&samples);
        }

        values_out.push_row(bucket_ts, &central);
        std_out.push_row(bucket_ts, &spread);
        start += width;
    }

    (values_out, std_out)
}

/// Row-keep mask for the filtering policy, without materializing a new
/// table. Lets callers apply one mask to a value table and its matching
/// dispersion table.
pub fn zero_filter_mask(table: &DataTable, source: DataSource, policy: &ZeroFilter) -> Vec<bool> {
    match policy {
        ZeroFilter::Off => vec![true; table.len()],
        ZeroFilter::NonZero => {
            let checked: Vec<&crate::model::Column> = source
                .filter_channels()
                .iter()
                .filter_map(|name| table.column(name))
                .collect();
            (0..table.len())
                .map(|row| checked.iter().all(|c| c.values[row] != 0.0))
                .collect()
        }
        ZeroFilter::Threshold(minimums) => {
            let checked: Vec<(&crate::model::Column, f64)> = minimums
                .iter()
                .filter_map(|(name, min)| table.column(name).map(|c| (c, *min)))
                .collect();
            (0..table.len())
                .map(|row| checked.iter().all(|(c, min)| c.values[row] > *min))
                .collect()
        }
    }
}

/// Drop raw rows per the filtering policy. Applied before aggregation,
/// never after.
///
/// Only the source's checked channel set participates; a row survives
/// only if every checked channel passes simultaneously. NaN compares as
/// non-zero under [`ZeroFilter::NonZero`] (matching the un-filtered
/// passthrough of missing values) but fails any threshold comparison.
pub fn filter_zeros(table: &DataTable, source: DataSource, policy: &ZeroFilter) -> DataTable {
    if matches!(policy, ZeroFilter::Off) {
        return table.clone();
    }
    let keep = zero_filter_mask(table, source, policy);
    let mut out = table.clone();
    out.retain_rows(&keep);
    out
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn median(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Sample standard deviation (n-1 denominator); NaN below two samples
fn sample_std(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(samples);
    let var = samples.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}
