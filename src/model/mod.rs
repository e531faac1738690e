// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! Tabular data model shared by parsers, aggregation and the cache store

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A single named channel of float samples. Missing values are NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Canonical channel name (e.g. `CO2_dry`)
    pub name: String,

    /// One value per row, parallel to the table's timestamp vector
    pub values: Vec<f64>,
}

/// A table of instrument samples: one UTC timestamp per row plus a fixed
/// set of numeric channel columns.
///
/// All columns are kept the same length as `timestamps` at all times.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataTable {
    /// Row timestamps, always normalized to UTC
    pub timestamps: Vec<DateTime<Utc>>,

    /// Channel columns in declaration order
    pub columns: Vec<Column>,
}

impl DataTable {
    /// Create an empty table with the given channel names
    pub fn with_channels(names: &[&str]) -> Self {
        Self {
            timestamps: Vec::new(),
            columns: names
                .iter()
                .map(|n| Column {
                    name: (*n).to_string(),
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when the table has no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Channel names in column order
    pub fn channel_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column by name, mutably
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Append one row. `values` must be in column order; short rows are
    /// padded with NaN.
    pub fn push_row(&mut self, timestamp: DateTime<Utc>, values: &[f64]) {
        self.timestamps.push(timestamp);
        for (i, col) in self.columns.iter_mut().enumerate() {
            col.values.push(values.get(i).copied().unwrap_or(f64::NAN));
        }
    }

    /// Keep only rows whose timestamp falls in `[start, end]`
    pub fn retain_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        let keep: Vec<bool> = self
            .timestamps
            .iter()
            .map(|t| *t >= start && *t <= end)
            .collect();
        self.retain_rows(&keep);
    }

    /// Keep only rows where the mask is true
    pub fn retain_rows(&mut self, keep: &[bool]) {
        let mut it = keep.iter();
        self.timestamps.retain(|_| *it.next().unwrap_or(&false));
        for col in &mut self.columns {
            let mut it = keep.iter();
            col.values.retain(|_| *it.next().unwrap_or(&false));
        }
    }

    /// Sort rows ascending by timestamp (stable)
    pub fn sort_by_timestamp(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.timestamps[i]);

        self.timestamps = order.iter().map(|&i| self.timestamps[i]).collect();
        for col in &mut self.columns {
            col.values = order.iter().map(|&i| col.values[i]).collect();
        }
    }

    /// Concatenate tables row-wise. Columns are aligned by name; a column
    /// missing from one input is NaN-filled for that input's rows.
    pub fn concat(tables: Vec<DataTable>) -> DataTable {
        let mut names: Vec<String> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                if !names.contains(&c.name) {
                    names.push(c.name.clone());
                }
            }
        }

        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut out = DataTable::with_channels(&name_refs);

        for t in tables {
            let rows = t.len();
            out.timestamps.extend_from_slice(&t.timestamps);
            for col in &mut out.columns {
                match t.column(&col.name) {
                    Some(src) => col.values.extend_from_slice(&src.values),
                    None => col.values.extend(std::iter::repeat(f64::NAN).take(rows)),
                }
            }
        }

        out
    }
}

/// Final output of a query: a central-tendency table and a matching
/// standard-deviation table, plus row timestamps rendered in the caller's
/// display timezone.
///
/// When no aggregation was requested the dispersion table is empty;
/// otherwise its rows correspond 1:1 by bucket timestamp to `values`.
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    /// Mean or median per bucket (or raw rows in passthrough mode)
    pub values: DataTable,

    /// Sample standard deviation per bucket
    pub dispersion: DataTable,

    /// `values.timestamps` converted to the display timezone
    pub display_timestamps: Vec<DateTime<Tz>>,
}

impl ProcessedResult {
    /// An empty result for the given channel set ("no data" state)
    pub fn empty(channels: &[&str]) -> Self {
        Self {
            values: DataTable::with_channels(channels),
            dispersion: DataTable::default(),
            display_timestamps: Vec::new(),
        }
    }

    /// True when the query matched no data
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn push_row_pads_short_rows() {
        let mut t = DataTable::with_channels(&["a", "b"]);
        t.push_row(ts(0), &[1.0]);
        assert_eq!(t.column("a").unwrap().values, vec![1.0]);
        assert!(t.column("b").unwrap().values[0].is_nan());
    }

    #[test]
    fn retain_range_is_inclusive() {
        let mut t = DataTable::with_channels(&["a"]);
        for i in 0..5 {
            t.push_row(ts(i * 10), &[i as f64]);
        }
        t.retain_range(ts(10), ts(30));
        assert_eq!(t.len(), 3);
        assert_eq!(t.timestamps[0], ts(10));
        assert_eq!(t.timestamps[2], ts(30));
    }

    #[test]
    fn sort_reorders_all_columns() {
        let mut t = DataTable::with_channels(&["a"]);
        t.push_row(ts(20), &[2.0]);
        t.push_row(ts(0), &[0.0]);
        t.push_row(ts(10), &[1.0]);
        t.sort_by_timestamp();
        assert_eq!(t.timestamps, vec![ts(0), ts(10), ts(20)]);
        assert_eq!(t.column("a").unwrap().values, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn concat_aligns_columns_by_name() {
        let mut a = DataTable::with_channels(&["x"]);
        a.push_row(ts(0), &[1.0]);
        let mut b = DataTable::with_channels(&["x", "y"]);
        b.push_row(ts(1), &[2.0, 3.0]);

        let merged = DataTable::concat(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.column("x").unwrap().values, vec![1.0, 2.0]);
        assert!(merged.column("y").unwrap().values[0].is_nan());
        assert_eq!(merged.column("y").unwrap().values[1], 3.0);
    }
}
