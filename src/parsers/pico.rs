// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! Pico `.txt` decoder (comma-delimited log with named columns)

use chrono::{LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::path::Path;

use crate::config::DataSource;
use crate::model::DataTable;
use crate::parsers::ParseError;

/// The Pico logger writes wall-clock timestamps in the lab's fixed zone;
/// it is not recorded in the file.
pub const PICO_NATIVE_TZ: Tz = chrono_tz::Asia::Shanghai;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Instrument-native header names mapped to canonical channel names.
/// Note the unit-bearing rename: the instrument reports C2H6 in ppb,
/// not ppm, so downstream consumers must not assume uniform units.
const COLUMN_RENAMES: &[(&str, &str)] = &[
    ("Time Stamp", "TIMESTAMP"),
    ("CH4 (ppm)", "CH4"),
    ("C2H6 (ppb)", "C2H6"),
    ("H2O (%)", "H2O"),
    ("Gas Temp (degC)", "Tgas"),
];

fn canonical_name(native: &str) -> Option<&'static str> {
    COLUMN_RENAMES
        .iter()
        .find(|(from, _)| *from == native)
        .map(|(_, to)| *to)
}

/// Parse a Pico analyzer log.
///
/// Read as a standard delimited table; columns are renamed from the
/// instrument-native headers to canonical channel names. Timestamps carry
/// fractional seconds and are localized to the instrument's fixed native
/// zone, then converted to UTC.
pub fn parse_pico(path: &Path) -> Result<DataTable, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let canonical: Vec<Option<&'static str>> =
        headers.iter().map(canonical_name).collect();

    let ts_idx = canonical
        .iter()
        .position(|c| *c == Some("TIMESTAMP"))
        .ok_or_else(|| ParseError::MissingColumn("Time Stamp".to_string()))?;

    let channels: Vec<(&str, usize)> = DataSource::Pico
        .channels()
        .iter()
        .filter_map(|name| {
            canonical
                .iter()
                .position(|c| *c == Some(*name))
                .map(|idx| (*name, idx))
        })
        .collect();

    let names: Vec<&str> = channels.iter().map(|(n, _)| *n).collect();
    let mut table = DataTable::with_channels(&names);
    let mut values = vec![f64::NAN; channels.len()];

    for record in reader.records() {
        let record = record?;
        let raw_ts = match record.get(ts_idx) {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        let naive = match NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT) {
            Ok(dt) => dt,
            Err(_) => continue,
        };
        let utc = match PICO_NATIVE_TZ.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
            LocalResult::None => continue,
        };

        for (slot, (_, idx)) in values.iter_mut().zip(&channels) {
            *slot = record
                .get(*idx)
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(f64::NAN);
        }

        table.push_row(utc, &values);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_log(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn native_columns_are_renamed() {
        let f = write_log(
            "Time Stamp,CH4 (ppm),C2H6 (ppb),H2O (%),Gas Temp (degC)\n\
             2025-11-06 18:58:16.500,1.95,12.4,0.81,35.2\n",
        );
        let table = parse_pico(f.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.channel_names(), vec!["CH4", "C2H6", "H2O", "Tgas"]);
        assert_eq!(table.column("C2H6").unwrap().values[0], 12.4);
    }

    #[test]
    fn timestamps_convert_native_zone_to_utc() {
        // 18:58 in Shanghai (UTC+8) is 10:58 UTC
        let f = write_log(
            "Time Stamp,CH4 (ppm),C2H6 (ppb),H2O (%),Gas Temp (degC)\n\
             2025-11-06 18:58:16.500,1.95,12.4,0.81,35.2\n",
        );
        let table = parse_pico(f.path()).unwrap();
        assert_eq!(table.timestamps[0].hour(), 10);
        assert_eq!(table.timestamps[0].minute(), 58);
    }

    #[test]
    fn missing_timestamp_column_is_wrong_format() {
        let f = write_log("a,b,c\n1,2,3\n");
        assert!(matches!(
            parse_pico(f.path()),
            Err(ParseError::MissingColumn(_))
        ));
    }

    #[test]
    fn blank_values_become_nan() {
        let f = write_log(
            "Time Stamp,CH4 (ppm),C2H6 (ppb),H2O (%),Gas Temp (degC)\n\
             2025-11-06 18:58:16.000,1.95,,0.81,35.2\n",
        );
        let table = parse_pico(f.path()).unwrap();
        assert!(table.column("C2H6").unwrap().values[0].is_nan());
    }

    #[test]
    fn header_only_file_is_empty_not_error() {
        let f = write_log("Time Stamp,CH4 (ppm),C2H6 (ppb),H2O (%),Gas Temp (degC)\n");
        let table = parse_pico(f.path()).unwrap();
        assert!(table.is_empty());
    }
}
