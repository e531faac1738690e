// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! Picarro `.dat` decoder (whitespace-delimited log with preamble)

use chrono::{NaiveDateTime, TimeZone, Utc};
use std::path::Path;

use crate::config::DataSource;
use crate::model::DataTable;
use crate::parsers::ParseError;

/// Header marker token; everything before the line starting with it is
/// instrument preamble and discarded.
const HEADER_MARKER: &str = "DATE";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a Picarro analyzer log.
///
/// Lines are tokenized on whitespace. A data line is accepted only when it
/// has at least as many tokens as the header; extra trailing tokens are
/// dropped. Timestamps are `DATE TIME` with any sub-second fraction
/// truncated, interpreted as UTC. Channel values that fail float coercion
/// become NaN rather than rejecting the row.
pub fn parse_picarro(path: &Path) -> Result<DataTable, ParseError> {
    // Instrument logs occasionally carry stray non-UTF8 bytes; decode lossily
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);

    let mut lines = content.lines();
    let header: Vec<&str> = loop {
        match lines.next() {
            Some(line) if line.trim_start().starts_with(HEADER_MARKER) => {
                break line.split_whitespace().collect();
            }
            Some(_) => continue,
            None => return Err(ParseError::MissingHeader),
        }
    };

    let date_idx = header
        .iter()
        .position(|h| *h == "DATE")
        .ok_or(ParseError::MissingHeader)?;
    let time_idx = header
        .iter()
        .position(|h| *h == "TIME")
        .ok_or_else(|| ParseError::MissingColumn("TIME".to_string()))?;

    // Only the declared channels that actually appear in this file's header
    let channels: Vec<(&str, usize)> = DataSource::Picarro
        .channels()
        .iter()
        .filter_map(|name| {
            header
                .iter()
                .position(|h| h == name)
                .map(|idx| (*name, idx))
        })
        .collect();

    let names: Vec<&str> = channels.iter().map(|(n, _)| *n).collect();
    let mut table = DataTable::with_channels(&names);
    let mut values = vec![f64::NAN; channels.len()];

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < header.len() {
            continue;
        }

        // Truncate the sub-second fraction before parsing
        let time = tokens[time_idx]
            .split('.')
            .next()
            .unwrap_or(tokens[time_idx]);
        let stamp = format!("{} {}", tokens[date_idx], time);
        let naive = match NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT) {
            Ok(dt) => dt,
            Err(_) => continue,
        };

        for (slot, (_, idx)) in values.iter_mut().zip(&channels) {
            *slot = tokens[*idx].parse::<f64>().unwrap_or(f64::NAN);
        }

        table.push_row(Utc.from_utc_datetime(&naive), &values);
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
    fn preamble_is_skipped() {
        let f = write_log(
            "Picarro G2301 datalog\n\
             firmware 4.5.0\n\
             DATE TIME CO2_dry CH4_dry H2O\n\
             2025-06-01 12:00:01.250 421.35 1.912 0.62\n",
        );
        let table = parse_picarro(f.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.column("CO2_dry").unwrap().values[0], 421.35);
        // fraction truncated, not rounded
        assert_eq!(table.timestamps[0].second(), 1);
    }

    #[test]
    fn no_header_is_wrong_format() {
        let f = write_log("just some text\nmore text\n");
        assert!(matches!(
            parse_picarro(f.path()),
            Err(ParseError::MissingHeader)
        ));
    }

    #[test]
    fn short_lines_dropped_long_lines_truncated() {
        let f = write_log(
            "DATE TIME CO2_dry CH4_dry H2O\n\
             2025-06-01 00:00:00 400.0\n\
             2025-06-01 00:00:05 400.0 1.9 0.5 extra trailing junk\n",
        );
        let table = parse_picarro(f.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.column("H2O").unwrap().values[0], 0.5);
    }

    #[test]
    fn unparseable_value_becomes_nan() {
        let f = write_log(
            "DATE TIME CO2_dry CH4_dry H2O\n\
             2025-06-01 00:00:00 notanumber 1.9 0.5\n",
        );
        let table = parse_picarro(f.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.column("CO2_dry").unwrap().values[0].is_nan());
        assert_eq!(table.column("CH4_dry").unwrap().values[0], 1.9);
    }

    #[test]
    fn header_only_file_is_empty_not_error() {
        let f = write_log("DATE TIME CO2_dry CH4_dry H2O\n");
        let table = parse_picarro(f.path()).unwrap();
        assert!(table.is_empty());
    }
}
