// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! Instrument file parsers
//!
//! One decoder per instrument family, both producing the common
//! [`DataTable`] schema with UTC timestamps. Parsers hold no shared
//! mutable state, so loading fans out across a bounded worker pool.

mod picarro;
mod pico;

pub use picarro::parse_picarro;
pub use pico::parse_pico;

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::DataSource;
use crate::model::DataTable;

/// Why a file could not be parsed. Distinguishes "unreadable" from
/// "wrong format"; an empty-but-valid file is not an error and parses to
/// an empty table.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no header row found (wrong format?)")]
    MissingHeader,

    #[error("required column '{0}' missing from header")]
    MissingColumn(String),

    #[error("malformed delimited record: {0}")]
    Csv(#[from] csv::Error),
}

/// Parse one instrument file into the common table schema.
///
/// Never panics past this boundary; malformed files come back as a typed
/// [`ParseError`] for the caller to log and skip.
pub fn parse(source: DataSource, path: &Path) -> Result<DataTable, ParseError> {
    match source {
        DataSource::Picarro => parse_picarro(path),
        DataSource::Pico => parse_pico(path),
    }
}

/// Worker pool size: half the available cores, at least one
pub fn worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 2).max(1)
}

/// Parse many files concurrently and merge the results into one table
/// sorted by timestamp.
///
/// Files that fail to parse are logged and skipped; a single bad file
/// never aborts the batch.
pub fn parse_files(source: DataSource, paths: &[PathBuf]) -> DataTable {
    if paths.is_empty() {
        return DataTable::with_channels(source.channels());
    }

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count())
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            warn!("Failed to build parser pool, falling back to serial: {e}");
            let tables = paths
                .iter()
                .filter_map(|p| parse_one_logged(source, p))
                .collect();
            return finish(source, tables);
        }
    };

    let tables: Vec<DataTable> = pool.install(|| {
        paths
            .par_iter()
            .filter_map(|p| parse_one_logged(source, p))
            .collect()
    });

    finish(source, tables)
}

fn parse_one_logged(source: DataSource, path: &Path) -> Option<DataTable> {
    match parse(source, path) {
        Ok(table) => {
            debug!("Parsed {} rows from {:?}", table.len(), path);
            (!table.is_empty()).then_some(table)
        }
        Err(e) => {
            warn!("Skipping {:?}: {e}", path);
            None
        }
    }
}

fn finish(source: DataSource, tables: Vec<DataTable>) -> DataTable {
    if tables.is_empty() {
        return DataTable::with_channels(source.channels());
    }
    // Pool completion order is arbitrary; the post-sort restores a
    // deterministic timeline.
    let mut merged = DataTable::concat(tables);
    merged.sort_by_timestamp();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn worker_count_is_at_least_one() {
        assert!(worker_count() >= 1);
    }

    #[test]
    fn bad_files_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.dat");
        let bad = dir.path().join("bad.dat");

        let mut f = std::fs::File::create(&good).unwrap();
        writeln!(f, "DATE TIME CO2_dry CH4_dry H2O").unwrap();
        writeln!(f, "2025-06-01 00:00:10.123 420.1 1.9 0.5").unwrap();

        std::fs::write(&bad, "not an instrument log at all\n").unwrap();

        let table = parse_files(DataSource::Picarro, &[good, bad]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn merged_output_is_time_sorted() {
        let dir = TempDir::new().unwrap();
        let mk = |name: &str, time: &str| {
            let path = dir.path().join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "DATE TIME CO2_dry CH4_dry H2O").unwrap();
            writeln!(f, "2025-06-01 {time} 400.0 2.0 1.0").unwrap();
            path
        };
        let later = mk("b.dat", "12:00:00");
        let earlier = mk("a.dat", "06:00:00");

        let table = parse_files(DataSource::Picarro, &[later, earlier]);
        assert_eq!(table.len(), 2);
        assert!(table.timestamps[0] < table.timestamps[1]);
    }
}
