// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! File discovery
//!
//! Enumerates candidate instrument files for a UTC time range across the
//! two on-disk layouts: the Picarro year/month/day sharded tree and the
//! flat Pico directory with date-encoded filenames. One shared tree
//! traversal serves both range discovery and calendar availability
//! scanning.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::DataSource;

/// Flat-layout names excluded by exact substring match; these live next to
/// the data logs but are not data.
const PICO_EXCLUDED: &[&str] = &["Eng.txt", "spectralite.txt", "config.txt"];

/// Two-digit years in Pico filenames are widened with a fixed century.
const PICO_CENTURY: i32 = 2000;

/// Enumerate files for a UTC range, sorted and de-duplicated.
///
/// The UTC date range is widened by one day on each side so that a local
/// midnight mapping to a different UTC calendar date still finds its
/// files. A missing root yields an empty list plus a warning, never an
/// error.
pub fn discover(
    source: DataSource,
    root: &Path,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
) -> Vec<PathBuf> {
    let start = start_utc.date_naive() - Duration::days(1);
    let end = end_utc.date_naive() + Duration::days(1);
    files_in_date_range(source, root, Some((start, end)))
}

/// Enumerate every data file for a source, regardless of date. Used by
/// the cache sync pass.
pub fn all_files(source: DataSource, root: &Path) -> Vec<PathBuf> {
    files_in_date_range(source, root, None)
}

/// Calendar dates that have at least one data file, for the availability
/// display.
pub fn available_dates(source: DataSource, root: &Path) -> BTreeSet<NaiveDate> {
    let mut dates = BTreeSet::new();
    match source {
        DataSource::Picarro => {
            walk_sharded(root, None, |date, day_dir| {
                if !day_files(day_dir).is_empty() {
                    dates.insert(date);
                }
            });
        }
        DataSource::Pico => {
            for path in flat_files(root, None) {
                if let Some(date) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(decode_pico_date)
                {
                    dates.insert(date);
                }
            }
        }
    }
    dates
}

fn files_in_date_range(
    source: DataSource,
    root: &Path,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Vec<PathBuf> {
    if !root.is_dir() {
        warn!("Data root {:?} does not exist; no files found", root);
        return Vec::new();
    }

    let mut files = match source {
        DataSource::Picarro => {
            let mut out = Vec::new();
            walk_sharded(root, range, |_, day_dir| {
                out.extend(day_files(day_dir));
            });
            out
        }
        DataSource::Pico => flat_files(root, range),
    };

    files.sort();
    files.dedup();
    files
}

/// Walk the year/month/day tree, calling `visit` for each day directory
/// whose date falls in `range`. Directory names must be purely numeric;
/// everything else is ignored silently.
fn walk_sharded(
    root: &Path,
    range: Option<(NaiveDate, NaiveDate)>,
    mut visit: impl FnMut(NaiveDate, &Path),
) {
    for (year, year_dir) in numeric_subdirs(root) {
        let year = year as i32;
        if let Some((start, end)) = range {
            if year < start.year() || year > end.year() {
                continue;
            }
        }

        for (month, month_dir) in numeric_subdirs(&year_dir) {
            if let Some((start, end)) = range {
                if (year, month) < (start.year(), start.month())
                    || (year, month) > (end.year(), end.month())
                {
                    continue;
                }
            }

            for (day, day_dir) in numeric_subdirs(&month_dir) {
                // Skips impossible dates like 02/31 along with the
                // out-of-range ones
                let date = match NaiveDate::from_ymd_opt(year, month, day) {
                    Some(d) => d,
                    None => continue,
                };
                if let Some((start, end)) = range {
                    if date < start || date > end {
                        continue;
                    }
                }
                visit(date, &day_dir);
            }
        }
    }
}

/// Immediate subdirectories with purely numeric names, sorted numerically
fn numeric_subdirs(dir: &Path) -> Vec<(u32, PathBuf)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read directory {:?}: {e}", dir);
            return Vec::new();
        }
    };

    let mut out: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name();
            let number = name.to_str()?.parse::<u32>().ok()?;
            Some((number, e.path()))
        })
        .collect();
    out.sort();
    out
}

/// `.dat` files directly inside one day directory
fn day_files(day_dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(day_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read directory {:?}: {e}", day_dir);
            return Vec::new();
        }
    };

    let mut out: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "dat"))
        .collect();
    out.sort();
    out
}

/// Candidate files in the flat Pico layout, optionally limited to a date
/// range via the filename-encoded date. Names that fail to decode are
/// skipped, not an error.
fn flat_files(root: &Path, range: Option<(NaiveDate, NaiveDate)>) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read directory {:?}: {e}", root);
            return Vec::new();
        }
    };

    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = match p.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => return false,
            };
            if PICO_EXCLUDED.iter().any(|ex| name.contains(ex)) {
                return false;
            }
            let date = match decode_pico_date(name) {
                Some(d) => d,
                None => return false,
            };
            match range {
                Some((start, end)) => date >= start && date <= end,
                None => true,
            }
        })
        .collect()
}

/// Decode the date embedded in a Pico filename, e.g.
/// `Pico101244_251106_185816.txt` -> 2025-11-06.
fn decode_pico_date(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_prefix("Pico")?.strip_suffix(".txt")?;
    let date_part = stem.split('_').nth(1)?;
    if date_part.len() != 6 || !date_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = PICO_CENTURY + date_part[0..2].parse::<i32>().ok()?;
    let month = date_part[2..4].parse::<u32>().ok()?;
    let day = date_part[4..6].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, "x").unwrap();
    }

    fn sharded_day(root: &Path, y: &str, m: &str, d: &str) -> PathBuf {
        let dir = root.join(y).join(m).join(d);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn decode_pico_filenames() {
        assert_eq!(
            decode_pico_date("Pico101244_251106_185816.txt"),
            NaiveDate::from_ymd_opt(2025, 11, 6)
        );
        assert_eq!(decode_pico_date("Pico101244_999999_000000.txt"), None);
        assert_eq!(decode_pico_date("notpico_251106_185816.txt"), None);
        assert_eq!(decode_pico_date("Pico101244.txt"), None);
    }

    #[test]
    fn sharded_walk_ignores_non_numeric_dirs() {
        let tmp = TempDir::new().unwrap();
        let day = sharded_day(tmp.path(), "2025", "06", "01");
        touch(&day.join("log1.dat"));
        std::fs::create_dir_all(tmp.path().join("misc").join("stuff")).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap();
        let files = discover(DataSource::Picarro, tmp.path(), start, end);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn range_is_widened_across_day_boundaries() {
        let tmp = TempDir::new().unwrap();
        // A range inside June 1 UTC must still pull the adjacent day
        // directories, absorbing timezone-shift boundary effects
        for d in ["31", "01", "02"] {
            let m = if d == "31" { "05" } else { "06" };
            let day = sharded_day(tmp.path(), "2025", m, d);
            touch(&day.join(format!("log_{m}_{d}.dat")));
        }
        let day = sharded_day(tmp.path(), "2025", "06", "10");
        touch(&day.join("log_far.dat"));

        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap();
        let files = discover(DataSource::Picarro, tmp.path(), start, end);

        assert_eq!(files.len(), 3, "adjacent days included, far day excluded");
    }

    #[test]
    fn flat_layout_excludes_non_data_files() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("Pico101244_250601_120000.txt"));
        touch(&tmp.path().join("Pico101244_Eng.txt"));
        touch(&tmp.path().join("spectralite.txt"));
        touch(&tmp.path().join("config.txt"));
        touch(&tmp.path().join("random_notes.txt"));

        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap();
        let files = discover(DataSource::Pico, tmp.path(), start, end);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn missing_root_yields_empty_list() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let files = discover(
            DataSource::Picarro,
            Path::new("/nonexistent/gasview"),
            start,
            end,
        );
        assert!(files.is_empty());
    }

    #[test]
    fn availability_scan_collects_dates() {
        let tmp = TempDir::new().unwrap();
        let day = sharded_day(tmp.path(), "2025", "06", "01");
        touch(&day.join("log.dat"));
        sharded_day(tmp.path(), "2025", "06", "02"); // empty day dir

        let dates = available_dates(DataSource::Picarro, tmp.path());
        assert_eq!(dates.len(), 1);
        assert!(dates.contains(&NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
    }

    #[test]
    fn discovery_order_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let day = sharded_day(tmp.path(), "2025", "06", "01");
        touch(&day.join("b.dat"));
        touch(&day.join("a.dat"));

        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap();
        let files = discover(DataSource::Picarro, tmp.path(), start, end);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.dat", "b.dat"]);
    }
}
