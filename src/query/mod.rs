// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! Query orchestrator
//!
//! Turns a [`QueryConfig`] into a [`ProcessedResult`]: localizes the
//! requested range to UTC, picks the cache or the raw-file path, applies
//! unit conversion and zero filtering, and renders display timestamps.
//! An empty result is a normal, displayable state, never a fault.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::config::{AppConfig, DataSource, QueryConfig, TimeWindow};
use crate::discover;
use crate::model::{DataTable, ProcessedResult};
use crate::parsers;
use crate::store::{CacheStore, StoreError, SyncReport};

/// Pico reports H2O in percent; the canonical unit is ppm. Applied to
/// both the value and dispersion tables so error bars stay in the
/// converted unit.
const H2O_PERCENT_TO_PPM: f64 = 10_000.0;

struct MemoEntry {
    at: Instant,
    result: Arc<ProcessedResult>,
}

/// Front door of the core: owns the cache store and a short-lived
/// in-process memo of recently computed results keyed by the composed
/// request.
pub struct Orchestrator {
    app: AppConfig,
    store: Option<CacheStore>,
    memo: Mutex<HashMap<String, MemoEntry>>,
    memo_ttl: Duration,
}

impl Orchestrator {
    /// Build an orchestrator; opens the cache store unless the
    /// application config disables it.
    pub fn new(app: AppConfig) -> Result<Self> {
        let store = if app.use_cache {
            Some(
                CacheStore::open(&app.cache_path)
                    .with_context(|| format!("opening cache at {:?}", app.cache_path))?,
            )
        } else {
            None
        };

        Ok(Self {
            memo_ttl: Duration::from_secs(app.result_ttl_secs),
            app,
            store,
            memo: Mutex::new(HashMap::new()),
        })
    }

    /// Run a sync pass for one source. Requires the cache to be enabled.
    pub fn sync(&self, source: DataSource) -> Result<SyncReport> {
        let store = self
            .store
            .as_ref()
            .context("cache is disabled; nothing to sync")?;
        let root = self.app.root_for(source).to_path_buf();
        Ok(store.sync(source, &root)?)
    }

    /// Calendar dates with data, for the availability display
    pub fn available_dates(&self, source: DataSource) -> std::collections::BTreeSet<chrono::NaiveDate> {
        discover::available_dates(source, self.app.root_for(source))
    }

    /// Load data for one query.
    ///
    /// Validation happens before any I/O. Results are memoized for the
    /// configured TTL under the composed request key; the memo is
    /// independent of the durable cache store.
    pub fn load(&self, cfg: &QueryConfig) -> Result<Arc<ProcessedResult>> {
        cfg.validate()?;

        let key = cfg.memo_key();
        if let Some(hit) = self.memo_lookup(&key) {
            debug!("Result memo hit for {key}");
            return Ok(hit);
        }

        let (start_utc, end_utc) = cfg.utc_range()?;
        let (mut values, mut dispersion) = self.load_tables(cfg, start_utc, end_utc)?;

        convert_units(cfg.source, &mut values, &mut dispersion);

        let display_timestamps = values
            .timestamps
            .iter()
            .map(|t| t.with_timezone(&cfg.timezone))
            .collect();

        if values.is_empty() {
            info!("No {} data in range {start_utc}..{end_utc}", cfg.source);
        }

        let result = Arc::new(ProcessedResult {
            values,
            dispersion,
            display_timestamps,
        });

        self.memo_insert(key, result.clone());
        Ok(result)
    }

    fn load_tables(
        &self,
        cfg: &QueryConfig,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<(DataTable, DataTable)> {
        if cfg.use_cache {
            if let (Some(store), Some(window)) = (self.store.as_ref(), cfg.window) {
                match store.query(
                    cfg.source,
                    start_utc,
                    end_utc,
                    window,
                    cfg.method,
                    &cfg.zero_filter,
                ) {
                    Ok(tables) => return Ok(tables),
                    Err(StoreError::WindowTooFine { requested }) => {
                        // Finer than the cached granularity: re-read the
                        // raw files instead
                        debug!(
                            "Window {requested} below canonical {}; using raw files",
                            TimeWindow::CANONICAL
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.load_raw(cfg, start_utc, end_utc)
    }

    fn load_raw(
        &self,
        cfg: &QueryConfig,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<(DataTable, DataTable)> {
        let root = self.app.root_for(cfg.source);
        let files = discover::discover(cfg.source, root, start_utc, end_utc);
        if files.is_empty() {
            warn!("No {} files found under {:?} for the requested range", cfg.source, root);
            return Ok((
                DataTable::with_channels(cfg.source.channels()),
                DataTable::default(),
            ));
        }

        let mut raw = parsers::parse_files(cfg.source, &files);
        raw.retain_range(start_utc, end_utc);

        let filtered = aggregate::filter_zeros(&raw, cfg.source, &cfg.zero_filter);
        if filtered.len() != raw.len() {
            info!(
                "Zero filter ({}): {} -> {} rows",
                cfg.source,
                raw.len(),
                filtered.len()
            );
        }

        Ok(aggregate::resample(&filtered, cfg.window, cfg.method))
    }

    fn memo_lookup(&self, key: &str) -> Option<Arc<ProcessedResult>> {
        let memo = self.memo.lock().unwrap();
        memo.get(key)
            .filter(|entry| entry.at.elapsed() < self.memo_ttl)
            .map(|entry| entry.result.clone())
    }

    fn memo_insert(&self, key: String, result: Arc<ProcessedResult>) {
        let mut memo = self.memo.lock().unwrap();
        memo.retain(|_, entry| entry.at.elapsed() < self.memo_ttl);
        memo.insert(
            key,
            MemoEntry {
                at: Instant::now(),
                result,
            },
        );
    }
}

/// Data-source-specific unit conversions, applied identically to the
/// central and dispersion tables
fn convert_units(source: DataSource, values: &mut DataTable, dispersion: &mut DataTable) {
    if source == DataSource::Pico {
        for table in [&mut *values, &mut *dispersion] {
            if let Some(col) = table.column_mut("H2O") {
                for v in &mut col.values {
                    *v *= H2O_PERCENT_TO_PPM;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggMethod, ZeroFilter};
    use chrono::{NaiveDate, Timelike};
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_picarro_log(root: &Path, day: (&str, &str, &str), name: &str, rows: &[&str]) {
        let dir = root.join(day.0).join(day.1).join(day.2);
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        writeln!(f, "DATE TIME CO2_dry CH4_dry H2O").unwrap();
        for row in rows {
            writeln!(f, "{row}").unwrap();
        }
    }

    fn app(data: &TempDir, db: &TempDir, use_cache: bool) -> AppConfig {
        AppConfig {
            picarro_root: data.path().join("picarro"),
            pico_root: data.path().join("pico"),
            cache_path: db.path().join("cache.db"),
            use_cache,
            result_ttl_secs: 300,
            ..Default::default()
        }
    }

    fn query(source: DataSource, window: Option<TimeWindow>, use_cache: bool) -> QueryConfig {
        QueryConfig {
            source,
            start: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap(),
            timezone: chrono_tz::UTC,
            window,
            method: AggMethod::Mean,
            zero_filter: ZeroFilter::Off,
            display_ranges: HashMap::new(),
            use_cache,
        }
    }

    #[test]
    fn raw_path_end_to_end() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        write_picarro_log(
            &data.path().join("picarro"),
            ("2025", "06", "01"),
            "log.dat",
            &[
                "2025-06-01 00:00:10 400.0 10.0 0.5",
                "2025-06-01 00:00:40 410.0 20.0 0.6",
                "2025-06-01 00:01:20 420.0 30.0 0.7",
            ],
        );

        let orch = Orchestrator::new(app(&data, &db, false)).unwrap();
        let cfg = query(DataSource::Picarro, TimeWindow::minutes(1), false);
        let result = orch.load(&cfg).unwrap();

        assert_eq!(result.values.len(), 2);
        let ch4 = result.values.column("CH4_dry").unwrap();
        assert_eq!(ch4.values[0], 15.0);
        assert_eq!(ch4.values[1], 30.0);
        let std = result.dispersion.column("CH4_dry").unwrap();
        assert!((std.values[0] - 7.0710678).abs() < 1e-6);
        assert!(std.values[1].is_nan());
    }

    #[test]
    fn empty_range_is_not_an_error() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        let orch = Orchestrator::new(app(&data, &db, false)).unwrap();
        let cfg = query(DataSource::Picarro, None, false);
        let result = orch.load(&cfg).unwrap();
        assert!(result.is_empty());
        assert!(result.dispersion.is_empty());
    }

    #[test]
    fn display_timestamps_follow_query_timezone() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        write_picarro_log(
            &data.path().join("picarro"),
            ("2025", "06", "01"),
            "log.dat",
            &["2025-06-01 06:00:00 400.0 1.9 0.5"],
        );

        let orch = Orchestrator::new(app(&data, &db, false)).unwrap();
        let mut cfg = query(DataSource::Picarro, None, false);
        cfg.timezone = chrono_tz::Asia::Shanghai;
        let result = orch.load(&cfg).unwrap();

        assert_eq!(result.values.len(), 1);
        // 06:00 UTC is 14:00 in Shanghai
        assert_eq!(result.display_timestamps[0].hour(), 14);
    }

    #[test]
    fn repeated_queries_hit_the_memo() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        write_picarro_log(
            &data.path().join("picarro"),
            ("2025", "06", "01"),
            "log.dat",
            &["2025-06-01 00:00:10 400.0 1.9 0.5"],
        );

        let orch = Orchestrator::new(app(&data, &db, false)).unwrap();
        let cfg = query(DataSource::Picarro, TimeWindow::minutes(1), false);
        let first = orch.load(&cfg).unwrap();
        let second = orch.load(&cfg).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn cache_path_end_to_end() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        write_picarro_log(
            &data.path().join("picarro"),
            ("2025", "06", "01"),
            "log.dat",
            &[
                "2025-06-01 00:00:10 400.0 1.9 0.5",
                "2025-06-01 00:01:10 410.0 2.0 0.6",
                "2025-06-01 00:02:10 420.0 2.1 0.7",
            ],
        );

        let orch = Orchestrator::new(app(&data, &db, true)).unwrap();
        let report = orch.sync(DataSource::Picarro).unwrap();
        assert_eq!(report.processed, 1);

        let cfg = query(DataSource::Picarro, TimeWindow::minutes(1), true);
        let result = orch.load(&cfg).unwrap();
        assert_eq!(result.values.len(), 3);
    }

    #[test]
    fn sub_canonical_window_falls_back_to_raw_files() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        write_picarro_log(
            &data.path().join("picarro"),
            ("2025", "06", "01"),
            "log.dat",
            &[
                "2025-06-01 00:00:10 400.0 1.9 0.5",
                "2025-06-01 00:00:40 410.0 2.0 0.6",
            ],
        );

        let orch = Orchestrator::new(app(&data, &db, true)).unwrap();
        orch.sync(DataSource::Picarro).unwrap();

        let cfg = query(DataSource::Picarro, TimeWindow::seconds(30), true);
        let result = orch.load(&cfg).unwrap();
        // 30-second buckets can only come from re-reading raw samples
        assert_eq!(result.values.len(), 2);
    }

    #[test]
    fn pico_water_vapor_is_converted_to_ppm() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        let pico_root = data.path().join("pico");
        std::fs::create_dir_all(&pico_root).unwrap();
        // 06:00 Shanghai local = 2025-05-31 22:00 UTC; keep it inside
        // June 1 UTC instead by logging an afternoon sample
        let mut f =
            std::fs::File::create(pico_root.join("Pico101244_250601_140000.txt")).unwrap();
        writeln!(f, "Time Stamp,CH4 (ppm),C2H6 (ppb),H2O (%),Gas Temp (degC)").unwrap();
        writeln!(f, "2025-06-01 14:00:00.000,1.95,12.4,0.8,35.2").unwrap();
        drop(f);

        let orch = Orchestrator::new(app(&data, &db, false)).unwrap();
        let cfg = query(DataSource::Pico, None, false);
        let result = orch.load(&cfg).unwrap();

        assert_eq!(result.values.len(), 1);
        assert_eq!(result.values.column("H2O").unwrap().values[0], 8_000.0);
    }

    #[test]
    fn invalid_range_fails_before_io() {
        let data = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        let orch = Orchestrator::new(app(&data, &db, false)).unwrap();
        let mut cfg = query(DataSource::Picarro, None, false);
        std::mem::swap(&mut cfg.start, &mut cfg.end);
        assert!(orch.load(&cfg).is_err());
    }
}
