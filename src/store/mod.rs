// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! Durable cache store
//!
//! SQLite-backed mapping from (data source, source-file identity) to that
//! file's precomputed 1-minute aggregates. Content hash plus modification
//! time drive selective reprocessing, so an unchanged file is never
//! parsed twice. The cache holds exactly one granularity; coarser windows
//! are derived on read through the aggregation engine.

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Value, Connection};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::config::{AggMethod, DataSource, TimeWindow, ZeroFilter};
use crate::discover;
use crate::model::DataTable;
use crate::parsers;

/// All cached rows are aggregated with the mean; coarser views and the
/// median are derived on read.
pub const CANONICAL_METHOD: AggMethod = AggMethod::Mean;

/// Cache store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("window {requested} is finer than the cached 1-minute granularity")]
    WindowTooFine { requested: TimeWindow },
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files parsed and (re)inserted
    pub processed: usize,
    /// Files whose hash and mtime matched the stored record
    pub skipped: usize,
    /// Files that failed to parse; their prior cache state is untouched
    pub failed: usize,
}

/// Store-level totals, for the CLI status display
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub picarro_rows: usize,
    pub pico_rows: usize,
    pub file_count: usize,
    pub size_bytes: u64,
}

/// The durable cache. Single-writer oriented: one connection behind a
/// mutex serializes sync against concurrent reads, which is the explicit
/// consistency policy here.
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    /// Open or create the cache database
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;

        info!("Cache store opened at {:?}", path);
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        for source in [DataSource::Picarro, DataSource::Pico] {
            let table = source.table_name();
            let label = source.label();

            let mut cols = String::new();
            for ch in source.channels() {
                cols.push_str(&format!("{ch} REAL,\n                "));
            }
            for ch in source.channels() {
                cols.push_str(&format!("{ch}_std REAL,\n                "));
            }

            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    bucket_utc TEXT NOT NULL,
                    {cols}time_window TEXT NOT NULL,
                    agg_method TEXT NOT NULL,
                    source_file_name TEXT NOT NULL,
                    created_at TEXT DEFAULT CURRENT_TIMESTAMP
                );

                CREATE INDEX IF NOT EXISTS idx_{label}_file ON {table}(source_file_name);
                CREATE INDEX IF NOT EXISTS idx_{label}_bucket ON {table}(bucket_utc);
                CREATE INDEX IF NOT EXISTS idx_{label}_window ON {table}(time_window, agg_method);
            "#,
            ))?;
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS file_records (
                file_name TEXT PRIMARY KEY,
                original_path TEXT,
                file_hash TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                data_source TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;

        Ok(())
    }

    /// Sync one data source's files into the cache.
    ///
    /// Every file is hashed; files whose hash and modification time match
    /// the stored record are skipped. A changed file's prior aggregate
    /// rows for the canonical (window, method) key are deleted and
    /// reinserted inside one transaction, making the pass idempotent. A
    /// file that fails to parse is skipped with a warning and its prior
    /// cache state is left untouched.
    pub fn sync(&self, source: DataSource, root: &Path) -> Result<SyncReport, StoreError> {
        let files = discover::all_files(source, root);
        info!(
            "Syncing {} {} files from {:?}",
            files.len(),
            source,
            root
        );
        self.sync_paths(source, &files)
    }

    fn sync_paths(&self, source: DataSource, files: &[PathBuf]) -> Result<SyncReport, StoreError> {
        let existing = self.file_records()?;
        let mut report = SyncReport::default();

        for path in files {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };

            // Stat first: a file that vanished after discovery fails
            // here and must not abort the rest of the pass
            let modified = match file_mtime(path) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Cannot stat {:?}: {e}", path);
                    report.failed += 1;
                    continue;
                }
            };
            let hash = match file_hash(path) {
                Ok(h) => h,
                Err(e) => {
                    warn!("Cannot hash {:?}: {e}", path);
                    report.failed += 1;
                    continue;
                }
            };

            if let Some((stored_hash, stored_modified)) = existing.get(&name) {
                if *stored_hash == hash && *stored_modified == modified {
                    report.skipped += 1;
                    continue;
                }
            }

            let raw = match parsers::parse(source, path) {
                Ok(table) => table,
                Err(e) => {
                    warn!("Skipping {:?} during sync: {e}", path);
                    report.failed += 1;
                    continue;
                }
            };

            let (values, stds) =
                aggregate::resample(&raw, Some(TimeWindow::CANONICAL), CANONICAL_METHOD);

            self.replace_file_aggregates(source, &name, &values, &stds)?;
            self.upsert_file_record(source, &name, path, &hash, &modified, raw.len())?;

            debug!(
                "Processed {:?}: {} raw rows -> {} cached buckets",
                path,
                raw.len(),
                values.len()
            );
            report.processed += 1;
        }

        info!(
            "Sync complete for {}: {} processed, {} unchanged, {} failed",
            source, report.processed, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Query cached aggregates for a UTC range.
    ///
    /// The canonical window reads stored rows directly. Coarser windows
    /// re-aggregate the canonical rows through the aggregation engine;
    /// the cache only ever stores one granularity. A window finer than
    /// the canonical granularity cannot be served from cache and comes
    /// back as [`StoreError::WindowTooFine`]; the orchestrator falls back
    /// to the raw-file path for those.
    ///
    /// `filter` is applied to the canonical rows before any
    /// re-aggregation, mirroring the raw path's filter-then-aggregate
    /// ordering as closely as cached data allows.
    pub fn query(
        &self,
        source: DataSource,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
        window: TimeWindow,
        method: AggMethod,
        filter: &ZeroFilter,
    ) -> Result<(DataTable, DataTable), StoreError> {
        if window < TimeWindow::CANONICAL {
            return Err(StoreError::WindowTooFine { requested: window });
        }

        let (mut values, mut stds) = self.read_canonical(source, start_utc, end_utc)?;

        let keep = aggregate::zero_filter_mask(&values, source, filter);
        values.retain_rows(&keep);
        stds.retain_rows(&keep);

        if window == TimeWindow::CANONICAL {
            return Ok((values, stds));
        }

        // Coarser view: derived statistics over the 1-minute means
        Ok(aggregate::resample(&values, Some(window), method))
    }

    /// Read canonical-granularity rows for a source in `[start, end]`,
    /// ordered by bucket timestamp. Buckets contributed by more than one
    /// file (a file boundary inside a minute) are coalesced so queried
    /// timestamps stay unique and strictly increasing.
    fn read_canonical(
        &self,
        source: DataSource,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<(DataTable, DataTable), StoreError> {
        let conn = self.conn.lock().unwrap();
        let channels = source.channels();

        let mut select = String::from("bucket_utc");
        for ch in channels {
            select.push_str(&format!(", {ch}"));
        }
        for ch in channels {
            select.push_str(&format!(", {ch}_std"));
        }

        let sql = format!(
            "SELECT {select} FROM {} \
             WHERE bucket_utc BETWEEN ?1 AND ?2 \
             AND time_window = ?3 AND agg_method = ?4 \
             ORDER BY bucket_utc",
            source.table_name()
        );

        let mut values = DataTable::with_channels(channels);
        let mut stds = DataTable::with_channels(channels);

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            start_utc.to_rfc3339(),
            end_utc.to_rfc3339(),
            TimeWindow::CANONICAL.label(),
            CANONICAL_METHOD.label(),
        ])?;

        let n = channels.len();
        let mut central = vec![f64::NAN; n];
        let mut spread = vec![f64::NAN; n];

        while let Some(row) = rows.next()? {
            let stamp: String = row.get(0)?;
            let ts = match DateTime::parse_from_rfc3339(&stamp) {
                Ok(t) => t.with_timezone(&Utc),
                Err(_) => continue,
            };
            for i in 0..n {
                central[i] = row.get::<_, Option<f64>>(1 + i)?.unwrap_or(f64::NAN);
                spread[i] = row.get::<_, Option<f64>>(1 + n + i)?.unwrap_or(f64::NAN);
            }

            if values.timestamps.last() == Some(&ts) {
                coalesce_last(&mut values, &central);
                coalesce_last(&mut stds, &spread);
            } else {
                values.push_row(ts, &central);
                stds.push_row(ts, &spread);
            }
        }

        Ok((values, stds))
    }

    fn replace_file_aggregates(
        &self,
        source: DataSource,
        file_name: &str,
        values: &DataTable,
        stds: &DataTable,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let table = source.table_name();
        let channels = source.channels();

        tx.execute(
            &format!(
                "DELETE FROM {table} \
                 WHERE source_file_name = ?1 AND time_window = ?2 AND agg_method = ?3"
            ),
            params![
                file_name,
                TimeWindow::CANONICAL.label(),
                CANONICAL_METHOD.label()
            ],
        )?;

        let mut cols = String::from("bucket_utc");
        let mut placeholders = String::from("?1");
        let mut idx = 1;
        for ch in channels {
            idx += 1;
            cols.push_str(&format!(", {ch}"));
            placeholders.push_str(&format!(", ?{idx}"));
        }
        for ch in channels {
            idx += 1;
            cols.push_str(&format!(", {ch}_std"));
            placeholders.push_str(&format!(", ?{idx}"));
        }
        for tail in ["time_window", "agg_method", "source_file_name"] {
            idx += 1;
            cols.push_str(&format!(", {tail}"));
            placeholders.push_str(&format!(", ?{idx}"));
        }

        let sql = format!("INSERT INTO {table} ({cols}) VALUES ({placeholders})");
        let mut stmt = tx.prepare(&sql)?;

        for row in 0..values.len() {
            let mut bind: Vec<Value> = Vec::with_capacity(idx);
            bind.push(Value::Text(values.timestamps[row].to_rfc3339()));
            for col in &values.columns {
                bind.push(real_or_null(col.values[row]));
            }
            for col in &stds.columns {
                bind.push(real_or_null(col.values[row]));
            }
            bind.push(Value::Text(TimeWindow::CANONICAL.label()));
            bind.push(Value::Text(CANONICAL_METHOD.label().to_string()));
            bind.push(Value::Text(file_name.to_string()));

            stmt.execute(rusqlite::params_from_iter(bind))?;
        }
        drop(stmt);

        tx.commit()?;
        Ok(())
    }

    fn upsert_file_record(
        &self,
        source: DataSource,
        file_name: &str,
        path: &Path,
        hash: &str,
        modified: &str,
        record_count: usize,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO file_records
               (file_name, original_path, file_hash, last_modified, data_source, record_count, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(file_name) DO UPDATE SET
                   original_path = excluded.original_path,
                   file_hash = excluded.file_hash,
                   last_modified = excluded.last_modified,
                   record_count = excluded.record_count,
                   updated_at = excluded.updated_at"#,
            params![
                file_name,
                path.to_string_lossy(),
                hash,
                modified,
                source.label(),
                record_count as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Stored file records: name -> (hash, last_modified)
    fn file_records(&self) -> Result<HashMap<String, (String, String)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT file_name, file_hash, last_modified FROM file_records")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, String>(1)?, row.get::<_, String>(2)?),
            ))
        })?;

        let mut out = HashMap::new();
        for row in rows {
            let (name, state) = row?;
            out.insert(name, state);
        }
        Ok(out)
    }

    /// Number of aggregate rows stored for one source, optionally limited
    /// to a single file
    pub fn aggregate_count(
        &self,
        source: DataSource,
        file_name: Option<&str>,
    ) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let table = source.table_name();
        let count: i64 = match file_name {
            Some(name) => conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE source_file_name = ?1"),
                params![name],
                |row| row.get(0),
            )?,
            None => conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?,
        };
        Ok(count as usize)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock().unwrap();

        let count = |sql: &str| -> Result<i64, rusqlite::Error> {
            conn.query_row(sql, [], |row| row.get(0))
        };

        let picarro_rows = count("SELECT COUNT(*) FROM picarro_aggregates")?;
        let pico_rows = count("SELECT COUNT(*) FROM pico_aggregates")?;
        let file_count = count("SELECT COUNT(*) FROM file_records")?;
        let size_bytes = count(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .unwrap_or(0);

        Ok(StoreStats {
            picarro_rows: picarro_rows as usize,
            pico_rows: pico_rows as usize,
            file_count: file_count as usize,
            size_bytes: size_bytes as u64,
        })
    }
}

/// Merge a duplicate bucket into the table's last row by averaging the
/// non-NaN sides
fn coalesce_last(table: &mut DataTable, incoming: &[f64]) {
    let row = table.len() - 1;
    for (col, &new) in table.columns.iter_mut().zip(incoming) {
        let old = col.values[row];
        col.values[row] = match (old.is_nan(), new.is_nan()) {
            (true, true) => f64::NAN,
            (true, false) => new,
            (false, true) => old,
            (false, false) => (old + new) / 2.0,
        };
    }
}

fn real_or_null(v: f64) -> Value {
    if v.is_nan() {
        Value::Null
    } else {
        Value::Real(v)
    }
}

/// SHA-256 over the file's full byte content, streamed in chunks
pub fn file_hash(path: &Path) -> Result<String, StoreError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_mtime(path: &Path) -> Result<String, StoreError> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified).to_rfc3339())
}
