// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! gasview - headless front for the gas-analyzer browsing core
//!
//! Three operations: `sync` the durable 1-minute cache from raw
//! instrument files, `query` a time range into summary/CSV output, and
//! `dates` to list which calendar days have data.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gasview::{
    AggMethod, AppConfig, DataSource, Orchestrator, QueryConfig, TimeWindow, ZeroFilter, VERSION,
};

/// gasview - gas-analyzer time-series browsing core
#[derive(Parser, Debug)]
#[command(name = "gasview")]
#[command(version = VERSION)]
#[command(about = "Ingest, aggregate and cache gas-analyzer time series")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync the cache from raw instrument files
    Sync {
        /// Data source to sync (`picarro` or `pico`); both when omitted
        source: Option<String>,
    },

    /// Query a time range and print the aggregated result
    Query {
        /// Data source (`picarro` or `pico`)
        source: String,

        /// Range start, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` local time
        start: String,

        /// Range end, same formats as start
        end: String,

        /// IANA timezone for the range and the output timestamps
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Aggregation window (`raw`, `30s`, `1min`, `5min`, `1h`, ...)
        #[arg(long, default_value = "1min")]
        window: String,

        /// Aggregation method (`mean` or `median`)
        #[arg(long, default_value = "mean")]
        method: String,

        /// Keep rows with zero-valued gas channels
        #[arg(long)]
        keep_zeros: bool,

        /// Bypass the cache and read raw files
        #[arg(long)]
        no_cache: bool,

        /// Emit the full result as CSV on stdout
        #[arg(long)]
        csv: bool,
    },

    /// List calendar dates that have data
    Dates {
        /// Data source (`picarro` or `pico`)
        source: String,
    },

    /// Show cache store statistics
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let app = AppConfig::load_or_create(&config_path)?;
    info!("gasview v{VERSION}, configuration {:?}", config_path);

    match args.command {
        Command::Sync { source } => run_sync(app, source),
        Command::Query {
            source,
            start,
            end,
            timezone,
            window,
            method,
            keep_zeros,
            no_cache,
            csv,
        } => run_query(
            app, &source, &start, &end, &timezone, &window, &method, keep_zeros, no_cache, csv,
        ),
        Command::Dates { source } => run_dates(app, &source),
        Command::Status => run_status(app),
    }
}

fn run_sync(app: AppConfig, source: Option<String>) -> Result<()> {
    let sources = match source {
        Some(s) => vec![DataSource::from_str(&s)?],
        None => vec![DataSource::Picarro, DataSource::Pico],
    };

    let orch = Orchestrator::new(app)?;
    for source in sources {
        let report = orch.sync(source)?;
        println!(
            "{source}: {} processed, {} unchanged, {} failed",
            report.processed, report.skipped, report.failed
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_query(
    app: AppConfig,
    source: &str,
    start: &str,
    end: &str,
    timezone: &str,
    window: &str,
    method: &str,
    keep_zeros: bool,
    no_cache: bool,
    csv: bool,
) -> Result<()> {
    let cfg = QueryConfig {
        source: DataSource::from_str(source)?,
        start: parse_instant(start, false)?,
        end: parse_instant(end, true)?,
        timezone: timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("unknown timezone '{timezone}': {e}"))?,
        window: TimeWindow::parse(window)?,
        method: AggMethod::from_str(method)?,
        zero_filter: if keep_zeros {
            ZeroFilter::Off
        } else {
            ZeroFilter::NonZero
        },
        display_ranges: HashMap::new(),
        use_cache: !no_cache,
    };

    let orch = Orchestrator::new(app)?;
    let result = orch.load(&cfg)?;

    if result.is_empty() {
        println!("No data in range");
        return Ok(());
    }

    println!(
        "{} rows, {} .. {}",
        result.values.len(),
        result.display_timestamps[0],
        result.display_timestamps[result.values.len() - 1],
    );

    if csv {
        print_csv(&result);
    }
    Ok(())
}

fn print_csv(result: &gasview::ProcessedResult) {
    let mut header = String::from("timestamp");
    for name in result.values.channel_names() {
        header.push_str(&format!(",{name}"));
    }
    let with_std = !result.dispersion.is_empty();
    if with_std {
        for name in result.values.channel_names() {
            header.push_str(&format!(",{name}_std"));
        }
    }
    println!("{header}");

    for row in 0..result.values.len() {
        let mut line = result.display_timestamps[row].to_rfc3339();
        for col in &result.values.columns {
            line.push_str(&format!(",{}", col.values[row]));
        }
        if with_std {
            for col in &result.dispersion.columns {
                line.push_str(&format!(",{}", col.values[row]));
            }
        }
        println!("{line}");
    }
}

fn run_dates(app: AppConfig, source: &str) -> Result<()> {
    let source = DataSource::from_str(source)?;
    let orch = Orchestrator::new(app)?;
    let dates = orch.available_dates(source);
    if dates.is_empty() {
        println!("No data files found for {source}");
        return Ok(());
    }
    for date in dates {
        println!("{date}");
    }
    Ok(())
}

fn run_status(app: AppConfig) -> Result<()> {
    if !app.cache_path.exists() {
        bail!("no cache database at {:?}; run `gasview sync` first", app.cache_path);
    }
    let store = gasview::CacheStore::open(&app.cache_path)?;
    let stats = store.stats()?;
    println!("cache: {:?}", app.cache_path);
    println!("  picarro aggregate rows: {}", stats.picarro_rows);
    println!("  pico aggregate rows:    {}", stats.pico_rows);
    println!("  tracked files:          {}", stats.file_count);
    println!("  size:                   {} bytes", stats.size_bytes);
    Ok(())
}

/// Accept a bare date or a full date-time; a bare end date extends to the
/// last second of that day
fn parse_instant(s: &str, is_end: bool) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("cannot parse '{s}' as a date or date-time"))?;
    let dt = if is_end {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    dt.context("invalid time of day")
}
