//! eodcache CLI — read-through end-of-day data cache.
//!
//! Commands:
//! - `get` — return rows for a symbol, fetching only ranges missing from the archive
//! - `gaps` — list the ranges a `get` would fetch
//! - `status` — coverage per symbol from the archive index
//! - `rebuild` — regenerate the archive index from the segment files on disk

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use eodcache_core::bar::BAR_COLUMNS;
use eodcache_core::data::YahooProvider;
use eodcache_core::{ArchiveConfig, DateRange, EodReader, IntervalIndex};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "eodcache",
    about = "eodcache — on-disk cache for end-of-day market data"
)]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Archive directory (overrides the config file).
    #[arg(long, global = true)]
    archive_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print rows for a symbol as CSV, fetching missing ranges first.
    Get {
        /// Ticker symbol (case-sensitive).
        symbol: String,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Data source. Defaults to the configured default source.
        #[arg(long)]
        source: Option<String>,
    },
    /// Print the date ranges missing from the archive, one `start,end` per line.
    Gaps {
        symbol: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: Option<String>,
    },
    /// Report cached coverage per symbol.
    Status {
        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Rebuild the archive index from segment file names.
    Rebuild,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ArchiveConfig::from_file(path)?,
        None => ArchiveConfig::default(),
    };
    if let Some(dir) = &cli.archive_dir {
        config.archive_dir = eodcache_core::config::normalize_archive_dir(dir);
    }
    info!(
        archive_dir = %config.archive_dir.display(),
        index = %config.index_path().display(),
        "archive configured"
    );

    match cli.command {
        Commands::Get {
            symbol,
            start,
            end,
            source,
        } => run_get(config, &symbol, &start, end.as_deref(), source.as_deref()),
        Commands::Gaps { symbol, start, end } => run_gaps(config, &symbol, &start, end.as_deref()),
        Commands::Status { json } => run_status(config, json),
        Commands::Rebuild => run_rebuild(config),
    }
}

fn parse_range(start: &str, end: Option<&str>) -> Result<DateRange> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("invalid --start '{start}'"))?;
    let end = end
        .map(|e| NaiveDate::parse_from_str(e, "%Y-%m-%d").with_context(|| format!("invalid --end '{e}'")))
        .transpose()?
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    Ok(DateRange::new(start, end)?)
}

fn run_get(
    config: ArchiveConfig,
    symbol: &str,
    start: &str,
    end: Option<&str>,
    source: Option<&str>,
) -> Result<()> {
    let range = parse_range(start, end)?;
    let yahoo = YahooProvider::new(&config.yahoo)?;
    let mut reader = EodReader::new(config).with_provider(Box::new(yahoo));

    let bars = reader
        .get(symbol, range, source)
        .with_context(|| format!("get {symbol} {range}"))?;
    info!(symbol, %range, rows = bars.len(), "request served");

    // Header written explicitly so an empty result still prints one.
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(io::stdout().lock());
    out.write_record(BAR_COLUMNS)?;
    for bar in &bars {
        out.serialize(bar)?;
    }
    out.flush()?;
    Ok(())
}

fn run_gaps(config: ArchiveConfig, symbol: &str, start: &str, end: Option<&str>) -> Result<()> {
    let range = parse_range(start, end)?;
    let mut reader = EodReader::new(config);
    let gaps = reader.gaps(symbol, range)?;
    info!(symbol, %range, gaps = gaps.len(), "computed missing ranges");

    let mut out = io::stdout().lock();
    for gap in gaps {
        writeln!(out, "{},{}", gap.start(), gap.end())?;
    }
    Ok(())
}

fn run_status(config: ArchiveConfig, json: bool) -> Result<()> {
    let index_path = config.index_path();
    let mut reader = EodReader::new(config);
    let index = reader.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status_json(&index))?);
        return Ok(());
    }

    if index.is_empty() {
        println!("Archive index is empty: {}", index_path.display());
        return Ok(());
    }

    println!("Index: {}", index_path.display());
    println!("Symbols: {}", index.len());
    println!();
    println!("{:<10} {:>7} {:>8}  Ranges", "Symbol", "Ranges", "Days");
    println!("{}", "-".repeat(60));
    for (symbol, coverage) in index.iter() {
        let days: i64 = coverage.ranges().iter().map(|r| r.num_days()).sum();
        let ranges: Vec<String> = coverage.ranges().iter().map(|r| r.to_string()).collect();
        println!(
            "{:<10} {:>7} {:>8}  {}",
            symbol,
            coverage.len(),
            days,
            ranges.join(", ")
        );
    }
    Ok(())
}

fn status_json(index: &IntervalIndex) -> serde_json::Value {
    let symbols: serde_json::Map<String, serde_json::Value> = index
        .iter()
        .map(|(symbol, coverage)| {
            let ranges = coverage
                .ranges()
                .iter()
                .map(|r| serde_json::json!({ "start": r.start(), "end": r.end() }))
                .collect();
            (symbol.to_string(), serde_json::Value::Array(ranges))
        })
        .collect();
    serde_json::Value::Object(symbols)
}

fn run_rebuild(config: ArchiveConfig) -> Result<()> {
    let mut reader = EodReader::new(config);
    let index = reader.rebuild_index()?;
    let ranges: usize = index.iter().map(|(_, c)| c.len()).sum();
    println!(
        "Rebuilt {} with {} symbols, {} ranges",
        reader.config().index_path().display(),
        index.len(),
        ranges
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eodcache_core::CoverageSet;

    #[test]
    fn parse_range_rejects_inverted_dates() {
        assert!(parse_range("2020-01-10", Some("2020-01-01")).is_err());
        assert!(parse_range("2020/01/01", Some("2020-01-02")).is_err());
        let range = parse_range("2020-01-01", Some("2020-01-10")).unwrap();
        assert_eq!(range.num_days(), 10);
    }

    #[test]
    fn status_json_lists_ranges_per_symbol() {
        let mut index = IntervalIndex::new();
        index.insert(
            "AAPL",
            CoverageSet::from_ranges(vec![DateRange::parse("2020-01-01", "2020-01-10").unwrap()]),
        );
        let json = status_json(&index);
        assert_eq!(json["AAPL"][0]["start"], "2020-01-01");
        assert_eq!(json["AAPL"][0]["end"], "2020-01-10");
    }
}
