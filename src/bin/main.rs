// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use cdr_rater::{CancelScope, Engine, EngineConfig, RateOptions, RatedCall, RatingError, Report};
use clap::{Parser, ValueEnum};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CDR Rater - Price call detail records against a tariff table
///
/// Loads the tariff and subscriber tables, rates every call in the CDR file
/// and writes per-subscriber totals to stdout.
#[derive(Parser, Debug)]
#[command(name = "cdr-rater")]
#[command(about = "Rates CDR files against prefix/time-dependent tariffs", long_about = None)]
struct Args {
    /// Tariff table (`;`-delimited)
    #[arg(long, value_name = "FILE")]
    tariffs: PathBuf,

    /// Subscriber table (`phone_number;client_name`)
    #[arg(long, value_name = "FILE")]
    subscribers: PathBuf,

    /// Also print every rated call, in input order
    #[arg(long)]
    calls: bool,

    /// Engine configuration file (toml, yaml or json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Abort rating after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// CDR file (`|`-delimited, 12 fields)
    #[arg(value_name = "CDR_FILE")]
    input: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
}

fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), RatingError> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    let engine = Engine::new(config)?;
    let tariffs = engine.load_tariffs(open(&args.tariffs)?)?;
    let subscribers = engine.load_subscribers(open(&args.subscribers)?)?;
    info!(tariffs, subscribers, "tables loaded");

    let scope = match args.timeout {
        Some(seconds) => CancelScope::with_timeout(Duration::from_secs(seconds)),
        None => CancelScope::new(),
    };
    let options = RateOptions {
        collect_calls: args.calls,
    };
    let report = engine.rate_stream(open(&args.input)?, options, &scope)?;
    engine.close();

    let stdout = io::stdout();
    match args.format {
        Format::Csv => write_report(&report, stdout.lock()),
        Format::Json => write_json(&report, stdout.lock()),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, RatingError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| RatingError::Io(format!("{}: {}", path.display(), e)))
}

/// Output row for one subscriber total.
#[derive(Debug, Serialize)]
struct TotalRow<'a> {
    phone_number: &'a str,
    client_name: &'a str,
    total_cost: Decimal,
    calls_count: u64,
}

/// Output row for one rated call.
#[derive(Debug, Serialize)]
struct CallRow<'a> {
    sequence: u64,
    start_time: String,
    calling_party: &'a str,
    called_party: &'a str,
    direction: &'static str,
    disposition: &'static str,
    billable_sec: u32,
    cost: Decimal,
    prefix: &'a str,
    destination: &'a str,
}

impl<'a> From<&'a RatedCall> for CallRow<'a> {
    fn from(call: &'a RatedCall) -> Self {
        let (prefix, destination) = call
            .tariff
            .as_ref()
            .map_or(("", ""), |t| (t.prefix.as_str(), t.destination.as_str()));
        CallRow {
            sequence: call.sequence.0,
            start_time: call.record.start_time.to_string(),
            calling_party: &call.record.calling_party,
            called_party: &call.record.called_party,
            direction: call.record.direction.as_str(),
            disposition: call.record.disposition.as_str(),
            billable_sec: call.record.billable_sec,
            cost: call.cost.to_decimal(),
            prefix,
            destination,
        }
    }
}

/// Write the report as CSV.
///
/// # CSV Format
///
/// Columns: `phone_number, client_name, total_cost, calls_count`, costs in
/// major units with two decimals. When calls were collected, a blank line
/// and the per-call table follow.
///
/// ```csv
/// phone_number,client_name,total_cost,calls_count
/// 100,Acme,4.10,1
/// ```
fn write_report<W: Write>(report: &Report, mut writer: W) -> Result<(), RatingError> {
    {
        let mut wtr = Writer::from_writer(&mut writer);
        for total in &report.totals {
            wtr.serialize(TotalRow {
                phone_number: &total.phone_number,
                client_name: &total.client_name,
                total_cost: total.total_cost.to_decimal(),
                calls_count: total.calls_count,
            })?;
        }
        // no rows means serialize never wrote the header
        if report.totals.is_empty() {
            wtr.write_record(["phone_number", "client_name", "total_cost", "calls_count"])?;
        }
        wtr.flush()?;
    }

    if let Some(calls) = &report.calls {
        writeln!(writer)?;
        let mut wtr = Writer::from_writer(&mut writer);
        for call in calls {
            wtr.serialize(CallRow::from(call))?;
        }
        wtr.flush()?;
    }
    Ok(())
}

fn write_json<W: Write>(report: &Report, mut writer: W) -> Result<(), RatingError> {
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| RatingError::Io(e.to_string()))?;
    writeln!(writer)?;
    Ok(())
}
