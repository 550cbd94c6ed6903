use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use jobdiff_core::{canonicalize, compare_snapshots, ComparisonReport};
use serde_json::Value;
use time::OffsetDateTime;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobdiff")]
#[command(about = "Compare two job-posting snapshots and report new and updated entries")]
#[command(version)]
struct Cli {
    /// Path to the original snapshot, a JSON array of entries.
    #[arg(long)]
    original: PathBuf,

    /// Path to the updated snapshot to compare against the original.
    #[arg(long)]
    updated: PathBuf,

    /// Where to write the JSON comparison report.
    #[arg(long, default_value = "updated_entries.json")]
    output: PathBuf,

    /// Where to write the run log.
    #[arg(long, default_value = "comparison.log")]
    log: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.log);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("comparison failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let rule = "=".repeat(60);
    tracing::info!("{rule}");
    tracing::info!("Job snapshot comparison started");
    tracing::info!("{rule}");

    let original_label = cli.original.display().to_string();
    let updated_label = cli.updated.display().to_string();

    let original_raw = load_snapshot(&cli.original)?;
    let updated_raw = load_snapshot(&cli.updated)?;

    tracing::info!("Building canonical view of the original snapshot...");
    let original = canonicalize(original_raw, &original_label);
    tracing::info!("Building canonical view of the updated snapshot...");
    let updated = canonicalize(updated_raw, &updated_label);

    tracing::info!("Comparing entries...");
    let comparison = compare_snapshots(&original, updated);

    let report = ComparisonReport::new(
        comparison,
        original_label,
        updated_label,
        OffsetDateTime::now_utc(),
    );
    write_report(&report, &cli.output)?;
    print_summary(&report, &cli.output, &cli.log);

    tracing::info!("Comparison completed successfully");
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<Vec<Value>> {
    tracing::info!("Loading JSON file: {}", path.display());
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot file {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("failed to parse JSON in {}", path.display()))?;
    let entries = match parsed {
        Value::Array(entries) => entries,
        other => bail!(
            "expected a JSON array at the top level of {}, found {}",
            path.display(),
            value_kind(&other)
        ),
    };
    tracing::info!("Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn write_report(report: &ComparisonReport, output: &Path) -> Result<()> {
    tracing::info!("Saving results to {}", output.display());
    let body =
        serde_json::to_vec_pretty(report).context("failed to serialize comparison report")?;
    fs::write(output, body)
        .with_context(|| format!("failed to write results to {}", output.display()))?;
    tracing::info!("Results saved successfully to {}", output.display());
    Ok(())
}

fn print_summary(report: &ComparisonReport, output: &Path, log: &Path) {
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("COMPARISON SUMMARY");
    println!("{rule}");
    println!("Original entries: {}", report.summary.total_original);
    println!("Updated entries:  {}", report.summary.total_updated);
    println!("New entries:      {}", report.summary.new_entries);
    println!("Updated entries:  {}", report.summary.updated_entries);
    println!("Unchanged:        {}", report.summary.unchanged_entries);
    println!("{rule}");
    println!("\nResults saved to: {}", output.display());
    println!("Log saved to:     {}", log.display());
}

fn init_logging(log_path: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr);

    let log_dir = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log_path.file_name().unwrap_or_else(|| OsStr::new("comparison.log"));

    match fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(log_dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        Err(err) => {
            eprintln!(
                "warn: could not create log directory '{}': {err}, logging to console only",
                log_dir.display()
            );
            tracing_subscriber::registry().with(filter).with(console_layer).init();
            None
        }
    }
}
