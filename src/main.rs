//! reqtrace CLI - Inspect and produce request records
//!
//! Reads exported records back through the hydration path, prints their
//! derived metrics, and re-exports them in canonical form.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqtrace_record::{Clock, RequestRecord, SystemClock};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// reqtrace - Inspect and produce per-request telemetry records
#[derive(Parser, Debug)]
#[command(name = "reqtrace")]
#[command(about = "reqtrace - Inspect and produce per-request telemetry records")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Indent JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load an exported record and summarize it
    #[command(long_about = r#"
Load an exported record, rebuild it and print its identity, response and
database timings and collection sizes. Unknown fields are ignored.

EXAMPLES:
  # Summarize a stored record
  reqtrace inspect storage/1700000000-1234-5678.json

  # Normalize a record read from stdin
  cat record.json | reqtrace inspect - --export --pretty
    "#)]
    Inspect {
        /// Exported record file, or "-" for stdin
        path: PathBuf,

        /// Print the re-exported record instead of a summary
        #[arg(long)]
        export: bool,
    },

    /// Create an empty record stamped with the current time
    New {
        /// Request method
        #[arg(long, default_value = "GET")]
        method: String,

        /// Request URL
        #[arg(long)]
        url: Option<String>,
    },
}

/// Setup logging with the specified log level
///
/// Logs go to stderr so JSON on stdout can be piped.
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(filter)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read record from stdin")?;
        return Ok(input);
    }

    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record from {}", path.display()))
}

fn render(record: &RequestRecord, pretty: bool) -> String {
    if pretty {
        record.to_json_pretty()
    } else {
        record.to_json()
    }
}

fn format_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{:.3} ms", ms),
        None => "n/a".to_string(),
    }
}

fn format_counter(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Label/value lines describing a record
fn summarize(record: &RequestRecord) -> Vec<(&'static str, String)> {
    let or_dash = |value: Option<&str>| value.unwrap_or("-").to_string();

    vec![
        ("id", record.id().to_string()),
        ("version", record.version.to_string()),
        ("method", or_dash(record.method.as_deref())),
        ("url", or_dash(record.url.as_deref())),
        ("controller", or_dash(record.controller.as_deref())),
        (
            "status",
            record
                .response_status
                .map_or_else(|| "-".to_string(), |s| s.to_string()),
        ),
        ("response time", format_ms(record.response_duration())),
        (
            "database",
            format!(
                "{} queries, {}",
                record.database_queries().len(),
                format_ms(Some(record.database_duration()))
            ),
        ),
        (
            "cache",
            format!(
                "{} queries (reads {}, hits {}, writes {}, deletes {})",
                record.cache_queries().len(),
                format_counter(record.cache_reads),
                format_counter(record.cache_hits),
                format_counter(record.cache_writes),
                format_counter(record.cache_deletes),
            ),
        ),
        ("timeline", record.timeline_data().len().to_string()),
        ("log", record.log().len().to_string()),
        ("events", record.events().len().to_string()),
        ("routes", record.routes().len().to_string()),
        ("emails", record.emails_data().len().to_string()),
        ("views", record.views_data().len().to_string()),
        ("user data", record.user_data_slots().len().to_string()),
        ("subrequests", record.subrequests().len().to_string()),
    ]
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Inspect { path, export } => {
            let input = read_input(&path)?;
            let record = RequestRecord::from_json(&input)
                .with_context(|| format!("{} is not an exported record", path.display()))?;

            debug!("Loaded record {} from {}", record.id(), path.display());

            if export {
                println!("{}", render(&record, cli.pretty));
            } else {
                for (label, value) in summarize(&record) {
                    println!("{:<14} {}", format!("{}:", label), value);
                }
            }
        }

        Commands::New { method, url } => {
            let mut record = RequestRecord::new();
            record.time = Some(SystemClock.now());
            record.method = Some(method);
            record.url = url;

            info!("Created record {}", record.id());
            println!("{}", render(&record, cli.pretty));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::parse_from(["reqtrace", "inspect", "-", "--export", "--pretty"]);
        assert!(cli.pretty);
        match cli.command {
            Commands::Inspect { path, export } => {
                assert_eq!(path, PathBuf::from("-"));
                assert!(export);
            }
            other => panic!("Expected inspect, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_of_partial_record() {
        let mut record = RequestRecord::with_id("1-0000-1");
        record.method = Some("GET".to_string());
        record.cache_hits = Some(3);

        let summary = summarize(&record);
        let get = |label: &str| {
            summary
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("id"), "1-0000-1");
        assert_eq!(get("method"), "GET");
        assert_eq!(get("url"), "-");
        assert_eq!(get("response time"), "n/a");
        assert_eq!(get("database"), "0 queries, 0.000 ms");
        assert_eq!(
            get("cache"),
            "0 queries (reads -, hits 3, writes -, deletes -)"
        );
    }
}
