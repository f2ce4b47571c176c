//! CLI for hygrolog sensor logs.
//!
//! Provides commands for inspecting, querying, and maintaining a log file
//! offline, e.g. one copied off an appliance's flash.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use hygrolog::clock::{Clock, SystemClock};
use hygrolog::config::{self, DEFAULT_RETENTION};
use hygrolog::query::{self, HistoryParams};
use hygrolog::response::{self, LatestResponse};
use hygrolog::sensor::Sample;
use hygrolog::{AppendLog, Record, compact};

/// hygrolog — inspect and maintain temperature/humidity logs.
#[derive(Parser)]
#[command(name = "hygrolog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display record counts, time span, and size of a log.
    Info {
        /// Path to the log file.
        log_path: PathBuf,
    },

    /// Print the most recent reading as JSON.
    Latest {
        /// Path to the log file.
        log_path: PathBuf,
    },

    /// Print readings at or after a threshold.
    History {
        /// Path to the log file.
        log_path: PathBuf,

        /// Explicit epoch-seconds threshold. Takes precedence over --days.
        #[arg(long)]
        since: Option<i64>,

        /// Window in days counted back from now (values <= 0 mean 7).
        #[arg(long, allow_negative_numbers = true)]
        days: Option<i64>,

        /// Window used when neither --since nor --days is given.
        #[arg(long, value_parser = config::parse_duration, default_value = "7d")]
        retention: Duration,

        /// Use this epoch time as "now" instead of the system clock.
        #[arg(long)]
        now: Option<i64>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Drop records older than a cutoff, rewriting the log in place.
    Compact {
        /// Path to the log file.
        log_path: PathBuf,

        /// Explicit epoch-seconds cutoff. Takes precedence over --retention.
        #[arg(long)]
        cutoff: Option<i64>,

        /// Keep this much history before now (e.g. "7d", "36h").
        #[arg(long, value_parser = config::parse_duration)]
        retention: Option<Duration>,

        /// Use this epoch time as "now" instead of the system clock.
        #[arg(long)]
        now: Option<i64>,
    },

    /// Append one reading, validated like a sensor sample.
    Append {
        /// Path to the log file.
        log_path: PathBuf,

        /// Temperature in °C.
        #[arg(long, allow_negative_numbers = true)]
        temp: f64,

        /// Relative humidity in percent.
        #[arg(long)]
        humidity: f64,

        /// Epoch timestamp; defaults to the system clock.
        #[arg(long)]
        ts: Option<i64>,
    },
}

/// Output format for history results.
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// The log's own line format.
    Csv,
    /// JSON array of readings, as served by the daemon.
    Json,
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let result = match cli.command {
        Commands::Info { log_path } => cmd_info(&log_path, &mut out),
        Commands::Latest { log_path } => cmd_latest(&log_path, &mut out),
        Commands::History {
            log_path,
            since,
            days,
            retention,
            now,
            format,
        } => cmd_history(
            &log_path,
            HistoryParams { since, days },
            retention,
            now.unwrap_or_else(|| SystemClock.now_utc()),
            format,
            &mut out,
        ),
        Commands::Compact {
            log_path,
            cutoff,
            retention,
            now,
        } => {
            let now = now.unwrap_or_else(|| SystemClock.now_utc());
            cmd_compact(&log_path, cutoff, retention.unwrap_or(DEFAULT_RETENTION), now, &mut out)
        }
        Commands::Append {
            log_path,
            temp,
            humidity,
            ts,
        } => cmd_append(
            &log_path,
            Sample {
                temperature_c: temp,
                humidity_pct: humidity,
            },
            ts.unwrap_or_else(|| SystemClock.now_utc()),
        ),
    };

    if let Err(e) = result.and_then(|()| out.flush().map_err(Into::into)) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Opens an existing log without modifying it.
///
/// Inspection commands must leave a log copied off a device untouched, so
/// this skips the torn-tail repair that [`AppendLog::open`] performs.
fn open_existing(log_path: &Path) -> Result<AppendLog, Box<dyn std::error::Error>> {
    if !log_path.is_file() {
        return Err(format!("No log found at '{}'", log_path.display()).into());
    }
    Ok(AppendLog::open_read_only(log_path)?)
}

/// Implements `hygrolog info <log_path>`.
fn cmd_info<W: Write>(log_path: &Path, out: &mut W) -> CmdResult {
    let log = open_existing(log_path)?;
    let stats = log.stats()?;

    writeln!(out, "Log: {}", log_path.display())?;
    writeln!(out, "  Records: {}", stats.records)?;
    writeln!(out, "  Malformed lines: {}", stats.malformed)?;
    writeln!(out, "  Size: {} ({} bytes)", format_bytes(stats.bytes), stats.bytes)?;

    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        writeln!(out, "  Oldest: {oldest}")?;
        writeln!(out, "  Newest: {newest}")?;
        let span = u64::try_from(newest.saturating_sub(oldest)).unwrap_or(0);
        writeln!(out, "  Span: {}", config::format_duration(Duration::from_secs(span)))?;
    }

    let tmp = compact::temp_path(log_path);
    if tmp.exists() {
        writeln!(out)?;
        writeln!(out, "Leftover compaction file: {}", tmp.display())?;
    }

    Ok(())
}

/// Implements `hygrolog latest <log_path>`.
fn cmd_latest<W: Write>(log_path: &Path, out: &mut W) -> CmdResult {
    let log = open_existing(log_path)?;
    let outcome = LatestResponse::from_latest(query::latest(&log)?);

    match outcome {
        LatestResponse::Found(_) => {
            writeln!(out, "{}", outcome.body()?)?;
            Ok(())
        }
        LatestResponse::NoData => Err("log has no valid records".into()),
        LatestResponse::BadFormat => Err("latest record is not representable".into()),
    }
}

/// Implements `hygrolog history <log_path>`.
fn cmd_history<W: Write>(
    log_path: &Path,
    params: HistoryParams,
    retention: Duration,
    now: i64,
    format: OutputFormat,
    out: &mut W,
) -> CmdResult {
    let log = open_existing(log_path)?;
    let retention_secs = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    let threshold = query::resolve_threshold(&params, now, retention_secs);

    let mut since = query::since(&log, threshold)?;
    match format {
        OutputFormat::Csv => {
            for record in since.by_ref() {
                out.write_all(record.encode().as_bytes())?;
            }
        }
        OutputFormat::Json => {
            response::write_json_array(since.by_ref(), &mut *out)?;
            writeln!(out)?;
        }
    }

    let skipped = since.skipped();
    since.finish()?;
    if skipped > 0 {
        eprintln!("warning: skipped {skipped} malformed line(s)");
    }
    Ok(())
}

/// Implements `hygrolog compact <log_path>`.
fn cmd_compact<W: Write>(
    log_path: &Path,
    cutoff: Option<i64>,
    retention: Duration,
    now: i64,
    out: &mut W,
) -> CmdResult {
    open_existing(log_path)?;
    let log = AppendLog::open(log_path)?;

    let report = match cutoff {
        Some(cutoff) => compact::compact_older_than(&log, cutoff)?,
        None => {
            let retention_secs = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
            compact::compact_retention(&log, now, retention_secs)?
                .ok_or_else(|| format!("clock is not set (now={now}); pass --cutoff or --now"))?
        }
    };

    writeln!(
        out,
        "Kept {}, expired {}, dropped {} malformed",
        report.kept, report.expired, report.malformed
    )?;
    Ok(())
}

/// Implements `hygrolog append <log_path>`.
fn cmd_append(log_path: &Path, sample: Sample, ts: i64) -> CmdResult {
    sample.validate().map_err(|reason| format!("rejected: {reason}"))?;
    if !hygrolog::clock::is_real(ts) {
        return Err(format!("timestamp {ts} is not a real time").into());
    }

    let log = AppendLog::open(log_path)?;
    log.append(&Record::new(ts, sample.temperature_c, sample.humidity_pct))?;
    Ok(())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_100_000;

    fn seeded(dir: &Path) -> PathBuf {
        let path = dir.join("log.csv");
        std::fs::write(
            &path,
            "1699400000,18.00,40.00\ngarbage\n1700096400,21.50,55.25\n1700099940,22.00,50.00\n",
        )
        .unwrap();
        path
    }

    fn run<F: FnOnce(&mut Vec<u8>) -> CmdResult>(f: F) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_info() {
        let dir = tempdir().unwrap();
        let path = seeded(dir.path());

        let text = run(|out| cmd_info(&path, out));
        assert!(text.contains("Records: 3"));
        assert!(text.contains("Malformed lines: 1"));
        assert!(text.contains("Oldest: 1699400000"));
        assert!(text.contains("Newest: 1700099940"));
    }

    #[test]
    fn test_missing_log_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        assert!(cmd_info(&path, &mut Vec::new()).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_latest() {
        let dir = tempdir().unwrap();
        let path = seeded(dir.path());

        let text = run(|out| cmd_latest(&path, out));
        assert_eq!(text, "{\"ts\":1700099940,\"tempC\":22.0,\"humidity\":50.0}\n");
    }

    #[test]
    fn test_history_formats() {
        let dir = tempdir().unwrap();
        let path = seeded(dir.path());
        let day = HistoryParams {
            since: None,
            days: Some(1),
        };

        let csv = run(|out| cmd_history(&path, day, DEFAULT_RETENTION, NOW, OutputFormat::Csv, out));
        assert_eq!(csv, "1700096400,21.50,55.25\n1700099940,22.00,50.00\n");

        let json = run(|out| cmd_history(&path, day, DEFAULT_RETENTION, NOW, OutputFormat::Json, out));
        let readings: Vec<response::Reading> = serde_json::from_str(json.trim()).unwrap();
        assert_eq!(readings.len(), 2);
    }

    #[test]
    fn test_compact_by_retention() {
        let dir = tempdir().unwrap();
        let path = seeded(dir.path());

        let text = run(|out| cmd_compact(&path, None, Duration::from_secs(86_400), NOW, out));
        assert_eq!(text, "Kept 2, expired 1, dropped 1 malformed\n");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "1700096400,21.50,55.25\n1700099940,22.00,50.00\n"
        );
    }

    #[test]
    fn test_compact_refuses_unset_clock() {
        let dir = tempdir().unwrap();
        let path = seeded(dir.path());
        assert!(cmd_compact(&path, None, DEFAULT_RETENTION, 1000, &mut Vec::new()).is_err());
        assert!(std::fs::read_to_string(&path).unwrap().contains("garbage"));
    }

    #[test]
    fn test_append_validates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.csv");
        let ok = Sample {
            temperature_c: -3.0,
            humidity_pct: 80.0,
        };

        cmd_append(&path, ok, NOW).unwrap();
        assert!(cmd_append(&path, ok, 1000).is_err());
        let hot = Sample {
            temperature_c: 130.0,
            ..ok
        };
        assert!(cmd_append(&path, hot, NOW).is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1700100000,-3.00,80.00\n");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["hygrolog", "append", "log.csv", "--temp", "-5.5", "--humidity", "40"]);
        assert!(cli.is_ok());
        let cli = Cli::try_parse_from(["hygrolog", "history", "log.csv", "--format", "xml"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_inspection_leaves_torn_log_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.csv");
        let original = "1700096400,21.50,55.25\n1700099940,22.0";
        std::fs::write(&path, original).unwrap();

        let text = run(|out| cmd_info(&path, out));
        assert!(text.contains("Records: 1"));
        assert!(text.contains("Malformed lines: 1"));
        run(|out| cmd_latest(&path, out));
        let day = HistoryParams {
            since: None,
            days: Some(1),
        };
        let csv = run(|out| cmd_history(&path, day, DEFAULT_RETENTION, NOW, OutputFormat::Csv, out));
        assert_eq!(csv, "1700096400,21.50,55.25\n");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }
}
