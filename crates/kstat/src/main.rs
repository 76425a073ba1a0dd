//! kstat - Kernel statistics reader.
//!
//! Lists kstats matching a module/class/name/instance filter, or samples
//! per-CPU counters in the style of `mpstat(1M)`. On systems without
//! libkstat the built-in mock registry is read instead.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod list;
mod mpstat;

use clap::{Parser, Subcommand};
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;

use kstat_core::{Filter, KstatError, KstatReader};

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
type Source = kstat_core::source::IllumosKstat;
#[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
type Source = kstat_core::source::mock::MockKstat;

/// Kernel statistics reader.
#[derive(Parser)]
#[command(name = "kstat", about = "Read illumos kernel statistics", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    /// Must precede the subcommand.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List kstats, optionally with their fields.
    List(list::ListArgs),
    /// Report per-CPU statistics at an interval.
    Mpstat(mpstat::MpstatArgs),
}

/// Errors that end a subcommand.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Kstat(#[from] KstatError),

    #[error("failed to serialize records: {0}")]
    Json(#[from] serde_json::Error),
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr so they never mix with command output.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["kstat", "kstat_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Opens a reader over libkstat.
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
fn open_reader(filter: Filter) -> Result<KstatReader<Source>, KstatError> {
    KstatReader::open(filter)
}

/// Opens a reader over the mock registry.
#[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
fn open_reader(filter: Filter) -> Result<KstatReader<Source>, KstatError> {
    tracing::debug!("libkstat unavailable, reading the mock registry");
    Ok(KstatReader::with_source(Source::typical_system(), filter))
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let result = match &args.command {
        Command::List(list_args) => list::run(list_args),
        Command::Mpstat(mpstat_args) => mpstat::run(mpstat_args),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_args() {
        let args = Args::try_parse_from([
            "kstat", "-v", "list", "-m", "cpu", "-i", "0", "-v", "--json",
        ])
        .unwrap();
        assert_eq!(args.verbose, 1);
        match args.command {
            Command::List(list) => {
                assert_eq!(list.module.as_deref(), Some("cpu"));
                assert_eq!(list.instance, Some(0));
                assert!(list.json);
                assert!(list.verbose);
                assert_eq!(list.class, None);
            }
            Command::Mpstat(_) => panic!("expected list"),
        }
    }

    #[test]
    fn test_parse_mpstat_args() {
        let args = Args::try_parse_from(["kstat", "mpstat", "2", "5", "-T", "d"]).unwrap();
        match args.command {
            Command::Mpstat(m) => {
                assert_eq!(m.interval, 2);
                assert_eq!(m.count, Some(5));
                assert_eq!(m.timestamp, Some(mpstat::TimestampFormat::D));
            }
            Command::List(_) => panic!("expected mpstat"),
        }
    }

    #[test]
    fn test_cli_error_display() {
        let err = CliError::from(KstatError::AlreadyClosed);
        assert_eq!(err.to_string(), KstatError::AlreadyClosed.to_string());
    }

    #[test]
    fn test_rejects_bad_instance() {
        assert!(Args::try_parse_from(["kstat", "list", "-i", "doogle"]).is_err());
    }
}
