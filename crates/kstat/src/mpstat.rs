//! `kstat mpstat`: per-CPU activity report computed from `cpu:*:sys` and
//! `cpu:*:vm` deltas.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, Utc};
use clap::{Args, ValueEnum};
use tracing::{debug, info, warn};

use kstat_core::{Filter, Record, Value, ValueMap};

use crate::{CliError, open_reader};

#[derive(Args, Debug)]
pub struct MpstatArgs {
    /// Seconds between reports
    #[arg(default_value_t = 1)]
    pub interval: u64,

    /// Number of reports (default: until interrupted)
    pub count: Option<u64>,

    /// Print a timestamp before each report
    #[arg(short = 'T', value_enum)]
    pub timestamp: Option<TimestampFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TimestampFormat {
    /// Seconds since the epoch
    U,
    /// Local date and time
    D,
}

/// Report columns and their widths.
const COLUMNS: &[(&str, usize)] = &[
    ("CPU", 3),
    ("minf", 4),
    ("mjf", 3),
    ("xcal", 4),
    ("intr", 5),
    ("ithr", 4),
    ("csw", 4),
    ("icsw", 4),
    ("migr", 4),
    ("smtx", 4),
    ("srw", 4),
    ("syscl", 5),
    ("usr", 3),
    ("sys", 3),
    ("wt", 3),
    ("idl", 3),
];

/// One CPU's `sys` and `vm` counters from a single read.
#[derive(Debug, Clone, Default, PartialEq)]
struct CpuSample {
    snaptime: u64,
    sys: ValueMap,
    vm: ValueMap,
}

impl CpuSample {
    fn sys(&self, key: &str) -> u64 {
        counter(&self.sys, key)
    }

    fn vm(&self, key: &str) -> u64 {
        counter(&self.vm, key)
    }
}

fn counter(map: &ValueMap, key: &str) -> u64 {
    map.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Groups `cpu:N:sys` and `cpu:N:vm` records by instance.
///
/// CPUs whose records carry a read error are left out of the report.
fn collect_samples(records: &[Record]) -> BTreeMap<i32, CpuSample> {
    let mut samples: BTreeMap<i32, CpuSample> = BTreeMap::new();
    for record in records {
        if let Some(error) = record.error() {
            debug!(cpu = record.instance, name = %record.name, error, "Skipping unreadable CPU");
            continue;
        }
        let Some(map) = record.data().and_then(Value::as_map) else {
            continue;
        };
        let sample = samples.entry(record.instance).or_default();
        match record.name.as_str() {
            "sys" => {
                sample.sys = map.clone();
                sample.snaptime = record.snaptime().unwrap_or(0);
            }
            "vm" => sample.vm = map.clone(),
            _ => {}
        }
    }
    samples
}

/// Computes one report row. With no previous sample the counters are
/// reported since boot.
fn row(cpu: i32, cur: &CpuSample, prev: Option<&CpuSample>) -> Vec<u64> {
    let zero = CpuSample::default();
    let prev = prev.unwrap_or(&zero);
    let sys = |key: &str| cur.sys(key).saturating_sub(prev.sys(key));
    let vm = |key: &str| cur.vm(key).saturating_sub(prev.vm(key));

    let elapsed = cur.snaptime.saturating_sub(prev.snaptime);
    let pct = |nsec: u64| {
        if elapsed == 0 {
            0
        } else {
            (u128::from(nsec) * 100 / u128::from(elapsed)).min(100) as u64
        }
    };

    vec![
        cpu.max(0) as u64,
        vm("as_fault") + vm("hat_fault"),
        vm("maj_fault"),
        sys("xcalls"),
        sys("intr"),
        sys("intrthread"),
        sys("pswitch"),
        sys("inv_swtch"),
        sys("cpumigrate"),
        sys("mutex_adenters"),
        sys("rw_rdfails") + sys("rw_wrfails"),
        sys("syscall"),
        pct(sys("cpu_nsec_user")),
        pct(sys("cpu_nsec_kernel")),
        0,
        pct(sys("cpu_nsec_idle")),
    ]
}

fn header() -> String {
    let cols: Vec<String> = COLUMNS
        .iter()
        .map(|(name, width)| format!("{:>width$}", name))
        .collect();
    cols.join(" ")
}

fn render_row(values: &[u64]) -> String {
    let cols: Vec<String> = COLUMNS
        .iter()
        .zip(values)
        .map(|((_, width), value)| format!("{:>width$}", value))
        .collect();
    cols.join(" ")
}

fn render_report(
    current: &BTreeMap<i32, CpuSample>,
    previous: &BTreeMap<i32, CpuSample>,
) -> String {
    let mut out = header();
    out.push('\n');
    for (cpu, sample) in current {
        out.push_str(&render_row(&row(*cpu, sample, previous.get(cpu))));
        out.push('\n');
    }
    out
}

fn timestamp(format: TimestampFormat) -> String {
    match format {
        TimestampFormat::U => Utc::now().timestamp().to_string(),
        TimestampFormat::D => Local::now().format("%a %b %e %H:%M:%S %Y").to_string(),
    }
}

pub fn run(args: &MpstatArgs) -> Result<(), CliError> {
    let interval = Duration::from_secs(args.interval.max(1));
    let mut reader = open_reader(Filter::any().module("cpu").class("misc"))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received interrupt");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut previous = BTreeMap::new();
    let mut reports: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let records = reader.read_all()?;
        let current = collect_samples(&records);

        if let Some(format) = args.timestamp {
            println!("{}", timestamp(format));
        }
        print!("{}", render_report(&current, &previous));
        previous = current;

        reports += 1;
        if args.count.is_some_and(|count| reports >= count) {
            break;
        }

        // Sleep with periodic checks for the interrupt flag
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    reader.close()?;
    debug!(reports, "mpstat finished");
    Ok(())
}
