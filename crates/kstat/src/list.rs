//! `kstat list`: print matching statistics as a table or JSON.

use clap::Args;
use tracing::debug;

use kstat_core::{Filter, Record};

use crate::{CliError, open_reader};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only statistics from this module
    #[arg(short, long)]
    pub module: Option<String>,

    /// Only statistics of this class
    #[arg(short, long)]
    pub class: Option<String>,

    /// Only statistics with this name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Only statistics of this instance
    #[arg(short, long)]
    pub instance: Option<i32>,

    /// Print each statistic's fields
    #[arg(short, long)]
    pub verbose: bool,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    fn filter(&self) -> Filter {
        let mut filter = Filter::any();
        if let Some(module) = &self.module {
            filter = filter.module(module.as_str());
        }
        if let Some(class) = &self.class {
            filter = filter.class(class.as_str());
        }
        if let Some(name) = &self.name {
            filter = filter.name(name.as_str());
        }
        if let Some(instance) = self.instance {
            filter = filter.instance(instance);
        }
        filter
    }
}

pub fn run(args: &ListArgs) -> Result<(), CliError> {
    let filter = args.filter();
    let mut reader = open_reader(filter)?;
    let mut records = reader.read_all()?;
    reader.close()?;
    debug!(count = records.len(), "Read kstats");

    sort_records(&mut records);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", render_table(&records, args.verbose));
    }
    Ok(())
}

fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| {
        (&a.module, &a.class, &a.name, a.instance).cmp(&(&b.module, &b.class, &b.name, b.instance))
    });
}

fn render_table(records: &[Record], verbose: bool) -> String {
    let module_w = column_width("MODULE", records.iter().map(|r| r.module.len()));
    let class_w = column_width("CLASS", records.iter().map(|r| r.class.len()));
    let name_w = column_width("NAME", records.iter().map(|r| r.name.len()));

    let mut lines = vec![format!(
        "{:<module_w$} {:<class_w$} {:<name_w$} INSTANCE",
        "MODULE", "CLASS", "NAME"
    )];
    for record in records {
        lines.push(format!(
            "{:<module_w$} {:<class_w$} {:<name_w$} {}",
            record.module, record.class, record.name, record.instance
        ));
        if verbose {
            lines.extend(field_lines(record));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn field_lines(record: &Record) -> Vec<String> {
    if let Some(error) = record.error() {
        return vec![format!("    error: {}", error)];
    }
    let Some(map) = record.data().and_then(|d| d.as_map()) else {
        return Vec::new();
    };
    let key_w = column_width("FIELD", map.keys().map(str::len));
    let mut lines = vec![format!("    {:<key_w$} VALUE", "FIELD")];
    lines.extend(
        map.iter()
            .map(|(key, value)| format!("    {:<key_w$} {}", key, value)),
    );
    lines
}

fn column_width(header: &str, lens: impl Iterator<Item = usize>) -> usize {
    lens.fold(header.len(), usize::max)
}
