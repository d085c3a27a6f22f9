use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use common::{
    Xid,
    pretty::{self, TableStyleKind},
};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use tracing_subscriber::EnvFilter;
use wal::{LogEntry, LogScan, Wal};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    let scan = Wal::scan(&args.wal_path)
        .with_context(|| format!("failed to read log at {}", args.wal_path.display()))?;
    tracing::debug!(entries = scan.entries.len(), torn = scan.torn_bytes, "viewer.scan");

    let decoded = scan
        .entries
        .iter()
        .enumerate()
        .map(|(idx, payload)| {
            LogEntry::decode(payload)
                .map(|entry| (idx, entry))
                .with_context(|| format!("log entry {idx} is malformed"))
        })
        .collect::<Result<Vec<_>>>()?;

    let limited: Vec<(usize, LogEntry)> = decoded
        .into_iter()
        .filter(|(_, entry)| matches_xid(args.xid, entry))
        .skip(args.offset)
        .take(args.limit.unwrap_or(usize::MAX))
        .collect();

    match args.format {
        OutputFormat::Table => {
            let style: TableStyleKind = args.style.into();
            if limited.is_empty() {
                println!("No matching log entries found.");
            } else {
                println!("{}", render_log_entries(&limited, style));
            }
            println!("{}", pretty::render_structured_rows(&[summarize(&scan)], style));
        }
        OutputFormat::Json => {
            let json_rows: Vec<JsonLogEntry<'_>> = limited
                .iter()
                .map(|(idx, entry)| JsonLogEntry { idx: *idx, entry })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json_rows)?);
            if scan.torn_bytes > 0 {
                eprintln!("warning: {} torn bytes after the last entry", scan.torn_bytes);
            }
        }
    }

    Ok(())
}

fn matches_xid(filter: Option<Xid>, entry: &LogEntry) -> bool {
    filter.is_none_or(|xid| entry.xid() == xid)
}

#[derive(Parser, Debug)]
#[command(name = "wal-viewer")]
#[command(about = "Inspect and pretty-print write-ahead log entries", long_about = None)]
struct Args {
    /// Path to the `.log` file to inspect
    wal_path: PathBuf,
    /// Only show entries written by this transaction
    #[arg(short, long)]
    xid: Option<Xid>,
    /// Output format (table or json)
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
    /// Style used for table rendering
    #[arg(long, value_enum, default_value_t = CliTableStyle::Modern)]
    style: CliTableStyle,
    /// Maximum number of entries to display
    #[arg(long)]
    limit: Option<usize>,
    /// Number of matching entries to skip before printing
    #[arg(long, default_value_t = 0)]
    offset: usize,
    /// Log scan diagnostics to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CliTableStyle {
    Modern,
    Ascii,
    Plain,
}

const LOG_HEADERS: [&str; 6] = ["Idx", "Op", "Xid", "Uid", "Size", "Data"];
const PREVIEW_BYTES: usize = 16;

impl From<CliTableStyle> for TableStyleKind {
    fn from(value: CliTableStyle) -> Self {
        match value {
            CliTableStyle::Modern => TableStyleKind::Modern,
            CliTableStyle::Ascii => TableStyleKind::Ascii,
            CliTableStyle::Plain => TableStyleKind::Plain,
        }
    }
}

#[derive(Serialize)]
struct JsonLogEntry<'a> {
    idx: usize,
    entry: &'a LogEntry,
}

#[derive(Clone, Tabled)]
struct Summary {
    #[tabled(rename = "Entries")]
    entries: usize,
    #[tabled(rename = "Checksum")]
    checksum: String,
    #[tabled(rename = "Torn bytes")]
    torn_bytes: u64,
}

fn summarize(scan: &LogScan) -> Summary {
    let checksum = if scan.stored_checksum == scan.computed_checksum {
        format!("ok ({})", scan.computed_checksum)
    } else {
        format!(
            "MISMATCH (header {}, entries {})",
            scan.stored_checksum, scan.computed_checksum
        )
    };
    Summary {
        entries: scan.entries.len(),
        checksum,
        torn_bytes: scan.torn_bytes,
    }
}

fn render_log_entries(entries: &[(usize, LogEntry)], style: TableStyleKind) -> String {
    let rows = entries
        .iter()
        .map(|(idx, entry)| log_entry_to_cells(*idx, entry));

    pretty::render_string_table(&LOG_HEADERS, rows, style)
}

fn log_entry_to_cells(idx: usize, entry: &LogEntry) -> Vec<String> {
    let (op, size, data) = match entry {
        LogEntry::Insert { raw, .. } => (
            "INSERT",
            raw.len().to_string(),
            pretty::format_bytes(raw, PREVIEW_BYTES),
        ),
        LogEntry::Update { old, new, .. } => (
            "UPDATE",
            format!("{} -> {}", old.len(), new.len()),
            pretty::format_bytes(new, PREVIEW_BYTES),
        ),
    };

    vec![
        idx.to_string(),
        op.into(),
        entry.xid().to_string(),
        pretty::format_uid(entry.uid()),
        size,
        data,
    ]
}
