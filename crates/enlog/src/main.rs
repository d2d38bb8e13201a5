mod bootstrap;
mod output;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use enlog_core::error::EnlogError;
use enlog_core::timeline::{format_minute, parse_minute};
use enlog_data::decoder::{decode_file, DecodedRecord, TimeReference};
use enlog_data::directory::{decode_directory, SessionWindow};
use enlog_data::setup;
use output::{
    ApparentPowerPrinter, BasePrinter, CsvPrinter, EffectivePowerPrinter, Printer, RawPrinter,
};

// ── CLI surface ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "enlog", about = "Voltcraft Energy Logger 4000 file utility", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode one or more logger files and print their records
    Decode {
        /// Logger files, oldest first
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = PrinterKind::Base)]
        printer: PrinterKind,

        /// Field delimiter for the csv, watt and va printers
        #[arg(short, long, default_value = ",")]
        delimiter: String,

        /// Use info files only to seed the time reference, do not print them
        #[arg(long)]
        data_only: bool,
    },

    /// Decode a whole SD-card directory into info.yml and all-data.csv
    Dir {
        /// Directory holding the card's .bin files
        directory: PathBuf,

        /// Session window to summarise, as LABEL=START..END
        /// (timestamps like "2020-01-01 08:00"); repeatable
        #[arg(short, long = "session", value_name = "LABEL=START..END")]
        session: Vec<String>,
    },

    /// Show or change a device setup file
    Setup {
        /// The setupel3.bin file (need not exist yet)
        file: PathBuf,

        /// Field overrides as KEY=VALUE, e.g. unit_id=1
        overrides: Vec<String>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PrinterKind {
    /// Human-readable lines
    Base,
    /// Raw wire integers
    Raw,
    /// Per-minute CSV with header
    Csv,
    /// Effective power only
    Watt,
    /// Apparent power only
    Va,
}

impl PrinterKind {
    fn make(self, delimiter: &str) -> Box<dyn Printer> {
        let out = io::stdout();
        match self {
            PrinterKind::Base => Box::new(BasePrinter::new(out)),
            PrinterKind::Raw => Box::new(RawPrinter::new(out)),
            PrinterKind::Csv => Box::new(CsvPrinter::new(out, delimiter)),
            PrinterKind::Watt => Box::new(EffectivePowerPrinter::new(out, delimiter)),
            PrinterKind::Va => Box::new(ApparentPowerPrinter::new(out, delimiter)),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    bootstrap::setup_logging(cli.verbose)?;

    match cli.command {
        Command::Decode {
            files,
            printer,
            delimiter,
            data_only,
        } => run_decode(&files, printer.make(&delimiter).as_mut(), data_only),
        Command::Dir { directory, session } => run_dir(&directory, &session),
        Command::Setup { file, overrides } => run_setup(&file, &overrides),
    }
}

// ── decode ─────────────────────────────────────────────────────────────────────

/// Decode `files` in order against one shared time reference, so a capture
/// split across files keeps its minute numbering.
fn run_decode(files: &[PathBuf], printer: &mut dyn Printer, data_only: bool) -> Result<()> {
    let mut time_ref = TimeReference::default();

    for path in files {
        if files.len() > 1 {
            println!("# {}", path.display());
        }
        let records = match decode_file(path, &mut time_ref) {
            Ok(records) => records,
            Err(EnlogError::SetupFileRejected(path)) => {
                warn!("Setup file is ignored: {}", path.display());
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("decoding {}", path.display())),
        };

        for record in &records {
            match record {
                DecodedRecord::Info(info) => {
                    if !data_only {
                        printer.print_info(info)?;
                    }
                }
                DecodedRecord::Header(header) => printer.print_data_header(header)?,
                DecodedRecord::Data { record, timestamp } => {
                    printer.print_data(record, &format_minute(*timestamp))?;
                }
            }
        }
    }

    Ok(())
}

// ── dir ────────────────────────────────────────────────────────────────────────

/// Parse `LABEL=START..END` into a session window.
fn parse_session_window(spec: &str) -> Result<SessionWindow> {
    let (label, range) = spec
        .split_once('=')
        .with_context(|| format!("session {:?} is missing '='", spec))?;
    let (start, end) = range
        .split_once("..")
        .with_context(|| format!("session {:?} is missing '..' in its range", spec))?;

    let start = parse_minute(start).with_context(|| format!("session {:?}", spec))?;
    let end = parse_minute(end).with_context(|| format!("session {:?}", spec))?;
    if end <= start {
        bail!("session {:?} ends before it starts", spec);
    }

    Ok(SessionWindow {
        label: label.to_string(),
        start,
        end,
    })
}

/// Decode a capture directory and write its summary files.
///
/// Everything is decoded and summarised in memory first; output files are
/// only created once the whole timeline has been validated, and existing
/// output files are never overwritten.
fn run_dir(directory: &Path, session_specs: &[String]) -> Result<()> {
    let windows = session_specs
        .iter()
        .map(|spec| parse_session_window(spec))
        .collect::<Result<Vec<_>>>()?;

    let data = decode_directory(directory)?;
    let summaries = data.sessions(&windows)?;

    match data.info.first() {
        Some(info) => {
            let entries = output::info_entries(info)?;
            output::write_info_yaml(&directory.join("info.yml"), &entries)?;
        }
        None => warn!("No info record found; info.yml is not written"),
    }

    output::write_raw_csv(&directory.join("all-data.csv"), &data.rows)?;

    if !windows.is_empty() {
        output::write_sessions_csv(&directory.join("sessions.csv"), &summaries)?;
    }

    Ok(())
}

// ── setup ──────────────────────────────────────────────────────────────────────

/// Show the setup file, or apply `KEY=VALUE` overrides and rewrite it.
fn run_setup(file: &Path, overrides: &[String]) -> Result<()> {
    let (record, old_bytes) = setup::load(file)?;

    if overrides.is_empty() {
        output::print_setup(&mut io::stdout(), &record)?;
        return Ok(());
    }

    let (updated, changed) = setup::apply_overrides(&record, overrides);
    if changed {
        setup::commit(file, &updated, &old_bytes)?;
    }
    output::print_setup(&mut io::stdout(), &updated)?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
