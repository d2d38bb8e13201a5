//! Output formatting: per-record printers for the decode command and the
//! exclusive-create file writers for directory mode.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use enlog_core::error::{EnlogError, Result};
use enlog_core::records::{DataHeaderRecord, DataRecord, InfoRecord, SetupRecord};
use enlog_core::session::SessionSummary;
use enlog_core::timeline::format_minute;
use enlog_data::directory::DataRow;

/// Column order of the raw per-minute CSV. External contract.
pub const RAW_CSV_COLUMNS: [&str; 6] = [
    "date",
    "voltage",
    "current",
    "power_factor",
    "apparent_power",
    "effective_power",
];

// ── Info rendering ────────────────────────────────────────────────────────────

/// The `key: value` entries derived from an info record, in display order.
pub fn info_entries(info: &InfoRecord) -> Result<Vec<(String, String)>> {
    let initialized = format_minute(info.init_timestamp()?);
    Ok(vec![
        ("initialized".to_string(), initialized),
        ("unit_id".to_string(), info.unit_id.to_string()),
        (
            "total_energy_kwh".to_string(),
            info.total_energy_kwh().to_string(),
        ),
        (
            "total_recorded_minutes".to_string(),
            info.total_recorded_minutes.to_string(),
        ),
        (
            "total_on_minutes".to_string(),
            info.total_on_minutes.to_string(),
        ),
    ])
}

// ── Printers ──────────────────────────────────────────────────────────────────

/// Per-record output formatter for the decode command.
pub trait Printer {
    fn print_info(&mut self, info: &InfoRecord) -> Result<()>;
    fn print_data_header(&mut self, header: &DataHeaderRecord) -> Result<()>;
    fn print_data(&mut self, record: &DataRecord, date: &str) -> Result<()>;
}

/// Human-readable default output.
pub struct BasePrinter<W: Write> {
    out: W,
}

impl<W: Write> BasePrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Printer for BasePrinter<W> {
    fn print_info(&mut self, info: &InfoRecord) -> Result<()> {
        for (key, value) in info_entries(info)? {
            writeln!(self.out, "{}: {}", key, value)?;
        }
        Ok(())
    }

    fn print_data_header(&mut self, header: &DataHeaderRecord) -> Result<()> {
        writeln!(self.out, "# time reference: {}", format_minute(header.timestamp()?))?;
        Ok(())
    }

    fn print_data(&mut self, record: &DataRecord, date: &str) -> Result<()> {
        writeln!(
            self.out,
            "{}: {:.1} V, {:.3} A, cos phi {:.2}, {:.2} VA, {:.2} W",
            date,
            record.voltage(),
            record.current(),
            record.power_factor(),
            record.apparent_power(),
            record.effective_power(),
        )?;
        Ok(())
    }
}

/// Raw wire integers, for debugging captures.
pub struct RawPrinter<W: Write> {
    out: W,
}

impl<W: Write> RawPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Printer for RawPrinter<W> {
    fn print_info(&mut self, info: &InfoRecord) -> Result<()> {
        writeln!(self.out, "{:?}", info)?;
        Ok(())
    }

    fn print_data_header(&mut self, header: &DataHeaderRecord) -> Result<()> {
        writeln!(self.out, "{:?}", header)?;
        Ok(())
    }

    fn print_data(&mut self, record: &DataRecord, date: &str) -> Result<()> {
        writeln!(
            self.out,
            "{} {} {} {}",
            date, record.voltage_raw, record.current_raw, record.power_factor_raw
        )?;
        Ok(())
    }
}

/// Per-minute CSV with the canonical six-column header.
pub struct CsvPrinter<W: Write> {
    out: W,
    delimiter: String,
    wrote_header: bool,
}

impl<W: Write> CsvPrinter<W> {
    pub fn new(out: W, delimiter: &str) -> Self {
        Self {
            out,
            delimiter: delimiter.to_string(),
            wrote_header: false,
        }
    }
}

/// One raw-CSV data line (no trailing newline).
pub fn raw_csv_line(record: &DataRecord, date: &str, delimiter: &str) -> String {
    [
        date.to_string(),
        record.voltage().to_string(),
        record.current().to_string(),
        record.power_factor().to_string(),
        record.apparent_power().to_string(),
        record.effective_power().to_string(),
    ]
    .join(delimiter)
}

impl<W: Write> Printer for CsvPrinter<W> {
    fn print_info(&mut self, _info: &InfoRecord) -> Result<()> {
        // Info records have no row in the measurement CSV.
        Ok(())
    }

    fn print_data_header(&mut self, _header: &DataHeaderRecord) -> Result<()> {
        Ok(())
    }

    fn print_data(&mut self, record: &DataRecord, date: &str) -> Result<()> {
        if !self.wrote_header {
            writeln!(self.out, "{}", RAW_CSV_COLUMNS.join(self.delimiter.as_str()))?;
            self.wrote_header = true;
        }
        writeln!(self.out, "{}", raw_csv_line(record, date, &self.delimiter))?;
        Ok(())
    }
}

/// Effective power (watts) only.
pub struct EffectivePowerPrinter<W: Write> {
    out: W,
    delimiter: String,
}

impl<W: Write> EffectivePowerPrinter<W> {
    pub fn new(out: W, delimiter: &str) -> Self {
        Self {
            out,
            delimiter: delimiter.to_string(),
        }
    }
}

impl<W: Write> Printer for EffectivePowerPrinter<W> {
    fn print_info(&mut self, _info: &InfoRecord) -> Result<()> {
        Ok(())
    }

    fn print_data_header(&mut self, _header: &DataHeaderRecord) -> Result<()> {
        Ok(())
    }

    fn print_data(&mut self, record: &DataRecord, date: &str) -> Result<()> {
        writeln!(self.out, "{}{}{}", date, self.delimiter, record.effective_power())?;
        Ok(())
    }
}

/// Apparent power (volt-amperes) only.
pub struct ApparentPowerPrinter<W: Write> {
    out: W,
    delimiter: String,
}

impl<W: Write> ApparentPowerPrinter<W> {
    pub fn new(out: W, delimiter: &str) -> Self {
        Self {
            out,
            delimiter: delimiter.to_string(),
        }
    }
}

impl<W: Write> Printer for ApparentPowerPrinter<W> {
    fn print_info(&mut self, _info: &InfoRecord) -> Result<()> {
        Ok(())
    }

    fn print_data_header(&mut self, _header: &DataHeaderRecord) -> Result<()> {
        Ok(())
    }

    fn print_data(&mut self, record: &DataRecord, date: &str) -> Result<()> {
        writeln!(self.out, "{}{}{}", date, self.delimiter, record.apparent_power())?;
        Ok(())
    }
}

// ── Setup display ─────────────────────────────────────────────────────────────

/// Print the setup record's fields in registry order.
pub fn print_setup(out: &mut impl Write, record: &SetupRecord) -> Result<()> {
    for (name, value) in record.fields() {
        writeln!(out, "{}: {}", name, value)?;
    }
    Ok(())
}

// ── Directory-mode file writers ───────────────────────────────────────────────

/// Open `path` with exclusive-create semantics: an accidental re-run fails
/// loudly instead of clobbering earlier results.
fn create_new(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                EnlogError::OutputExists(path.to_path_buf())
            } else {
                EnlogError::Io(e)
            }
        })
}

/// Write the info summary as `key: value` lines.
pub fn write_info_yaml(path: &Path, entries: &[(String, String)]) -> Result<()> {
    let mut file = create_new(path)?;
    for (key, value) in entries {
        writeln!(file, "{}: {}", key, value)?;
    }
    Ok(())
}

/// Write the raw per-minute CSV.
pub fn write_raw_csv(path: &Path, rows: &[DataRow]) -> Result<()> {
    let mut file = create_new(path)?;
    writeln!(file, "{}", RAW_CSV_COLUMNS.join(","))?;
    for row in rows {
        let date = format_minute(row.timestamp);
        writeln!(file, "{}", raw_csv_line(&row.record, &date, ","))?;
    }
    Ok(())
}

/// Write the session summary CSV with the canonical seventeen-field header.
pub fn write_sessions_csv(path: &Path, summaries: &[SessionSummary]) -> Result<()> {
    let mut file = create_new(path)?;
    writeln!(file, "{}", SessionSummary::csv_header(","))?;
    for summary in summaries {
        writeln!(file, "{}", summary.to_csv_line(","))?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
