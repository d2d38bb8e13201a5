//! Directory-mode orchestration: decode a whole SD-card capture directory
//! into one chronologically ordered timeline.
//!
//! The logger names its files as ascending hexadecimal numbers, and a quirk
//! of the firmware is that ascending filename order is *reverse*
//! chronological order. The first file in ascending order is the info file
//! that seeds the time reference; the remaining files must be processed in
//! reversed order to read oldest-first.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{info, warn};
use walkdir::WalkDir;

use enlog_core::error::{EnlogError, Result};
use enlog_core::records::{DataHeaderRecord, DataRecord, InfoRecord};
use enlog_core::session::{summarize, SessionSummary};
use enlog_core::timeline::format_minute;

use crate::decoder::{decode_file, DecodedRecord, TimeReference};

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Ascending sort key: the file stem parsed as a hexadecimal number.
///
/// Non-hex stems sort after all hex stems, lexicographically; device cards
/// only produce hex names, so this is just a total order for the sort.
fn hex_sort_key(path: &Path) -> (bool, u64, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match u64::from_str_radix(&stem, 16) {
        Ok(value) => (false, value, stem),
        Err(_) => (true, 0, stem),
    }
}

/// Find all `.bin` files directly inside `dir`, sorted ascending by filename
/// treated as a hexadecimal number.
pub fn find_bin_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("bin"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort_by_key(|p| hex_sort_key(p));
    files
}

// ── DirectoryData ─────────────────────────────────────────────────────────────

/// One timestamped measurement on the reconstructed timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub timestamp: NaiveDateTime,
    pub record: DataRecord,
}

/// A caller-defined `[start, end)` session window.
#[derive(Debug, Clone)]
pub struct SessionWindow {
    pub label: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Everything decoded from one capture directory, held in memory so that
/// output files are only written after the whole decode succeeded.
#[derive(Debug, Clone, Default)]
pub struct DirectoryData {
    pub info: Vec<InfoRecord>,
    pub headers: Vec<DataHeaderRecord>,
    pub rows: Vec<DataRow>,
}

impl DirectoryData {
    fn absorb(&mut self, records: Vec<DecodedRecord>) {
        for record in records {
            match record {
                DecodedRecord::Info(info) => self.info.push(info),
                DecodedRecord::Header(header) => self.headers.push(header),
                DecodedRecord::Data { record, timestamp } => {
                    self.rows.push(DataRow { timestamp, record })
                }
            }
        }
    }

    /// Fail unless every row's timestamp is strictly greater than the
    /// previous one.
    pub fn verify_sorted(&self) -> Result<()> {
        for pair in self.rows.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(EnlogError::OrderingViolation {
                    previous: format_minute(pair[0].timestamp),
                    current: format_minute(pair[1].timestamp),
                });
            }
        }
        info!("Entries are correctly sorted by date ({} rows)", self.rows.len());
        Ok(())
    }

    /// Records falling inside the `[start, end)` window.
    fn window_records(&self, window: &SessionWindow) -> Vec<DataRecord> {
        self.rows
            .iter()
            .filter(|row| row.timestamp >= window.start && row.timestamp < window.end)
            .map(|row| row.record)
            .collect()
    }

    /// Summarise each requested session window.
    pub fn sessions(&self, windows: &[SessionWindow]) -> Result<Vec<SessionSummary>> {
        windows
            .iter()
            .map(|w| summarize(&w.label, w.start, w.end, &self.window_records(w)))
            .collect()
    }
}

// ── Orchestration ─────────────────────────────────────────────────────────────

/// Decode every `.bin` file in `dir` into one continuous timeline.
///
/// The first file in ascending hex order seeds the time reference (it is the
/// info file on a healthy card); the remaining files are decoded in reverse
/// order, which is chronological. Setup files are skipped with a warning.
/// The decoded timeline is verified to be strictly increasing before it is
/// returned — an [`EnlogError::OrderingViolation`] aborts before any output
/// can be produced.
pub fn decode_directory(dir: &Path) -> Result<DirectoryData> {
    info!("Processing dir: {}", dir.display());

    let filenames = find_bin_files(dir);
    let Some((seed_file, data_files)) = filenames.split_first() else {
        return Err(EnlogError::NoBinFiles(dir.to_path_buf()));
    };

    let mut data = DirectoryData::default();
    let mut time_ref = TimeReference::default();

    let mut process = |path: &Path, data: &mut DirectoryData| -> Result<()> {
        info!("Processing file: {}", path.display());
        match decode_file(path, &mut time_ref) {
            Ok(records) => {
                data.absorb(records);
                Ok(())
            }
            Err(EnlogError::SetupFileRejected(path)) => {
                warn!("Setup file is ignored: {}", path.display());
                Ok(())
            }
            Err(e) => Err(e),
        }
    };

    process(seed_file, &mut data)?;
    if data.info.is_empty() {
        warn!(
            "First file {} is not an info file; the time reference starts at the epoch",
            seed_file.display()
        );
    }
    for path in data_files.iter().rev() {
        process(path, &mut data)?;
    }

    data.verify_sorted()?;
    Ok(data)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
