//! The setup codec: load, override, and rewrite the device configuration
//! file (`setupel3.bin`).
//!
//! The device tolerates a missing or empty setup file, so loading one
//! synthesises an all-zero default instead of failing. Committing writes the
//! file only when the packed bytes actually changed.

use std::fs;
use std::path::Path;

use tracing::{error, info};

use enlog_core::error::{EnlogError, Result};
use enlog_core::records::SetupRecord;

// ── Load ──────────────────────────────────────────────────────────────────────

/// Load a setup record, returning it together with the original bytes.
///
/// An absent or empty file yields the all-zero default (decoded with
/// validation suppressed — zeroes need not satisfy the field domains). A
/// present file of any other size than [`SetupRecord::SIZE`] is a hard
/// error; the caller must not proceed.
pub fn load(path: &Path) -> Result<(SetupRecord, Vec<u8>)> {
    let old_bytes = match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => vec![0u8; SetupRecord::SIZE],
        Ok(meta) if meta.len() != SetupRecord::SIZE as u64 => {
            return Err(EnlogError::SetupSizeMismatch {
                path: path.to_path_buf(),
                expected: SetupRecord::SIZE,
                actual: meta.len(),
            });
        }
        Ok(_) => fs::read(path).map_err(|source| EnlogError::FileRead {
            path: path.to_path_buf(),
            source,
        })?,
        // File does not exist: start from the all-zero default.
        Err(_) => vec![0u8; SetupRecord::SIZE],
    };

    let record = SetupRecord::unpack_unchecked(&old_bytes)?;
    Ok((record, old_bytes))
}

// ── Overrides ─────────────────────────────────────────────────────────────────

/// Apply `key=value` overrides to a copy of `record`.
///
/// Each entry is split on the first `=`. Entries missing `=`, naming an
/// unknown field, or carrying an unusable value are reported and skipped —
/// they never abort the whole operation. Returns the new record and whether
/// any field actually changed. An empty override list is a display-only
/// no-op.
pub fn apply_overrides(record: &SetupRecord, overrides: &[String]) -> (SetupRecord, bool) {
    let mut updated = record.clone();

    for entry in overrides {
        let Some((name, value)) = entry.split_once('=') else {
            error!("Option {} is missing value, skipping", entry);
            continue;
        };

        let Some(old) = updated.field(name) else {
            error!("Invalid setup key: {}", name);
            continue;
        };

        let parsed: f64 = match value.parse() {
            Ok(v) => v,
            Err(_) => {
                error!("Value for {} is not a number: {}", name, value);
                continue;
            }
        };

        match updated.set_field(name, parsed) {
            Ok(()) => println!("Changing {} from {} to {}", name, old, parsed),
            Err(e) => error!("Cannot set {}: {}", name, e),
        }
    }

    let changed = updated != *record;
    (updated, changed)
}

// ── Commit ────────────────────────────────────────────────────────────────────

/// Write `record` to `path` only if its packed bytes differ from
/// `old_bytes`. Returns whether a write happened.
pub fn commit(path: &Path, record: &SetupRecord, old_bytes: &[u8]) -> Result<bool> {
    let new_bytes = record.pack();
    if new_bytes[..] == *old_bytes {
        info!("No changes, not writing file");
        return Ok(false);
    }

    info!("Writing new setup file: {}", path.display());
    fs::write(path, new_bytes)?;
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
