//! Fixed binary record layouts for the Energy Logger 4000 SD-card format.
//!
//! The logger writes four kinds of fixed-size records. Their byte sizes,
//! field offsets and magic markers are version-locked: already-captured
//! device data depends on every offset staying exactly where it is.
//!
//! All multi-byte fields are big-endian.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{EnlogError, Result};

// ── Wire constants ────────────────────────────────────────────────────────────

/// End-of-stream marker terminating a data file.
pub const EOF_MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Start code preceding every data-header record inside a data file.
pub const START_CODE: [u8; 3] = [0xE0, 0xC5, 0xEA];

/// Magic bytes identifying a setup file (`setupel3.bin`).
///
/// Deliberately the same length as [`EOF_MARKER`]: a single 4-byte read is
/// enough to disambiguate setup files, the end-of-stream marker, and the
/// 3-byte start code.
pub const SETUP_MAGIC: [u8; 4] = [0xB8, 0xAD, 0xF2, 0x8E];

// ── RecordKind ────────────────────────────────────────────────────────────────

/// The four record kinds the logger produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Info,
    DataHeader,
    Data,
    Setup,
}

impl RecordKind {
    /// Fixed encoded byte length of this record kind.
    pub fn size(&self) -> usize {
        match self {
            RecordKind::Info => InfoRecord::SIZE,
            RecordKind::DataHeader => DataHeaderRecord::SIZE,
            RecordKind::Data => DataRecord::SIZE,
            RecordKind::Setup => SetupRecord::SIZE,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Info => "info",
            RecordKind::DataHeader => "data header",
            RecordKind::Data => "data",
            RecordKind::Setup => "setup",
        };
        write!(f, "{}", name)
    }
}

// ── Shared decode helpers ─────────────────────────────────────────────────────

/// Fail unless `buf` is exactly the declared size for `kind`.
fn check_len(kind: RecordKind, buf: &[u8]) -> Result<()> {
    if buf.len() != kind.size() {
        return Err(EnlogError::RecordFormat {
            kind,
            expected: kind.size(),
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Fail when `value` falls outside `lo..=hi`.
fn check_domain(kind: RecordKind, field: &'static str, value: u64, lo: u64, hi: u64) -> Result<()> {
    if value < lo || value > hi {
        return Err(EnlogError::FieldDomain {
            kind,
            field,
            value: value as f64,
        });
    }
    Ok(())
}

/// Build a minute-granularity timestamp from the logger's five byte fields.
///
/// The year byte is an offset from 2000.
fn embedded_timestamp(year: u8, month: u8, day: u8, hour: u8, minute: u8) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2000 + i32::from(year), u32::from(month), u32::from(day))
        .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), 0))
        .ok_or_else(|| {
            EnlogError::Timestamp(format!(
                "20{:02}-{:02}-{:02} {:02}:{:02}",
                year, month, day, hour, minute
            ))
        })
}

fn u16_be(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn u32_be(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── InfoRecord ────────────────────────────────────────────────────────────────

/// The one-per-capture info record: initialisation timestamp plus lifetime
/// device counters. Recognised purely by file size — info files contain
/// nothing but this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRecord {
    /// Years since 2000.
    pub init_date_year: u8,
    pub init_date_month: u8,
    pub init_date_day: u8,
    pub init_time_hour: u8,
    pub init_time_minute: u8,
    /// Logger unit number shown on the device display.
    pub unit_id: u8,
    /// Total recorded energy in milli-kWh.
    pub total_energy: u32,
    /// Total recording time in minutes.
    pub total_recorded_minutes: u32,
    /// Total time with a measurable load, in minutes.
    pub total_on_minutes: u32,
}

impl InfoRecord {
    pub const SIZE: usize = 18;

    /// Decode an info record from exactly [`Self::SIZE`] bytes.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        let kind = RecordKind::Info;
        check_len(kind, buf)?;

        let record = Self {
            init_date_year: buf[0],
            init_date_month: buf[1],
            init_date_day: buf[2],
            init_time_hour: buf[3],
            init_time_minute: buf[4],
            unit_id: buf[5],
            total_energy: u32_be(buf, 6),
            total_recorded_minutes: u32_be(buf, 10),
            total_on_minutes: u32_be(buf, 14),
        };

        check_domain(kind, "init_date_month", record.init_date_month.into(), 1, 12)?;
        check_domain(kind, "init_date_day", record.init_date_day.into(), 1, 31)?;
        check_domain(kind, "init_time_hour", record.init_time_hour.into(), 0, 23)?;
        check_domain(kind, "init_time_minute", record.init_time_minute.into(), 0, 59)?;

        Ok(record)
    }

    /// Encode back into the fixed wire layout.
    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.init_date_year;
        buf[1] = self.init_date_month;
        buf[2] = self.init_date_day;
        buf[3] = self.init_time_hour;
        buf[4] = self.init_time_minute;
        buf[5] = self.unit_id;
        buf[6..10].copy_from_slice(&self.total_energy.to_be_bytes());
        buf[10..14].copy_from_slice(&self.total_recorded_minutes.to_be_bytes());
        buf[14..18].copy_from_slice(&self.total_on_minutes.to_be_bytes());
        buf
    }

    /// The timestamp the logger was initialised at.
    pub fn init_timestamp(&self) -> Result<NaiveDateTime> {
        embedded_timestamp(
            self.init_date_year,
            self.init_date_month,
            self.init_date_day,
            self.init_time_hour,
            self.init_time_minute,
        )
    }

    /// Total recorded energy in kWh.
    pub fn total_energy_kwh(&self) -> f64 {
        f64::from(self.total_energy) / 1000.0
    }
}

// ── DataHeaderRecord ──────────────────────────────────────────────────────────

/// Marks the start of a contiguous recording segment inside a data file and
/// carries the full timestamp that becomes the new time reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHeaderRecord {
    /// Years since 2000.
    pub record_year: u8,
    pub record_month: u8,
    pub record_day: u8,
    pub record_hour: u8,
    pub record_minute: u8,
}

impl DataHeaderRecord {
    pub const SIZE: usize = START_CODE.len() + 5;

    /// Decode a data-header record, start code included.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        let kind = RecordKind::DataHeader;
        check_len(kind, buf)?;
        if buf[..START_CODE.len()] != START_CODE {
            return Err(EnlogError::FieldDomain {
                kind,
                field: "start_code",
                value: f64::from(buf[0]),
            });
        }

        let record = Self {
            record_year: buf[3],
            record_month: buf[4],
            record_day: buf[5],
            record_hour: buf[6],
            record_minute: buf[7],
        };

        check_domain(kind, "record_month", record.record_month.into(), 1, 12)?;
        check_domain(kind, "record_day", record.record_day.into(), 1, 31)?;
        check_domain(kind, "record_hour", record.record_hour.into(), 0, 23)?;
        check_domain(kind, "record_minute", record.record_minute.into(), 0, 59)?;

        Ok(record)
    }

    /// Encode back into the fixed wire layout, start code included.
    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..START_CODE.len()].copy_from_slice(&START_CODE);
        buf[3] = self.record_year;
        buf[4] = self.record_month;
        buf[5] = self.record_day;
        buf[6] = self.record_hour;
        buf[7] = self.record_minute;
        buf
    }

    /// The new time reference carried by this header.
    pub fn timestamp(&self) -> Result<NaiveDateTime> {
        embedded_timestamp(
            self.record_year,
            self.record_month,
            self.record_day,
            self.record_hour,
            self.record_minute,
        )
    }
}

// ── DataRecord ────────────────────────────────────────────────────────────────

/// One minute of measurements. Carries no timestamp of its own: the decoder
/// derives it positionally from the current time reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Mains voltage in tenths of a volt.
    pub voltage_raw: u16,
    /// Load current in milliamperes.
    pub current_raw: u16,
    /// Power factor in hundredths.
    pub power_factor_raw: u8,
}

impl DataRecord {
    pub const SIZE: usize = 5;

    /// Decode a data record from exactly [`Self::SIZE`] bytes.
    ///
    /// Every bit pattern is a valid measurement; only the length can fail.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        check_len(RecordKind::Data, buf)?;
        Ok(Self {
            voltage_raw: u16_be(buf, 0),
            current_raw: u16_be(buf, 2),
            power_factor_raw: buf[4],
        })
    }

    /// Encode back into the fixed wire layout.
    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..2].copy_from_slice(&self.voltage_raw.to_be_bytes());
        buf[2..4].copy_from_slice(&self.current_raw.to_be_bytes());
        buf[4] = self.power_factor_raw;
        buf
    }

    /// Mains voltage in volts.
    pub fn voltage(&self) -> f64 {
        f64::from(self.voltage_raw) / 10.0
    }

    /// Load current in amperes.
    pub fn current(&self) -> f64 {
        f64::from(self.current_raw) / 1000.0
    }

    /// Power factor (cos φ), 0.0..=1.0 in practice.
    pub fn power_factor(&self) -> f64 {
        f64::from(self.power_factor_raw) / 100.0
    }

    /// Apparent power in volt-amperes: `U * I`.
    pub fn apparent_power(&self) -> f64 {
        self.voltage() * self.current()
    }

    /// Effective power in watts: `U * I * cos φ`.
    pub fn effective_power(&self) -> f64 {
        self.apparent_power() * self.power_factor()
    }
}

// ── SetupRecord ───────────────────────────────────────────────────────────────

/// Domain of one named setup field: inclusive bounds on the raw value.
struct SetupFieldSpec {
    name: &'static str,
    max: u64,
}

const SETUP_FIELDS: [SetupFieldSpec; 6] = [
    SetupFieldSpec { name: "unit_id", max: 9 },
    SetupFieldSpec { name: "currency", max: 3 },
    SetupFieldSpec { name: "tariff1", max: u16::MAX as u64 },
    SetupFieldSpec { name: "tariff2", max: u16::MAX as u64 },
    SetupFieldSpec { name: "alarm_threshold", max: u16::MAX as u64 },
    SetupFieldSpec { name: "backlight_minutes", max: 99 },
];

/// The mutable device configuration record (`setupel3.bin`).
///
/// Fields are addressable by name through the closed registry in
/// [`Self::FIELD_NAMES`], which is what lets the CLI accept `key=value`
/// overrides. Values are raw wire integers exposed as `f64`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupRecord {
    pub unit_id: u8,
    pub currency: u8,
    /// Primary tariff in hundredths of the currency unit per kWh.
    pub tariff1: u16,
    /// Secondary tariff in hundredths of the currency unit per kWh.
    pub tariff2: u16,
    /// Power alarm threshold in watts.
    pub alarm_threshold: u16,
    pub backlight_minutes: u8,
}

impl SetupRecord {
    pub const SIZE: usize = SETUP_MAGIC.len() + 9;

    /// The ordered, closed set of overridable field names.
    pub const FIELD_NAMES: [&'static str; 6] = [
        "unit_id",
        "currency",
        "tariff1",
        "tariff2",
        "alarm_threshold",
        "backlight_minutes",
    ];

    /// Decode with full validation (magic bytes and field domains).
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        Self::unpack_with(buf, true)
    }

    /// Decode with validation suppressed: only the length is checked.
    ///
    /// An all-zero buffer is a valid input here — it is the synthesised
    /// default for an absent or empty setup file.
    pub fn unpack_unchecked(buf: &[u8]) -> Result<Self> {
        Self::unpack_with(buf, false)
    }

    fn unpack_with(buf: &[u8], validate: bool) -> Result<Self> {
        let kind = RecordKind::Setup;
        check_len(kind, buf)?;

        if validate && buf[..SETUP_MAGIC.len()] != SETUP_MAGIC {
            return Err(EnlogError::FieldDomain {
                kind,
                field: "magic",
                value: f64::from(buf[0]),
            });
        }

        let record = Self {
            unit_id: buf[4],
            currency: buf[5],
            tariff1: u16_be(buf, 6),
            tariff2: u16_be(buf, 8),
            alarm_threshold: u16_be(buf, 10),
            backlight_minutes: buf[12],
        };

        if validate {
            for spec in &SETUP_FIELDS {
                let value = record
                    .field(spec.name)
                    .expect("registry names are always readable");
                check_domain(kind, spec.name, value as u64, 0, spec.max)?;
            }
        }

        Ok(record)
    }

    /// Encode back into the fixed wire layout, magic included.
    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..SETUP_MAGIC.len()].copy_from_slice(&SETUP_MAGIC);
        buf[4] = self.unit_id;
        buf[5] = self.currency;
        buf[6..8].copy_from_slice(&self.tariff1.to_be_bytes());
        buf[8..10].copy_from_slice(&self.tariff2.to_be_bytes());
        buf[10..12].copy_from_slice(&self.alarm_threshold.to_be_bytes());
        buf[12] = self.backlight_minutes;
        buf
    }

    /// Build a record from a complete named field map.
    ///
    /// Fails with [`EnlogError::MissingField`] when any registry name is
    /// absent; names outside the registry are ignored.
    pub fn from_fields(fields: &BTreeMap<String, f64>) -> Result<Self> {
        let mut record = Self::default();
        for spec in &SETUP_FIELDS {
            let value = fields
                .get(spec.name)
                .copied()
                .ok_or_else(|| EnlogError::MissingField(spec.name.to_string()))?;
            record.set_field(spec.name, value)?;
        }
        Ok(record)
    }

    /// Read a field by registry name. `None` for unknown names.
    pub fn field(&self, name: &str) -> Option<f64> {
        let value = match name {
            "unit_id" => f64::from(self.unit_id),
            "currency" => f64::from(self.currency),
            "tariff1" => f64::from(self.tariff1),
            "tariff2" => f64::from(self.tariff2),
            "alarm_threshold" => f64::from(self.alarm_threshold),
            "backlight_minutes" => f64::from(self.backlight_minutes),
            _ => return None,
        };
        Some(value)
    }

    /// Set a field by registry name.
    ///
    /// Fails with [`EnlogError::UnknownField`] for names outside the
    /// registry and [`EnlogError::FieldDomain`] for values that are not a
    /// whole number inside the field's wire domain.
    pub fn set_field(&mut self, name: &str, value: f64) -> Result<()> {
        let spec = SETUP_FIELDS
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| EnlogError::UnknownField(name.to_string()))?;

        if value < 0.0 || value.fract() != 0.0 || value > spec.max as f64 {
            return Err(EnlogError::FieldDomain {
                kind: RecordKind::Setup,
                field: spec.name,
                value,
            });
        }

        match name {
            "unit_id" => self.unit_id = value as u8,
            "currency" => self.currency = value as u8,
            "tariff1" => self.tariff1 = value as u16,
            "tariff2" => self.tariff2 = value as u16,
            "alarm_threshold" => self.alarm_threshold = value as u16,
            "backlight_minutes" => self.backlight_minutes = value as u8,
            _ => unreachable!("name was found in the registry"),
        }
        Ok(())
    }

    /// All fields in registry order, for display.
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        Self::FIELD_NAMES
            .iter()
            .map(|name| (*name, self.field(name).expect("registry name")))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
