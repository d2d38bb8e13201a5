//! Session aggregation: reduce a window of per-minute measurements into a
//! fixed-shape statistical summary.
//!
//! A session is any caller-defined `[start, end)` span of data records. The
//! summary tracks effective power and voltage; its canonical field order is
//! an external contract (the `sessions.csv` header) and must never be
//! reordered without a format version bump.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{EnlogError, Result};
use crate::records::DataRecord;
use crate::stats;
use crate::timeline::{format_minute, minutes_between};

// ── SessionSummary ────────────────────────────────────────────────────────────

/// Percentile-based summary of one session window.
///
/// Percentile and min/max slots are `Option` because the statistics engine
/// degrades gracefully on empty input; the averages are plain `f64` because
/// [`summarize`] fails outright before an empty session produces a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Caller-supplied session label, e.g. `"night"` or `"2020-01-15"`.
    pub session_type: String,
    /// Inclusive start of the window.
    pub start: NaiveDateTime,
    /// Exclusive end of the window.
    pub end: NaiveDateTime,
    /// `(end - start)` in minutes, fractional allowed.
    pub duration_minutes: f64,
    pub effective_power_p10: Option<f64>,
    pub effective_power_p50: Option<f64>,
    pub effective_power_p90: Option<f64>,
    pub effective_power_p99: Option<f64>,
    pub effective_power_max: Option<f64>,
    pub effective_power_avg: f64,
    pub voltage_min: Option<f64>,
    pub voltage_p10: Option<f64>,
    pub voltage_p50: Option<f64>,
    pub voltage_p90: Option<f64>,
    pub voltage_p99: Option<f64>,
    pub voltage_max: Option<f64>,
    pub voltage_avg: f64,
}

/// One slot of the positional summary representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SummaryValue {
    Text(String),
    Time(NaiveDateTime),
    Number(f64),
    Missing,
}

impl SummaryValue {
    fn from_opt(value: Option<f64>) -> Self {
        match value {
            Some(v) => SummaryValue::Number(v),
            None => SummaryValue::Missing,
        }
    }

    fn to_opt(&self, field: &str) -> Result<Option<f64>> {
        match self {
            SummaryValue::Number(v) => Ok(Some(*v)),
            SummaryValue::Missing => Ok(None),
            other => Err(EnlogError::SummaryShape(format!(
                "field '{}' expected a number, got {:?}",
                field, other
            ))),
        }
    }

    /// CSV cell rendering: dates at minute granularity, numbers via their
    /// default textual form, missing values as an empty cell.
    fn to_csv_value(&self) -> String {
        match self {
            SummaryValue::Text(s) => s.clone(),
            SummaryValue::Time(ts) => format_minute(*ts),
            SummaryValue::Number(v) => v.to_string(),
            SummaryValue::Missing => String::new(),
        }
    }
}

impl SessionSummary {
    /// Canonical field order of the positional and CSV representations.
    pub const FIELD_NAMES: [&'static str; 17] = [
        "session_type",
        "start",
        "end",
        "duration_minutes",
        "effective_power_p10",
        "effective_power_p50",
        "effective_power_p90",
        "effective_power_p99",
        "effective_power_max",
        "effective_power_avg",
        "voltage_min",
        "voltage_p10",
        "voltage_p50",
        "voltage_p90",
        "voltage_p99",
        "voltage_max",
        "voltage_avg",
    ];

    /// The canonical CSV header line (no trailing newline).
    pub fn csv_header(delimiter: &str) -> String {
        Self::FIELD_NAMES.join(delimiter)
    }

    /// Render this summary as one CSV data line (no trailing newline).
    pub fn to_csv_line(&self, delimiter: &str) -> String {
        self.to_row()
            .iter()
            .map(SummaryValue::to_csv_value)
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    /// The positional view: one slot per canonical field, in order.
    pub fn to_row(&self) -> Vec<SummaryValue> {
        vec![
            SummaryValue::Text(self.session_type.clone()),
            SummaryValue::Time(self.start),
            SummaryValue::Time(self.end),
            SummaryValue::Number(self.duration_minutes),
            SummaryValue::from_opt(self.effective_power_p10),
            SummaryValue::from_opt(self.effective_power_p50),
            SummaryValue::from_opt(self.effective_power_p90),
            SummaryValue::from_opt(self.effective_power_p99),
            SummaryValue::from_opt(self.effective_power_max),
            SummaryValue::Number(self.effective_power_avg),
            SummaryValue::from_opt(self.voltage_min),
            SummaryValue::from_opt(self.voltage_p10),
            SummaryValue::from_opt(self.voltage_p50),
            SummaryValue::from_opt(self.voltage_p90),
            SummaryValue::from_opt(self.voltage_p99),
            SummaryValue::from_opt(self.voltage_max),
            SummaryValue::Number(self.voltage_avg),
        ]
    }

    /// Rebuild a summary from its positional view. Lossless inverse of
    /// [`Self::to_row`].
    pub fn from_row(row: &[SummaryValue]) -> Result<Self> {
        if row.len() != Self::FIELD_NAMES.len() {
            return Err(EnlogError::SummaryShape(format!(
                "expected {} fields, got {}",
                Self::FIELD_NAMES.len(),
                row.len()
            )));
        }

        let text = |i: usize| -> Result<String> {
            match &row[i] {
                SummaryValue::Text(s) => Ok(s.clone()),
                other => Err(EnlogError::SummaryShape(format!(
                    "field '{}' expected text, got {:?}",
                    Self::FIELD_NAMES[i], other
                ))),
            }
        };
        let time = |i: usize| -> Result<NaiveDateTime> {
            match &row[i] {
                SummaryValue::Time(ts) => Ok(*ts),
                other => Err(EnlogError::SummaryShape(format!(
                    "field '{}' expected a timestamp, got {:?}",
                    Self::FIELD_NAMES[i], other
                ))),
            }
        };
        let number = |i: usize| -> Result<f64> {
            match &row[i] {
                SummaryValue::Number(v) => Ok(*v),
                other => Err(EnlogError::SummaryShape(format!(
                    "field '{}' expected a number, got {:?}",
                    Self::FIELD_NAMES[i], other
                ))),
            }
        };
        let opt = |i: usize| -> Result<Option<f64>> { row[i].to_opt(Self::FIELD_NAMES[i]) };

        Ok(Self {
            session_type: text(0)?,
            start: time(1)?,
            end: time(2)?,
            duration_minutes: number(3)?,
            effective_power_p10: opt(4)?,
            effective_power_p50: opt(5)?,
            effective_power_p90: opt(6)?,
            effective_power_p99: opt(7)?,
            effective_power_max: opt(8)?,
            effective_power_avg: number(9)?,
            voltage_min: opt(10)?,
            voltage_p10: opt(11)?,
            voltage_p50: opt(12)?,
            voltage_p90: opt(13)?,
            voltage_p99: opt(14)?,
            voltage_max: opt(15)?,
            voltage_avg: number(16)?,
        })
    }
}

// ── summarize ─────────────────────────────────────────────────────────────────

/// Reduce the records of one session window into a [`SessionSummary`].
///
/// Invokes the statistics engine once per tracked field. Fails with
/// [`EnlogError::EmptyAverage`] when `records` is empty.
pub fn summarize(
    session_type: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    records: &[DataRecord],
) -> Result<SessionSummary> {
    let power = stats::percentiles(records, DataRecord::effective_power);
    let power_avg = stats::average(records, DataRecord::effective_power)?;
    let voltage = stats::percentiles(records, DataRecord::voltage);
    let voltage_avg = stats::average(records, DataRecord::voltage)?;

    Ok(SessionSummary {
        session_type: session_type.to_string(),
        start,
        end,
        duration_minutes: minutes_between(start, end),
        effective_power_p10: power.p10,
        effective_power_p50: power.p50,
        effective_power_p90: power.p90,
        effective_power_p99: power.p99,
        effective_power_max: power.max,
        effective_power_avg: power_avg,
        voltage_min: voltage.min,
        voltage_p10: voltage.p10,
        voltage_p50: voltage.p50,
        voltage_p90: voltage.p90,
        voltage_p99: voltage.p99,
        voltage_max: voltage.max,
        voltage_avg: voltage_avg,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::parse_minute;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// 1 A at unity power factor, so effective power equals voltage.
    fn record(voltage_tenths: u16) -> DataRecord {
        DataRecord {
            voltage_raw: voltage_tenths,
            current_raw: 1000,
            power_factor_raw: 100,
        }
    }

    fn sample_summary() -> SessionSummary {
        let start = parse_minute("2020-01-15 00:00").unwrap();
        let end = parse_minute("2020-01-16 00:00").unwrap();
        let records = [record(2300), record(2310), record(2320)];
        summarize("daily", start, end, &records).unwrap()
    }

    // ── Canonical field order ─────────────────────────────────────────────────

    #[test]
    fn test_canonical_field_order() {
        assert_eq!(
            SessionSummary::FIELD_NAMES.to_vec(),
            vec![
                "session_type",
                "start",
                "end",
                "duration_minutes",
                "effective_power_p10",
                "effective_power_p50",
                "effective_power_p90",
                "effective_power_p99",
                "effective_power_max",
                "effective_power_avg",
                "voltage_min",
                "voltage_p10",
                "voltage_p50",
                "voltage_p90",
                "voltage_p99",
                "voltage_max",
                "voltage_avg",
            ]
        );
    }

    #[test]
    fn test_csv_header() {
        let header = SessionSummary::csv_header(",");
        assert!(header.starts_with("session_type,start,end,duration_minutes,"));
        assert!(header.ends_with(",voltage_max,voltage_avg"));
        assert_eq!(header.split(',').count(), 17);
    }

    // ── summarize ─────────────────────────────────────────────────────────────

    #[test]
    fn test_summarize_small_window() {
        let summary = sample_summary();
        assert_eq!(summary.session_type, "daily");
        assert!((summary.duration_minutes - 1440.0).abs() < f64::EPSILON);

        // Three samples 230 / 231 / 232, last_index = 2:
        //   p10 → ceil(0.2) = index 1 → 231, p50 → index 1, p90/p99 → index 2.
        assert_eq!(summary.voltage_min, Some(230.0));
        assert_eq!(summary.voltage_p10, Some(231.0));
        assert_eq!(summary.voltage_p50, Some(231.0));
        assert_eq!(summary.voltage_p90, Some(232.0));
        assert_eq!(summary.voltage_p99, Some(232.0));
        assert_eq!(summary.voltage_max, Some(232.0));
        assert!((summary.voltage_avg - 231.0).abs() < 1e-9);

        // Unity power factor at 1 A makes effective power track voltage.
        assert_eq!(summary.effective_power_p50, Some(231.0));
        assert_eq!(summary.effective_power_max, Some(232.0));
        assert!((summary.effective_power_avg - 231.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_empty_window_fails() {
        let start = parse_minute("2020-01-15 00:00").unwrap();
        let end = parse_minute("2020-01-15 01:00").unwrap();
        let err = summarize("empty", start, end, &[]).unwrap_err();
        assert!(matches!(err, EnlogError::EmptyAverage));
    }

    #[test]
    fn test_summarize_fractional_duration() {
        let start = parse_minute("2020-01-15 00:00").unwrap();
        let end = parse_minute("2020-01-15 00:01").unwrap();
        let summary = summarize("minute", start, end, &[record(2300)]).unwrap();
        assert!((summary.duration_minutes - 1.0).abs() < f64::EPSILON);
    }

    // ── Positional view ───────────────────────────────────────────────────────

    #[test]
    fn test_row_roundtrip() {
        let summary = sample_summary();
        let row = summary.to_row();
        assert_eq!(row.len(), 17);
        let back = SessionSummary::from_row(&row).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_from_row_wrong_length() {
        let err = SessionSummary::from_row(&[SummaryValue::Missing]).unwrap_err();
        assert!(matches!(err, EnlogError::SummaryShape(_)));
    }

    #[test]
    fn test_from_row_wrong_variant() {
        let mut row = sample_summary().to_row();
        row[1] = SummaryValue::Number(1.0); // 'start' must be a timestamp
        let err = SessionSummary::from_row(&row).unwrap_err();
        assert!(matches!(err, EnlogError::SummaryShape(_)));
    }

    #[test]
    fn test_missing_roundtrips_to_none() {
        let mut summary = sample_summary();
        summary.voltage_min = None;
        let row = summary.to_row();
        assert_eq!(row[10], SummaryValue::Missing);
        let back = SessionSummary::from_row(&row).unwrap();
        assert_eq!(back.voltage_min, None);
    }

    // ── CSV rendering ─────────────────────────────────────────────────────────

    #[test]
    fn test_to_csv_line() {
        let summary = sample_summary();
        let line = summary.to_csv_line(",");
        let cells: Vec<&str> = line.split(',').collect();
        assert_eq!(cells.len(), 17);
        assert_eq!(cells[0], "daily");
        assert_eq!(cells[1], "2020-01-15 00:00");
        assert_eq!(cells[2], "2020-01-16 00:00");
        assert_eq!(cells[3], "1440");
        assert_eq!(cells[10], "230"); // voltage_min
        assert_eq!(cells[16], "231"); // voltage_avg
    }

    #[test]
    fn test_missing_renders_as_empty_cell() {
        let mut summary = sample_summary();
        summary.voltage_min = None;
        let line = summary.to_csv_line(",");
        let cells: Vec<&str> = line.split(',').collect();
        assert_eq!(cells[10], "");
    }
}
