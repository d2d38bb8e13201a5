//! Sequential decoding of logger byte streams into typed records.
//!
//! A data file is a flat concatenation of 8-byte header records and 5-byte
//! data records, terminated by a 4-byte end-of-stream marker. Data records
//! carry no timestamp; the decoder labels them from a running time reference
//! that info files seed and header records reset.
//!
//! The reference is threaded explicitly between calls so that a multi-file
//! capture can be decoded as one continuous timeline.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use enlog_core::error::{EnlogError, Result};
use enlog_core::records::{
    DataHeaderRecord, DataRecord, InfoRecord, EOF_MARKER, SETUP_MAGIC, START_CODE,
};

// ── TimeReference ─────────────────────────────────────────────────────────────

/// The running wall-clock cursor labelling the next data record.
///
/// An embedded info/header timestamp names the minute that record already
/// covers, so [`Self::reset`] positions the cursor one minute past it: the
/// seed timestamp itself is never emitted as a data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeReference {
    current: NaiveDateTime,
}

impl Default for TimeReference {
    /// Unknown date and time; initialise with something low.
    fn default() -> Self {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("epoch is a valid timestamp");
        Self { current: epoch }
    }
}

impl TimeReference {
    /// Start from an explicit cursor position (used as-is).
    pub fn new(current: NaiveDateTime) -> Self {
        Self { current }
    }

    /// The timestamp the next data record will be labelled with.
    pub fn current(&self) -> NaiveDateTime {
        self.current
    }

    /// Re-anchor on an embedded record timestamp (cursor lands one minute
    /// after it).
    pub fn reset(&mut self, embedded: NaiveDateTime) {
        self.current = embedded + Duration::minutes(1);
    }

    /// One data record was emitted; records arrive once per minute.
    pub fn advance_minute(&mut self) {
        self.current += Duration::minutes(1);
    }
}

// ── DecodedRecord ─────────────────────────────────────────────────────────────

/// One typed record emitted by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    /// An info file's single record; seeds the time reference.
    Info(InfoRecord),
    /// A segment header inside a data file; resets the time reference.
    Header(DataHeaderRecord),
    /// A measurement labelled with its positionally derived timestamp.
    Data {
        record: DataRecord,
        timestamp: NaiveDateTime,
    },
}

// ── Stream machine ────────────────────────────────────────────────────────────

/// Top `buf` up to `target` bytes, tolerating a short read at end of stream.
fn read_up_to(reader: &mut impl Read, buf: &mut Vec<u8>, target: usize) -> Result<()> {
    while buf.len() < target {
        let mut chunk = vec![0u8; target - buf.len()];
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Decode a raw data stream, starting from an already-read chunk.
fn run_machine(
    reader: &mut impl Read,
    time_ref: &mut TimeReference,
    first_chunk: Vec<u8>,
) -> Result<Vec<DecodedRecord>> {
    let mut records = Vec::new();
    let mut buf = first_chunk;

    loop {
        // One 4-byte chunk disambiguates all cases: end-of-stream marker,
        // header start code, or the first bytes of a data record.
        read_up_to(reader, &mut buf, EOF_MARKER.len())?;

        if buf.is_empty() {
            break;
        }
        if buf[..] == EOF_MARKER[..buf.len()] {
            // End-of-stream marker, or a short read that is a strict prefix
            // of it. Either way a clean end.
            break;
        }
        if buf.len() < EOF_MARKER.len() {
            return Err(EnlogError::TrailingBytes(buf.len()));
        }

        if buf[..START_CODE.len()] == START_CODE {
            read_up_to(reader, &mut buf, DataHeaderRecord::SIZE)?;
            let header = DataHeaderRecord::unpack(&buf)?;
            time_ref.reset(header.timestamp()?);
            records.push(DecodedRecord::Header(header));
        } else {
            read_up_to(reader, &mut buf, DataRecord::SIZE)?;
            let record = DataRecord::unpack(&buf)?;
            records.push(DecodedRecord::Data {
                record,
                timestamp: time_ref.current(),
            });
            time_ref.advance_minute();
        }

        buf.clear();
    }

    Ok(records)
}

/// Decode a raw data stream (no file-size dispatch, no setup check).
pub fn decode_stream(
    reader: &mut impl Read,
    time_ref: &mut TimeReference,
) -> Result<Vec<DecodedRecord>> {
    run_machine(reader, time_ref, Vec::new())
}

// ── File dispatch ─────────────────────────────────────────────────────────────

/// Decode one `.bin` file, threading the time reference in and out.
///
/// A file whose size equals [`InfoRecord::SIZE`] is an info file: its single
/// record seeds the reference. A file starting with [`SETUP_MAGIC`] is
/// rejected with [`EnlogError::SetupFileRejected`] — the setup codec owns
/// those. Anything else is decoded as a data stream.
pub fn decode_file(path: &Path, time_ref: &mut TimeReference) -> Result<Vec<DecodedRecord>> {
    let file = File::open(path).map_err(|source| EnlogError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let size = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    if size == InfoRecord::SIZE as u64 {
        let mut buf = Vec::with_capacity(InfoRecord::SIZE);
        reader.read_to_end(&mut buf)?;
        let info = InfoRecord::unpack(&buf)?;
        time_ref.reset(info.init_timestamp()?);
        debug!(
            "{}: info record, time reference seeded at {}",
            path.display(),
            info.init_timestamp()?
        );
        return Ok(vec![DecodedRecord::Info(info)]);
    }

    let mut first_chunk = Vec::new();
    read_up_to(&mut reader, &mut first_chunk, SETUP_MAGIC.len())?;
    if first_chunk[..] == SETUP_MAGIC {
        return Err(EnlogError::SetupFileRejected(path.to_path_buf()));
    }

    let records = run_machine(&mut reader, time_ref, first_chunk)?;
    debug!("{}: {} records decoded", path.display(), records.len());
    Ok(records)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use enlog_core::timeline::{format_minute, parse_minute};
    use std::io::Cursor;
    use std::io::Write;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn info_bytes(year: u8, month: u8, day: u8, hour: u8, minute: u8) -> Vec<u8> {
        InfoRecord {
            init_date_year: year,
            init_date_month: month,
            init_date_day: day,
            init_time_hour: hour,
            init_time_minute: minute,
            unit_id: 1,
            total_energy: 0,
            total_recorded_minutes: 0,
            total_on_minutes: 0,
        }
        .pack()
        .to_vec()
    }

    fn header_bytes(year: u8, month: u8, day: u8, hour: u8, minute: u8) -> Vec<u8> {
        DataHeaderRecord {
            record_year: year,
            record_month: month,
            record_day: day,
            record_hour: hour,
            record_minute: minute,
        }
        .pack()
        .to_vec()
    }

    fn data_bytes(voltage_tenths: u16) -> Vec<u8> {
        DataRecord {
            voltage_raw: voltage_tenths,
            current_raw: 1000,
            power_factor_raw: 100,
        }
        .pack()
        .to_vec()
    }

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    fn data_timestamps(records: &[DecodedRecord]) -> Vec<String> {
        records
            .iter()
            .filter_map(|r| match r {
                DecodedRecord::Data { timestamp, .. } => Some(format_minute(*timestamp)),
                _ => None,
            })
            .collect()
    }

    // ── TimeReference ─────────────────────────────────────────────────────────

    #[test]
    fn test_time_reference_default_is_epoch() {
        let time_ref = TimeReference::default();
        assert_eq!(format_minute(time_ref.current()), "1970-01-01 00:00");
    }

    #[test]
    fn test_time_reference_reset_lands_one_minute_after() {
        let mut time_ref = TimeReference::default();
        time_ref.reset(parse_minute("2020-01-01 00:00").unwrap());
        assert_eq!(format_minute(time_ref.current()), "2020-01-01 00:01");
    }

    // ── Stream machine ────────────────────────────────────────────────────────

    #[test]
    fn test_info_seed_then_three_data_records() {
        let dir = TempDir::new().unwrap();
        let info = write_file(&dir, "01.bin", &info_bytes(20, 1, 1, 0, 0));

        let mut stream = Vec::new();
        for _ in 0..3 {
            stream.extend_from_slice(&data_bytes(2300));
        }
        stream.extend_from_slice(&EOF_MARKER);
        let data = write_file(&dir, "0a.bin", &stream);

        let mut time_ref = TimeReference::default();
        let seed = decode_file(&info, &mut time_ref).unwrap();
        assert!(matches!(seed[0], DecodedRecord::Info(_)));

        let records = decode_file(&data, &mut time_ref).unwrap();
        // Seed timestamp 2020-01-01 00:00 is never emitted as a data row.
        assert_eq!(
            data_timestamps(&records),
            vec!["2020-01-01 00:01", "2020-01-01 00:02", "2020-01-01 00:03"]
        );
    }

    #[test]
    fn test_header_resets_reference() {
        let mut stream = header_bytes(21, 6, 15, 10, 0);
        stream.extend_from_slice(&data_bytes(2300));
        stream.extend_from_slice(&data_bytes(2310));
        stream.extend_from_slice(&EOF_MARKER);

        let mut time_ref = TimeReference::default();
        let records = decode_stream(&mut Cursor::new(stream), &mut time_ref).unwrap();

        assert!(matches!(records[0], DecodedRecord::Header(_)));
        assert_eq!(
            data_timestamps(&records),
            vec!["2021-06-15 10:01", "2021-06-15 10:02"]
        );
    }

    #[test]
    fn test_data_without_seed_uses_caller_reference() {
        let mut stream = data_bytes(2300);
        stream.extend_from_slice(&EOF_MARKER);

        let mut time_ref = TimeReference::new(parse_minute("1999-12-31 23:59").unwrap());
        let records = decode_stream(&mut Cursor::new(stream), &mut time_ref).unwrap();
        assert_eq!(data_timestamps(&records), vec!["1999-12-31 23:59"]);
        // Reference advanced for the next file.
        assert_eq!(format_minute(time_ref.current()), "2000-01-01 00:00");
    }

    #[test]
    fn test_short_eof_prefix_is_clean_end() {
        let mut stream = data_bytes(2300);
        stream.extend_from_slice(&[0xFF, 0xFF]); // truncated marker

        let mut time_ref = TimeReference::default();
        let records = decode_stream(&mut Cursor::new(stream), &mut time_ref).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_stream_without_marker_ends_cleanly() {
        let stream = data_bytes(2300);
        let mut time_ref = TimeReference::default();
        let records = decode_stream(&mut Cursor::new(stream), &mut time_ref).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_ambiguous_trailing_bytes_fail() {
        let mut stream = data_bytes(2300);
        stream.push(0x42); // one stray byte, not an EOF-marker prefix

        let mut time_ref = TimeReference::default();
        let err = decode_stream(&mut Cursor::new(stream), &mut time_ref).unwrap_err();
        assert!(matches!(err, EnlogError::TrailingBytes(1)));
    }

    #[test]
    fn test_truncated_header_fails() {
        let stream = header_bytes(21, 6, 15, 10, 0)[..6].to_vec();
        let mut time_ref = TimeReference::default();
        let err = decode_stream(&mut Cursor::new(stream), &mut time_ref).unwrap_err();
        assert!(matches!(err, EnlogError::RecordFormat { .. }));
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let mut time_ref = TimeReference::default();
        let records = decode_stream(&mut Cursor::new(Vec::new()), &mut time_ref).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_marker_only_stream_yields_nothing() {
        let mut time_ref = TimeReference::default();
        let records = decode_stream(&mut Cursor::new(EOF_MARKER.to_vec()), &mut time_ref).unwrap();
        assert!(records.is_empty());
    }

    // ── File dispatch ─────────────────────────────────────────────────────────

    #[test]
    fn test_setup_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bytes = SETUP_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 9]);
        let path = write_file(&dir, "setupel3.bin", &bytes);

        let mut time_ref = TimeReference::default();
        let err = decode_file(&path, &mut time_ref).unwrap_err();
        assert!(matches!(err, EnlogError::SetupFileRejected(_)));
        // The reference is untouched by the rejected file.
        assert_eq!(format_minute(time_ref.current()), "1970-01-01 00:00");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let mut time_ref = TimeReference::default();
        let err = decode_file(Path::new("/nonexistent/42.bin"), &mut time_ref).unwrap_err();
        assert!(matches!(err, EnlogError::FileRead { .. }));
    }

    #[test]
    fn test_reference_threads_across_files() {
        let dir = TempDir::new().unwrap();
        let mut first = data_bytes(2300);
        first.extend_from_slice(&data_bytes(2310));
        first.extend_from_slice(&EOF_MARKER);
        let mut second = data_bytes(2320);
        second.extend_from_slice(&EOF_MARKER);

        let info = write_file(&dir, "01.bin", &info_bytes(20, 3, 1, 12, 0));
        let file1 = write_file(&dir, "0b.bin", &first);
        let file2 = write_file(&dir, "0a.bin", &second);

        let mut time_ref = TimeReference::default();
        decode_file(&info, &mut time_ref).unwrap();
        let records1 = decode_file(&file1, &mut time_ref).unwrap();
        let records2 = decode_file(&file2, &mut time_ref).unwrap();

        assert_eq!(
            data_timestamps(&records1),
            vec!["2020-03-01 12:01", "2020-03-01 12:02"]
        );
        // Continuation: the second file picks up where the first stopped.
        assert_eq!(data_timestamps(&records2), vec!["2020-03-01 12:03"]);
    }
}
