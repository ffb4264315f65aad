//! # Trace Files
//!
//! Recorded accelerometer streams for offline validation.
//!
//! ## CSV
//!
//! One sample per line, `timestamp,x,y,z`. Blank lines and lines starting
//! with `#` are skipped, as is a `timestamp,...` header before the first
//! record.
//!
//! ```text
//! # bench capture, 50 Hz
//! timestamp,x,y,z
//! 0,12,-3,1002
//! 20,10,-1,998
//! ```
//!
//! ## Binary
//!
//! Packed little-endian records with no header:
//!
//! ```text
//! ┌──────────────┬────────┬────────┬────────┐
//! │ timestamp u32│ x i16  │ y i16  │ z i16  │   10 bytes
//! └──────────────┴────────┴────────┴────────┘
//! ```

use crate::error::{SimError, SimResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mbsd_core::Sample;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Size of one binary record in bytes.
pub const RECORD_SIZE: usize = 10;

/// On-disk trace encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// `timestamp,x,y,z` text
    Csv,
    /// Packed little-endian records
    Binary,
}

impl TraceFormat {
    /// Infer the format from a file extension (`csv`/`txt`, `bin`/`trc`).
    pub fn from_path(path: &Path) -> SimResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") | Some("txt") => Ok(TraceFormat::Csv),
            Some("bin") | Some("trc") => Ok(TraceFormat::Binary),
            _ => Err(SimError::UnknownFormat(path.display().to_string())),
        }
    }
}

/// Read a CSV trace.
pub fn read_csv<R: BufRead>(reader: R) -> SimResult<Vec<Sample>> {
    let mut samples = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        if samples.is_empty() && is_header(text) {
            continue;
        }
        samples.push(parse_record(text, i + 1)?);
    }
    Ok(samples)
}

fn is_header(text: &str) -> bool {
    text.split(',')
        .next()
        .map(|field| field.trim().eq_ignore_ascii_case("timestamp"))
        .unwrap_or(false)
}

fn parse_record(text: &str, line: usize) -> SimResult<Sample> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(SimError::Parse {
            line,
            message: format!("expected 4 fields, found {}", fields.len()),
        });
    }

    let timestamp = fields[0].parse::<u32>().map_err(|e| SimError::Parse {
        line,
        message: format!("timestamp '{}': {}", fields[0], e),
    })?;
    let axis = |name: &str, field: &str| {
        field.parse::<i16>().map_err(|e| SimError::Parse {
            line,
            message: format!("{} '{}': {}", name, field, e),
        })
    };

    Ok(Sample::new(
        timestamp,
        axis("x", fields[1])?,
        axis("y", fields[2])?,
        axis("z", fields[3])?,
    ))
}

/// Write a CSV trace with a header line.
pub fn write_csv<W: Write>(mut writer: W, samples: &[Sample]) -> SimResult<()> {
    writeln!(writer, "timestamp,x,y,z")?;
    for s in samples {
        writeln!(writer, "{},{},{},{}", s.timestamp, s.x, s.y, s.z)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a binary trace.
///
/// Fails with `TruncatedRecord` when the data does not end on a record
/// boundary.
pub fn read_binary<R: Read>(mut reader: R) -> SimResult<Vec<Sample>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let trailing = bytes.len() % RECORD_SIZE;
    if trailing != 0 {
        return Err(SimError::TruncatedRecord {
            records: bytes.len() / RECORD_SIZE,
            trailing,
        });
    }

    bytes
        .chunks_exact(RECORD_SIZE)
        .map(|mut record| -> SimResult<Sample> {
            Ok(Sample {
                timestamp: record.read_u32::<LittleEndian>()?,
                x: record.read_i16::<LittleEndian>()?,
                y: record.read_i16::<LittleEndian>()?,
                z: record.read_i16::<LittleEndian>()?,
            })
        })
        .collect()
}

/// Write a binary trace.
pub fn write_binary<W: Write>(mut writer: W, samples: &[Sample]) -> SimResult<()> {
    for s in samples {
        writer.write_u32::<LittleEndian>(s.timestamp)?;
        writer.write_i16::<LittleEndian>(s.x)?;
        writer.write_i16::<LittleEndian>(s.y)?;
        writer.write_i16::<LittleEndian>(s.z)?;
    }
    writer.flush()?;
    Ok(())
}

/// Load a trace, choosing the format from the file extension.
pub fn load(path: &Path) -> SimResult<Vec<Sample>> {
    let format = TraceFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);
    let samples = match format {
        TraceFormat::Csv => read_csv(reader)?,
        TraceFormat::Binary => read_binary(reader)?,
    };
    tracing::debug!(path = %path.display(), samples = samples.len(), "trace loaded");
    Ok(samples)
}

/// Save a trace, choosing the format from the file extension.
pub fn save(path: &Path, samples: &[Sample]) -> SimResult<()> {
    let format = TraceFormat::from_path(path)?;
    let writer = BufWriter::new(File::create(path)?);
    match format {
        TraceFormat::Csv => write_csv(writer, samples),
        TraceFormat::Binary => write_binary(writer, samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(0, 12, -3, 1002),
            Sample::new(20, i16::MIN, i16::MAX, 0),
            Sample::new(u32::MAX, -1, 1, -1),
        ]
    }

    #[test]
    fn test_csv_comments_and_header() {
        let text = "# bench capture\n\ntimestamp,x,y,z\n0,12,-3,1002\n  20 , 10 , -1 , 998 \n";
        let parsed = read_csv(text.as_bytes()).unwrap();
        assert_eq!(
            parsed,
            vec![Sample::new(0, 12, -3, 1002), Sample::new(20, 10, -1, 998)]
        );
    }

    #[test]
    fn test_csv_reports_line_numbers() {
        let text = "timestamp,x,y,z\n0,1,2,3\n20,1,2\n";
        match read_csv(text.as_bytes()) {
            Err(SimError::Parse { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("expected 4 fields"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }

        let text = "0,1,2,3\n20,1,40000,3\n";
        match read_csv(text.as_bytes()) {
            Err(SimError::Parse { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.starts_with("y '40000'"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_header_only_allowed_before_data() {
        let text = "0,1,2,3\ntimestamp,x,y,z\n";
        assert!(matches!(
            read_csv(text.as_bytes()),
            Err(SimError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_binary_layout() {
        let mut bytes = Vec::new();
        write_binary(&mut bytes, &[Sample::new(0x0403_0201, 0x0605, -2, 0x0a09)]).unwrap();
        assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xfe, 0xff, 0x09, 0x0a]);
        assert_eq!(bytes.len(), RECORD_SIZE);
    }

    #[test]
    fn test_binary_truncated() {
        let mut bytes = Vec::new();
        write_binary(&mut bytes, &samples()).unwrap();
        bytes.truncate(bytes.len() - 3);
        match read_binary(bytes.as_slice()) {
            Err(SimError::TruncatedRecord { records, trailing }) => {
                assert_eq!(records, 2);
                assert_eq!(trailing, 7);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = TempDir::new().unwrap();
        for name in ["trace.csv", "trace.bin"] {
            let path = dir.path().join(name);
            save(&path, &samples()).unwrap();
            assert_eq!(load(&path).unwrap(), samples(), "{}", name);
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            TraceFormat::from_path(Path::new("a/b.CSV")).unwrap(),
            TraceFormat::Csv
        );
        assert_eq!(
            TraceFormat::from_path(Path::new("run.trc")).unwrap(),
            TraceFormat::Binary
        );
        assert!(matches!(
            TraceFormat::from_path(Path::new("run.wav")),
            Err(SimError::UnknownFormat(_))
        ));
        assert!(TraceFormat::from_path(Path::new("noext")).is_err());
    }
}
