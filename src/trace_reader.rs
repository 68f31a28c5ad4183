//! Pitch trace reader: replays recorded raw samples.
//!
//! A trace is JSONL: a header line `{"format":"pitch-trace", ...}` followed
//! by one `RawSample` per line. Works with any `BufRead`.

use crate::types::RawSample;
use std::io::BufRead;

pub const TRACE_FORMAT: &str = "pitch-trace";

/// Parsed first line of a trace file.
#[derive(Debug)]
pub struct TraceHeader {
    pub format: String,
    /// Nominal tap rate the trace was captured at
    pub rate_hz: u32,
    pub reference_pitch_hz: Option<f64>,
}

pub struct TraceReader<R: BufRead> {
    reader: R,
    pub header: TraceHeader,
    line_buf: String,
}

impl<R: BufRead> TraceReader<R> {
    /// Read and validate the header line.
    pub fn open(mut reader: R) -> Result<Self, String> {
        let mut first_line = String::new();
        reader
            .read_line(&mut first_line)
            .map_err(|e| format!("read header: {}", e))?;

        let first_line = first_line.trim();
        if first_line.is_empty() {
            return Err("empty trace".into());
        }

        let raw: serde_json::Value =
            serde_json::from_str(first_line).map_err(|e| format!("parse header: {}", e))?;

        let format = raw["format"]
            .as_str()
            .ok_or("missing \"format\" field")?
            .to_string();
        if format != TRACE_FORMAT {
            return Err(format!("unknown format: {}", format));
        }

        let rate_hz = raw["rate_hz"].as_u64().unwrap_or(20) as u32;
        let reference_pitch_hz = raw["reference_pitch_hz"].as_f64();

        Ok(Self {
            reader,
            header: TraceHeader {
                format,
                rate_hz,
                reference_pitch_hz,
            },
            line_buf: String::new(),
        })
    }

    /// Next sample; `None` at EOF, `Err` for an unparseable line.
    pub fn next_sample(&mut self) -> Option<Result<RawSample, String>> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line_buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<RawSample>(trimmed)
                            .map_err(|e| format!("parse sample: {}", e)),
                    );
                }
                Err(e) => return Some(Err(format!("read line: {}", e))),
            }
        }
    }

    /// All remaining samples, skipping malformed lines.
    pub fn read_all(mut self) -> Vec<RawSample> {
        let mut samples = Vec::new();
        while let Some(result) = self.next_sample() {
            if let Ok(s) = result {
                samples.push(s);
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = r#"{"format":"pitch-trace","rate_hz":20,"reference_pitch_hz":442.0}"#;

    fn line(hz: f64, amp: f32, ts: u64) -> String {
        serde_json::to_string(&RawSample::new(hz, amp, ts)).unwrap() + "\n"
    }

    #[test]
    fn test_open_valid_header() {
        let r = TraceReader::open(Cursor::new(format!("{}\n", HEADER))).unwrap();
        assert_eq!(r.header.format, "pitch-trace");
        assert_eq!(r.header.rate_hz, 20);
        assert_eq!(r.header.reference_pitch_hz, Some(442.0));
    }

    #[test]
    fn test_header_defaults() {
        let r = TraceReader::open(Cursor::new("{\"format\":\"pitch-trace\"}\n")).unwrap();
        assert_eq!(r.header.rate_hz, 20);
        assert!(r.header.reference_pitch_hz.is_none());
    }

    #[test]
    fn test_open_rejects_bad_headers() {
        assert!(TraceReader::open(Cursor::new("")).is_err());
        let err = TraceReader::open(Cursor::new("{\"rate_hz\":20}\n")).err().unwrap();
        assert!(err.contains("format"), "got: {}", err);
        let err = TraceReader::open(Cursor::new("{\"format\":\"wav\"}\n")).err().unwrap();
        assert!(err.contains("unknown format"), "got: {}", err);
    }

    #[test]
    fn test_read_all_skips_blank_and_malformed() {
        let data = format!(
            "{}\n{}\nnot json\n{}",
            HEADER,
            line(440.0, 0.2, 0),
            line(441.0, 0.2, 50_000)
        );
        let samples = TraceReader::open(Cursor::new(data)).unwrap().read_all();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp_us, 50_000);
        assert_eq!(samples[1].frequency_hz, 441.0);
    }

    #[test]
    fn test_next_sample_reports_error() {
        let data = format!("{}\ngarbage\n", HEADER);
        let mut r = TraceReader::open(Cursor::new(data)).unwrap();
        assert!(r.next_sample().unwrap().is_err());
        assert!(r.next_sample().is_none());
    }
}
