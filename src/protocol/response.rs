use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{PotholeRecord, record::RecordError};

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("invalid number '{line}': {source}")]
    Number {
        line: String,
        source: std::num::ParseFloatError,
    },
    #[error("invalid record line '{line}': {source}")]
    Record { line: String, source: RecordError },
    #[error("invalid list envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("invalid envelope element {index}: {reason}")]
    Element { index: usize, reason: String },
}

/// Wire shape of list responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFormat {
    /// One line holding `{"potholes": [...]}`.
    #[default]
    Envelope,
    /// One `lat;lon;severity` line per record, ended by a read timeout.
    Delimited,
}

/// `{"potholes": [...]}`
#[derive(Debug, Deserialize)]
struct Envelope {
    potholes: Vec<Value>,
}

/// Parse a threshold line. `None` means nothing arrived in time; the caller picks
/// the fallback.
pub fn parse_threshold(line: Option<&str>) -> Result<Option<f64>, ResponseError> {
    let Some(line) = line else {
        return Ok(None);
    };

    line.trim()
        .parse::<f64>()
        .map(Some)
        .map_err(|source| ResponseError::Number {
            line: line.to_string(),
            source,
        })
}

pub fn parse_delimited_record(line: &str) -> Result<PotholeRecord, ResponseError> {
    line.parse().map_err(|source| ResponseError::Record {
        line: line.to_string(),
        source,
    })
}

/// Collect delimited records until `next_line` yields `None`.
///
/// Malformed lines are logged and skipped. Errors from `next_line` itself abort the
/// collection.
pub fn collect_delimited<F, E>(mut next_line: F) -> Result<Vec<PotholeRecord>, E>
where
    F: FnMut() -> Result<Option<String>, E>,
{
    let mut records = Vec::new();
    while let Some(line) = next_line()? {
        match parse_delimited_record(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping record: {e}"),
        }
    }
    Ok(records)
}

/// Decode a list envelope. A missing line yields an empty list; malformed elements are
/// logged and skipped.
pub fn parse_envelope(line: Option<&str>) -> Result<Vec<PotholeRecord>, ResponseError> {
    let Some(line) = line else {
        return Ok(Vec::new());
    };

    let envelope: Envelope = serde_json::from_str(line)?;
    debug!("envelope holds {} element(s)", envelope.potholes.len());

    let records = envelope
        .potholes
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match decode_element(index, element) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("skipping record: {e}");
                None
            }
        })
        .collect();
    Ok(records)
}

/// Elements are JSON documents encoded as strings; bare objects are taken as-is.
fn decode_element(index: usize, element: Value) -> Result<PotholeRecord, ResponseError> {
    let decoded = match element {
        Value::String(inner) => serde_json::from_str(&inner),
        value @ Value::Object(_) => serde_json::from_value(value),
        other => {
            return Err(ResponseError::Element {
                index,
                reason: format!("expected a string or object, found {other}"),
            });
        }
    };

    decoded.map_err(|e| ResponseError::Element {
        index,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_valid() {
        assert_eq!(parse_threshold(Some("25.5")).unwrap(), Some(25.5));
        assert_eq!(parse_threshold(Some(" 7 ")).unwrap(), Some(7.0));
    }

    #[test]
    fn threshold_timeout() {
        assert_eq!(parse_threshold(None).unwrap(), None);
    }

    #[test]
    #[should_panic(expected = "Number")]
    fn threshold_not_a_number() {
        parse_threshold(Some("abc")).unwrap();
    }

    #[test]
    fn delimited_lines_until_timeout() {
        let mut lines = vec![Some("1.0;2.0;3.0"), Some("4.0;5.0;6.0"), None].into_iter();
        let records = collect_delimited::<_, ResponseError>(|| {
            Ok(lines.next().flatten().map(str::to_string))
        })
        .unwrap();

        assert_eq!(
            records,
            vec![
                PotholeRecord::new(1.0, 2.0, 3.0),
                PotholeRecord::new(4.0, 5.0, 6.0)
            ]
        );
    }

    #[test]
    fn delimited_malformed_lines_are_skipped() {
        let mut lines = vec![
            Some("1.0;2.0;3.0"),
            Some("1.0;2.0"),
            Some("x;y;z"),
            Some("4.0;5.0;6.0"),
            None,
        ]
        .into_iter();
        let records = collect_delimited::<_, ResponseError>(|| {
            Ok(lines.next().flatten().map(str::to_string))
        })
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1], PotholeRecord::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn delimited_source_error_aborts() {
        let mut calls = 0;
        let res = collect_delimited(|| {
            calls += 1;
            if calls == 1 {
                Ok(Some("1.0;2.0;3.0".to_string()))
            } else {
                Err("broken pipe")
            }
        });
        assert_eq!(res, Err("broken pipe"));
    }

    #[test]
    fn envelope_with_string_elements() {
        let line = r#"{"potholes":["{\"lat\":1.0,\"lon\":2.0,\"severity\":3.0}"]}"#;
        let records = parse_envelope(Some(line)).unwrap();
        assert_eq!(records, vec![PotholeRecord::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn envelope_with_object_elements() {
        let line = r#"{"potholes":[{"lat":1.0,"lon":2.0,"severity":3.0},{"lat":4,"lon":5,"var":6}]}"#;
        let records = parse_envelope(Some(line)).unwrap();
        assert_eq!(
            records,
            vec![
                PotholeRecord::new(1.0, 2.0, 3.0),
                PotholeRecord::new(4.0, 5.0, 6.0)
            ]
        );
    }

    #[test]
    fn envelope_timeout_is_empty() {
        assert!(parse_envelope(None).unwrap().is_empty());
    }

    #[test]
    fn envelope_malformed() {
        assert!(matches!(
            parse_envelope(Some("{\"potholes\": [")),
            Err(ResponseError::Envelope(_))
        ));
        assert!(matches!(
            parse_envelope(Some("{\"holes\": []}")),
            Err(ResponseError::Envelope(_))
        ));
    }

    #[test]
    fn envelope_partial_record_is_skipped() {
        let line = r#"{"potholes":["{\"lat\":1.0,\"lon\":2.0}", 42, "{\"lat\":1.0,\"lon\":2.0,\"severity\":3.0}"]}"#;
        let records = parse_envelope(Some(line)).unwrap();
        assert_eq!(records, vec![PotholeRecord::new(1.0, 2.0, 3.0)]);
    }
}
