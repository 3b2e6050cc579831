//! Geotagged pothole observations.
//!
//! A [`PotholeRecord`] is the only domain value exchanged with the server. It has no identity
//! beyond its field values and is never mutated once built.
//!
//! # Encodings
//!
//! - Textual: `lat;lon;severity`, as produced by [`Display`](std::fmt::Display) and accepted
//!   by [`FromStr`].
//! - JSON: `{"lat": 1.0, "lon": 2.0, "severity": 3.0}`. Every field is required; `var` is
//!   accepted in place of `severity`. Extra fields (e.g. `user`) are ignored.
use std::{fmt, num::ParseFloatError, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between fields in the textual form.
pub const FIELD_DELIMITER: char = ';';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected 3 fields separated by '{FIELD_DELIMITER}', found {0}")]
    FieldCount(usize),

    #[error("invalid {field} '{value}': {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        source: ParseFloatError,
    },
}

/// A single pothole observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PotholeRecord {
    #[serde(rename = "lat")]
    latitude: f64,
    #[serde(rename = "lon")]
    longitude: f64,
    #[serde(alias = "var")]
    severity: f64,
}

impl PotholeRecord {
    pub fn new(latitude: f64, longitude: f64, severity: f64) -> Self {
        Self {
            latitude,
            longitude,
            severity,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }
}

impl fmt::Display for PotholeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
            self.latitude, self.longitude, self.severity
        )
    }
}

impl FromStr for PotholeRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.trim().split(FIELD_DELIMITER).collect::<Vec<&str>>();
        if parts.len() != 3 {
            return Err(RecordError::FieldCount(parts.len()));
        }

        let field = |name: &'static str, value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|source| RecordError::InvalidNumber {
                    field: name,
                    value: value.to_string(),
                    source,
                })
        };

        Ok(Self {
            latitude: field("latitude", parts[0])?,
            longitude: field("longitude", parts[1])?,
            severity: field("severity", parts[2])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_delimited_text() {
        let record: PotholeRecord = "1.0;2.5;-3".parse().unwrap();
        assert_eq!(record, PotholeRecord::new(1.0, 2.5, -3.0));
    }

    #[test]
    fn record_display_is_parseable() {
        let record = PotholeRecord::new(41.9, 12.5, 7.25);
        assert_eq!(record.to_string(), "41.9;12.5;7.25");
        assert_eq!(record.to_string().parse::<PotholeRecord>().unwrap(), record);
    }

    #[test]
    fn record_wrong_field_count() {
        let err = "1.0;2.0".parse::<PotholeRecord>().unwrap_err();
        assert_eq!(err, RecordError::FieldCount(2));

        let err = "1.0;2.0;3.0;4.0".parse::<PotholeRecord>().unwrap_err();
        assert_eq!(err, RecordError::FieldCount(4));
    }

    #[test]
    #[should_panic(expected = "InvalidNumber")]
    fn record_non_numeric_field() {
        "1.0;north;3.0".parse::<PotholeRecord>().unwrap();
    }

    #[test]
    fn record_from_json() {
        let record: PotholeRecord =
            serde_json::from_str(r#"{"lat":1.0,"lon":2.0,"severity":3.0}"#).unwrap();
        assert_eq!(record, PotholeRecord::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn record_from_json_with_alias_and_extra_fields() {
        let record: PotholeRecord =
            serde_json::from_str(r#"{"user":"tony","lat":1.0,"lon":2.0,"var":9.5}"#).unwrap();
        assert_eq!(record, PotholeRecord::new(1.0, 2.0, 9.5));
    }

    #[test]
    fn record_from_json_missing_field() {
        let res: Result<PotholeRecord, _> = serde_json::from_str(r#"{"lat":1.0,"lon":2.0}"#);
        assert!(res.is_err());
    }
}
