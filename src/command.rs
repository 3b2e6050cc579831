//! Request encoding for the pothole line protocol.
//!
//! This module defines the [`CommandKind`] enum, the closed set of operations understood by
//! the server, and the [`Request`] struct pairing a kind with its ordered string arguments.
//!
//! A request is rendered to exactly one line of text: the command keyword followed by its
//! arguments, joined by a single space. The line terminator is appended by the transport,
//! never by the encoder.
//!
//! # Overview
//!
//! | Kind            | Keyword              | Arguments                     |
//! |-----------------|----------------------|-------------------------------|
//! | `ListAll`       | `HOLE_LIST`          | none                          |
//! | `ListByRange`   | `HOLE_LIST_BY_RANGE` | latitude, longitude, range    |
//! | `GetThreshold`  | `THRESHOLD`          | none                          |
//! | `SubmitRecord`  | `NEW_HOLE`           | latitude, longitude, severity |
//! | `SetUsername`   | `SET_USERNAME`       | name                          |
//!
//! Arity is checked when the request is built. A malformed request would silently
//! desynchronize the protocol, so it is rejected instead.
//!
//! # Example
//! ```rust
//! use pothole::{CommandKind, Request};
//!
//! let req = Request::new(CommandKind::SetUsername, vec!["tony".to_string()]).unwrap();
//! assert_eq!(req.render(), "SET_USERNAME tony");
//!
//! assert!(Request::new(CommandKind::SetUsername, vec![]).is_err());
//! ```
use std::fmt;

use thiserror::Error;

use crate::PotholeRecord;

/// Separator between the keyword and each argument.
const ARGUMENT_SEPARATOR: &str = " ";

/// List of possible errors raised while building a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("'{kind}' takes {expected} argument(s), {actual} given")]
    InvalidArgumentCount {
        kind: CommandKind,
        expected: usize,
        actual: usize,
    },

    #[error("invalid '{kind}' argument '{argument}', {reason}")]
    InvalidArgument {
        kind: CommandKind,
        argument: String,
        reason: &'static str,
    },
}

/// Operations supported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Every known record.
    ListAll,
    /// Records around a point; takes latitude, longitude and range.
    ListByRange,
    /// The severity threshold configured on the server.
    GetThreshold,
    /// Store a new record; takes latitude, longitude and severity.
    SubmitRecord,
    /// Name the session's user; takes the name.
    SetUsername,
}

impl CommandKind {
    /// Wire keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            CommandKind::ListAll => "HOLE_LIST",
            CommandKind::ListByRange => "HOLE_LIST_BY_RANGE",
            CommandKind::GetThreshold => "THRESHOLD",
            CommandKind::SubmitRecord => "NEW_HOLE",
            CommandKind::SetUsername => "SET_USERNAME",
        }
    }

    /// Exact number of arguments the command accepts.
    pub fn arity(&self) -> usize {
        match self {
            CommandKind::ListAll | CommandKind::GetThreshold => 0,
            CommandKind::ListByRange | CommandKind::SubmitRecord => 3,
            CommandKind::SetUsername => 1,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A command kind with its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    kind: CommandKind,
    arguments: Vec<String>,
}

impl Request {
    pub fn new(kind: CommandKind, arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != kind.arity() {
            return Err(CommandError::InvalidArgumentCount {
                kind,
                expected: kind.arity(),
                actual: arguments.len(),
            });
        }

        for argument in &arguments {
            let reason = if argument.is_empty() {
                "argument is empty"
            } else if argument.contains(['\n', '\r']) {
                "argument contains a line terminator"
            } else if argument.chars().any(char::is_whitespace) {
                "argument contains whitespace"
            } else {
                continue;
            };

            return Err(CommandError::InvalidArgument {
                kind,
                argument: argument.clone(),
                reason,
            });
        }

        Ok(Self { kind, arguments })
    }

    pub fn list_all() -> Self {
        Self {
            kind: CommandKind::ListAll,
            arguments: vec![],
        }
    }

    pub fn list_by_range(latitude: f64, longitude: f64, range: u32) -> Self {
        Self {
            kind: CommandKind::ListByRange,
            arguments: vec![
                latitude.to_string(),
                longitude.to_string(),
                range.to_string(),
            ],
        }
    }

    pub fn threshold() -> Self {
        Self {
            kind: CommandKind::GetThreshold,
            arguments: vec![],
        }
    }

    pub fn submit(record: &PotholeRecord) -> Self {
        Self {
            kind: CommandKind::SubmitRecord,
            arguments: vec![
                record.latitude().to_string(),
                record.longitude().to_string(),
                record.severity().to_string(),
            ],
        }
    }

    pub fn set_username(name: &str) -> Result<Self, CommandError> {
        Self::new(CommandKind::SetUsername, vec![name.to_string()])
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Render the request as a single line, without terminator.
    pub fn render(&self) -> String {
        let mut line = String::from(self.kind.keyword());
        for argument in &self.arguments {
            line.push_str(ARGUMENT_SEPARATOR);
            line.push_str(argument);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn request_render_all_kinds() {
        let inputs = vec![
            (CommandKind::ListAll, args(&[]), "HOLE_LIST"),
            (
                CommandKind::ListByRange,
                args(&["41.9", "12.5", "300"]),
                "HOLE_LIST_BY_RANGE 41.9 12.5 300",
            ),
            (CommandKind::GetThreshold, args(&[]), "THRESHOLD"),
            (
                CommandKind::SubmitRecord,
                args(&["1", "2", "3.5"]),
                "NEW_HOLE 1 2 3.5",
            ),
            (CommandKind::SetUsername, args(&["tony"]), "SET_USERNAME tony"),
        ];

        for (kind, arguments, expected) in inputs {
            let line = Request::new(kind, arguments).unwrap().render();
            assert_eq!(line, expected);
            assert!(!line.contains('\n'));
        }
    }

    #[test]
    fn request_arity_mismatch() {
        let kinds = [
            CommandKind::ListAll,
            CommandKind::ListByRange,
            CommandKind::GetThreshold,
            CommandKind::SubmitRecord,
            CommandKind::SetUsername,
        ];

        for kind in kinds {
            let arguments = vec!["1".to_string(); kind.arity() + 1];
            let err = Request::new(kind, arguments).unwrap_err();
            assert_eq!(
                err,
                CommandError::InvalidArgumentCount {
                    kind,
                    expected: kind.arity(),
                    actual: kind.arity() + 1,
                }
            );
        }
    }

    #[test]
    fn request_rejects_embedded_newline() {
        let err = Request::set_username("bad\nname").unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgument { .. }));
    }

    #[test]
    fn request_rejects_whitespace_and_empty() {
        assert!(Request::set_username("two words").is_err());
        assert!(Request::set_username("").is_err());
    }

    #[test]
    fn request_constructors_preserve_order() {
        let req = Request::list_by_range(1.5, -2.25, 100);
        assert_eq!(req.kind(), CommandKind::ListByRange);
        assert_eq!(req.arguments(), ["1.5", "-2.25", "100"]);

        let req = Request::submit(&PotholeRecord::new(10.0, 20.5, 3.0));
        assert_eq!(req.render(), "NEW_HOLE 10 20.5 3");
    }
}
