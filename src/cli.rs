//! CLI utilities for the pothole client.
//!
//! The utilities present in this module can be used to create an interactive shell on top
//! of a [`PotholeClient`](crate::PotholeClient).
use std::io::{BufRead, Write};

use crate::PotholeRecord;

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Exit command `.exit`
    Exit,
    /// `list`
    ListAll,
    /// `range <lat> <lon> <range>`
    ListByRange {
        latitude: f64,
        longitude: f64,
        range: u32,
    },
    /// `threshold`
    Threshold,
    /// `submit <lat> <lon> <severity>`
    Submit(PotholeRecord),
    /// `username <name>`
    Username(String),
    /// `status`
    Status,
    /// Empty line
    Nothing,
}

impl TryFrom<&str> for Command {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parts = value.split_whitespace().collect::<Vec<&str>>();

        let Some((keyword, args)) = parts.split_first() else {
            return Ok(Command::Nothing);
        };

        match (keyword.to_lowercase().as_str(), args) {
            (".exit", []) => Ok(Command::Exit),
            ("list", []) => Ok(Command::ListAll),
            ("threshold", []) => Ok(Command::Threshold),
            ("status", []) => Ok(Command::Status),
            ("range", [lat, lon, range]) => Ok(Command::ListByRange {
                latitude: parse_number(lat)?,
                longitude: parse_number(lon)?,
                range: range
                    .parse::<u32>()
                    .map_err(|_| format!("'{range}' is not a valid range"))?,
            }),
            ("submit", [lat, lon, severity]) => Ok(Command::Submit(PotholeRecord::new(
                parse_number(lat)?,
                parse_number(lon)?,
                parse_number(severity)?,
            ))),
            ("username", [name]) => Ok(Command::Username(name.to_string())),
            ("range", _) => Err("usage: range <lat> <lon> <range>".to_string()),
            ("submit", _) => Err("usage: submit <lat> <lon> <severity>".to_string()),
            ("username", _) => Err("usage: username <name>".to_string()),
            _ => Err(format!("unrecognized command '{}'", value.trim())),
        }
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .map_err(|_| format!("'{s}' is not a valid number"))
}

/// Prompt user for a valid command.
///
/// Reaching the end of `reader` is treated as `.exit`.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, String>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ").map_err(|e| format!("failed to write prompt: {e}"))?;
    writer
        .flush()
        .map_err(|e| format!("failed to write prompt: {e}"))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| format!("failed to read command: {e}"))?;
    if read == 0 {
        return Ok(Command::Exit);
    }

    s.as_str().try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_end_of_input_exits() {
        let mut output = Vec::new();

        let res = prompt(&b""[..], &mut output).unwrap();
        assert_eq!(Command::Exit, res);
    }

    #[test]
    fn prompt_handles_empty_line() {
        let input = b"\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Nothing, res);
    }

    #[test]
    fn command_from_string() {
        let inputs = vec![
            ("list", Command::ListAll),
            ("THRESHOLD", Command::Threshold),
            ("status", Command::Status),
            (
                "range 41.9 12.5 300",
                Command::ListByRange {
                    latitude: 41.9,
                    longitude: 12.5,
                    range: 300,
                },
            ),
            (
                "submit 1 2 3.5",
                Command::Submit(PotholeRecord::new(1.0, 2.0, 3.5)),
            ),
            ("username tony", Command::Username("tony".to_string())),
        ];

        for (cmd, expected) in inputs {
            let command: Command = cmd.try_into().unwrap();
            assert_eq!(command, expected);
        }
    }

    #[test]
    fn command_usage_errors() {
        let err = Command::try_from("range 1 2").unwrap_err();
        assert_eq!(err, "usage: range <lat> <lon> <range>");

        let err = Command::try_from("submit 1 two 3").unwrap_err();
        assert_eq!(err, "'two' is not a valid number");
    }

    #[test]
    #[should_panic(expected = "unrecognized command '.something_wrong'")]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();
    }
}
