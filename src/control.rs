//! Operator commands for the live loop.
//!
//! The binary reads one command per line from stdin; each parsed command is
//! posted to the app as an event so all state changes happen on the loop
//! thread.

use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlCommand {
    StartCamera,
    StopCamera,
    SwitchCamera,
    /// New target rate in frames per second.
    SetFps(u32),
    /// New confidence threshold in whole percent.
    SetConfidence(u32),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try: start, stop, switch, fps <n>, conf <pct>, status, quit)")]
    Unknown(String),
    #[error("'{0}' needs a numeric argument")]
    MissingArgument(&'static str),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

impl FromStr for ControlCommand {
    type Err = ControlParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err(ControlParseError::Empty);
        };
        let command = match verb.to_lowercase().as_str() {
            "start" => ControlCommand::StartCamera,
            "stop" => ControlCommand::StopCamera,
            "switch" | "flip" => ControlCommand::SwitchCamera,
            "fps" => ControlCommand::SetFps(number(parts.next(), "fps")?),
            "conf" | "confidence" => {
                ControlCommand::SetConfidence(number(parts.next(), "conf")?)
            }
            "status" => ControlCommand::Status,
            "quit" | "exit" => ControlCommand::Quit,
            other => return Err(ControlParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn number(arg: Option<&str>, verb: &'static str) -> Result<u32, ControlParseError> {
    let arg = arg.ok_or(ControlParseError::MissingArgument(verb))?;
    // Accept "40%" for the confidence selector.
    let trimmed = arg.trim_end_matches('%');
    trimmed
        .parse()
        .map_err(|_| ControlParseError::InvalidNumber(arg.to_string()))
}
